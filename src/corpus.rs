//! Corpus filter — turns a raw chat log into generator input.
//!
//! Input lines are weechat-style `timestamp \t nick \t message`; the message
//! itself may contain further tabs. Output is one message per line, which is
//! exactly what the generator reads from its corpus file.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::CorpusConfig;

/// Matches a leading `nick:` address.
const ADDRESS_PATTERN: &str = r"^[A-Za-z0-9_^-]+:";

/// Compiled filtering rules.
#[derive(Debug)]
pub struct CorpusFilter {
    speaker: Regex,
    excludes: Vec<Regex>,
    address: Regex,
    min_tokens: usize,
}

/// Line counts from one filtering pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub read: usize,
    pub kept: usize,
}

impl CorpusFilter {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let speaker = Regex::new(&config.speaker_pattern)
            .with_context(|| format!("compile speaker pattern {:?}", config.speaker_pattern))?;
        let excludes = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("compile exclude pattern {pattern:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let address = Regex::new(ADDRESS_PATTERN).context("compile address pattern")?;

        Ok(Self {
            speaker,
            excludes,
            address,
            min_tokens: config.min_tokens,
        })
    }

    /// Filter one log line, returning the message to keep.
    pub fn filter_line(&self, line: &str) -> Option<String> {
        let mut parts = line.split('\t');
        let _timestamp = parts.next()?;
        let speaker = parts.next()?;
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() || !self.speaker.is_match(speaker) {
            return None;
        }

        // The generator splits on spaces only, so embedded tabs become spaces.
        let joined = rest.join(" ");
        let message = joined.trim();
        if self.is_excluded(message) {
            return None;
        }

        Some(self.strip_address(message).to_string())
    }

    fn is_excluded(&self, message: &str) -> bool {
        self.excludes.iter().any(|re| re.is_match(message))
            || message.split(' ').count() < self.min_tokens
    }

    /// Drop a leading `nick:` unless the message opens with `std::`.
    fn strip_address<'a>(&self, message: &'a str) -> &'a str {
        if message.starts_with("std::") {
            return message;
        }
        match self.address.find(message) {
            Some(found) => message[found.end()..].trim(),
            None => message,
        }
    }

    /// Filter a whole log. Invalid UTF-8 is decoded lossily rather than
    /// aborting the pass.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> Result<FilterStats> {
        let mut stats = FilterStats::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = input.read_until(b'\n', &mut buf).context("read log")?;
            if read == 0 {
                break;
            }
            stats.read += 1;

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\r', '\n']);
            if let Some(message) = self.filter_line(line) {
                writeln!(output, "{message}").context("write corpus")?;
                stats.kept += 1;
            }
        }
        output.flush().context("flush corpus")?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> CorpusFilter {
        CorpusFilter::new(&CorpusConfig::default()).unwrap()
    }

    #[test]
    fn urls_are_excluded() {
        assert_eq!(
            filter().filter_line("2021-01-01 10:00\tcodex\thttps://example.com is great"),
            None
        );
    }

    #[test]
    fn plain_message_is_kept_verbatim() {
        assert_eq!(
            filter()
                .filter_line("2021-01-01 10:00\tcodex\tthis is four tokens")
                .as_deref(),
            Some("this is four tokens")
        );
    }

    #[test]
    fn address_is_stripped_but_std_scope_survives() {
        assert_eq!(
            filter()
                .filter_line("2021-01-01 10:00\tcodex\tnick: std::vector is cool")
                .as_deref(),
            Some("std::vector is cool")
        );
        assert_eq!(
            filter()
                .filter_line("2021-01-01 10:00\tcodex\tstd::move does not move anything")
                .as_deref(),
            Some("std::move does not move anything")
        );
    }

    #[test]
    fn other_speakers_are_skipped() {
        let f = filter();
        assert_eq!(f.filter_line("t\tsomeone\tthis is four tokens"), None);
        assert!(f.filter_line("t\tCodex_\tthis is four tokens").is_some());
        assert!(f.filter_line("t\tcodex2\tthis is four tokens").is_some());
        assert_eq!(f.filter_line("t\tcodexx\tthis is four tokens"), None);
    }

    #[test]
    fn short_and_invocation_messages_are_skipped() {
        let f = filter();
        assert_eq!(f.filter_line("t\tcodex\tonly three tokens"), None);
        assert_eq!(f.filter_line("t\tcodex\t<< \"geordi\" says hi"), None);
        assert_eq!(f.filter_line("t\tcodex\t{ int x; return x; }"), None);
        assert_eq!(f.filter_line("t\tcodex"), None);
    }

    #[test]
    fn embedded_tabs_become_spaces() {
        assert_eq!(
            filter().filter_line("t\tcodex\tsplit\tby a tab here ").as_deref(),
            Some("split by a tab here")
        );
    }

    #[test]
    fn run_writes_one_message_per_line() {
        let log = "2021-01-01 10:00\tcodex\tthis is four tokens\n\
                   2021-01-01 10:01\talice\tnot the person we want here\n\
                   2021-01-01 10:02\tcodex\thttp://spam.example is a link\n\
                   2021-01-01 10:03\tcodex\talice: you should use a reference\r\n";
        let mut out = Vec::new();
        let stats = filter().run(log.as_bytes(), &mut out).unwrap();

        assert_eq!(stats, FilterStats { read: 4, kept: 2 });
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "this is four tokens\nyou should use a reference\n"
        );
    }

    #[test]
    fn invalid_utf8_does_not_abort() {
        let mut log = b"t\tcodex\tcaf\xe9 is a nice place\n".to_vec();
        log.extend_from_slice(b"t\tcodex\tthis is four tokens\n");
        let mut out = Vec::new();
        let stats = filter().run(log.as_slice(), &mut out).unwrap();
        assert_eq!(stats.kept, 2);
    }
}
