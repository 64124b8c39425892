//! IRC line parsing and command formatting.
//!
//! Only the handful of commands the bot needs are formatted here. Every
//! formatter returns a single line without the trailing CRLF; the writer
//! appends it.

/// A parsed IRC protocol line: `[@tags] [:prefix] COMMAND [params] [:trailing]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Parse one line. Returns `None` for blank or prefix-only lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        // Message tags carry nothing we use.
        if rest.starts_with('@') {
            rest = rest.split_once(' ').map(|(_, tail)| tail)?;
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (head, tail) = stripped.split_once(' ')?;
            prefix = Some(head.to_string());
            rest = tail.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// The nickname part of a `nick!user@host` prefix.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }
}

// ── Command formatting ───────────────────────────────────────────────

pub fn nick(nickname: &str) -> String {
    format!("NICK {nickname}")
}

pub fn user(username: &str, realname: &str) -> String {
    format!("USER {username} 0 * :{realname}")
}

pub fn join(channel: &str) -> String {
    format!("JOIN {channel}")
}

pub fn ping(token: &str) -> String {
    format!("PING :{token}")
}

pub fn pong(token: &str) -> String {
    format!("PONG :{token}")
}

/// Split `text` into one `PRIVMSG` per non-blank line.
///
/// Line breaks inside `text` never reach the wire, so generated or
/// chat-supplied text cannot smuggle extra protocol commands.
pub fn privmsg_lines(target: &str, text: &str) -> Vec<String> {
    text.split(['\r', '\n'])
        .map(|line| line.replace('\0', ""))
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("PRIVMSG {target} :{line}"))
        .collect()
}
