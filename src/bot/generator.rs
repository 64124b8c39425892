//! Generator subprocess — runs the external text generator and captures
//! what it prints.
//!
//! Every failure (missing executable, timeout, I/O error) is logged here
//! and reduced to an empty [`GenerationResult`]. Callers only ever have to
//! decide between "something to say" and "nothing to say".

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::constants::{CORPUS_FLAG, QUERY_FLAG};

/// Why the generator ran, used to tag timing logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationKind {
    /// Answering someone who addressed the bot.
    Directed,
    /// Unprompted message on the speaker's timer.
    Autonomous,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Directed => "directed",
            GenerationKind::Autonomous => "autonomous",
        }
    }
}

/// Captured output of one generator run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationResult {
    /// Standard output with trailing whitespace removed. May be empty.
    pub text: String,
    /// Standard error. Logged, never sent to chat.
    pub diagnostics: String,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to start generator {path}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to collect generator output")]
    Wait(#[source] std::io::Error),
    #[error("generator did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Cheap to clone; clones share the concurrency limit.
#[derive(Clone, Debug)]
pub struct GeneratorInvoker {
    executable: PathBuf,
    corpus: PathBuf,
    timeout: Option<Duration>,
    permits: Arc<Semaphore>,
}

impl GeneratorInvoker {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            corpus: config.corpus.clone(),
            timeout: config.timeout(),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Argument vector for one run. A blank query counts as no query.
    pub fn args(&self, query: Option<&str>) -> Vec<OsString> {
        let mut args = vec![OsString::from(CORPUS_FLAG), self.corpus.clone().into()];
        if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
            args.push(QUERY_FLAG.into());
            args.push(query.into());
        }
        args
    }

    /// Run the generator once and return whatever it printed.
    ///
    /// Never fails: errors are logged and produce an empty result.
    pub async fn generate(&self, query: Option<&str>) -> GenerationResult {
        let kind = if query.is_some() {
            GenerationKind::Directed
        } else {
            GenerationKind::Autonomous
        };

        let started = Instant::now();
        let outcome = self.try_generate(query, kind).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                info!(
                    kind = kind.as_str(),
                    elapsed_ms,
                    chars = result.text.len(),
                    stderr_chars = result.diagnostics.len(),
                    "generation finished"
                );
                result
            }
            Err(err) => {
                let error = format!("{:#}", anyhow::Error::new(err));
                warn!(kind = kind.as_str(), elapsed_ms, %error, "generation failed");
                GenerationResult::default()
            }
        }
    }

    async fn try_generate(
        &self,
        query: Option<&str>,
        kind: GenerationKind,
    ) -> Result<GenerationResult, GenerateError> {
        // The semaphore is never closed, so a failed acquire cannot happen.
        let _permit = self.permits.acquire().await.ok();

        let mut command = Command::new(&self.executable);
        command
            .args(self.args(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| GenerateError::Spawn {
            path: self.executable.display().to_string(),
            source,
        })?;
        debug!(kind = kind.as_str(), pid = ?child.id(), "generator started");

        // Drains stdout and stderr concurrently, then reaps the child.
        let output = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| GenerateError::TimedOut(limit))?,
            None => output.await,
        }
        .map_err(GenerateError::Wait)?;

        let text = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let diagnostics = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if !diagnostics.is_empty() {
            warn!(kind = kind.as_str(), stderr = %diagnostics, "generator error output");
        }
        if !output.status.success() {
            warn!(kind = kind.as_str(), status = %output.status, "generator exited unsuccessfully");
        }

        Ok(GenerationResult { text, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::stub_generator;

    #[test]
    fn args_carry_corpus_and_optional_query() {
        let invoker = GeneratorInvoker::new(&GeneratorConfig {
            corpus: PathBuf::from("filtered.txt"),
            ..GeneratorConfig::default()
        });

        assert_eq!(invoker.args(None), vec!["-f", "filtered.txt"]);
        assert_eq!(
            invoker.args(Some(" what is truth ")),
            vec!["-f", "filtered.txt", "-w", "what is truth"]
        );
        assert_eq!(invoker.args(Some("   ")), vec!["-f", "filtered.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let (_dir, invoker) = stub_generator("printf 42\n");
        let result = invoker.generate(None).await;
        assert_eq!(result.text, "42");
        assert_eq!(result.diagnostics, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_only_is_an_empty_result() {
        let (_dir, invoker) = stub_generator("printf err >&2\n");
        let result = invoker.generate(None).await;
        assert!(result.is_empty());
        assert_eq!(result.diagnostics, "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_and_failure_status_do_not_hide_stdout() {
        let (_dir, invoker) = stub_generator("echo wisdom\necho oops >&2\nexit 3\n");
        let result = invoker.generate(None).await;
        assert_eq!(result.text, "wisdom");
        assert_eq!(result.diagnostics, "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn query_is_passed_as_a_single_argument() {
        let (_dir, invoker) = stub_generator("printf '%s|%s' \"$1\" \"$2\"\n");
        let result = invoker.generate(Some("truth; $(rm -rf /) `id`")).await;
        assert_eq!(result.text, "-w|truth; $(rm -rf /) `id`");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn blank_query_runs_without_query_flag() {
        let (_dir, invoker) = stub_generator("printf '%s' \"$#\"\n");
        assert_eq!(invoker.generate(Some("  ")).await.text, "0");
        assert_eq!(invoker.generate(Some("x")).await.text, "2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn repeated_runs_agree() {
        let (_dir, invoker) = stub_generator("echo the same answer\n");
        let first = invoker.generate(Some("q")).await;
        let second = invoker.generate(Some("q")).await;
        assert_eq!(first, second);
        assert_eq!(first.text, "the same answer");
    }

    #[tokio::test]
    async fn missing_executable_is_an_empty_result() {
        let invoker = GeneratorInvoker::new(&GeneratorConfig {
            executable: PathBuf::from("/nonexistent/autocodex-generator"),
            ..GeneratorConfig::default()
        });
        let result = invoker.generate(Some("hello")).await;
        assert!(result.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_generator_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("generator.sh");
        std::fs::write(&script, "exec sleep 30\n").unwrap();
        let invoker = GeneratorInvoker::new(&GeneratorConfig {
            executable: PathBuf::from("/bin/sh"),
            corpus: script,
            timeout_secs: 1,
            max_concurrent: 1,
        });

        let started = Instant::now();
        let result = invoker.generate(None).await;
        assert!(result.is_empty());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn third_call_waits_for_a_free_slot() {
        // Cap is 2: two runs overlap, the third starts only after one ends.
        let (_dir, invoker) = stub_generator("sleep 1\nprintf ok\n");
        let started = Instant::now();
        let (a, b, c) = tokio::join!(
            invoker.generate(None),
            invoker.generate(Some("x")),
            invoker.generate(None),
        );
        assert_eq!([a.text, b.text, c.text], ["ok", "ok", "ok"]);
        assert!(started.elapsed() >= Duration::from_secs(2), "{:?}", started.elapsed());
    }
}
