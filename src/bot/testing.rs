//! Test doubles shared by the session tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::config::GeneratorConfig;
use crate::irc::ChatSink;

use super::generator::GeneratorInvoker;

/// Something the session asked the connection to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Message { target: String, text: String },
    Nick(String),
}

/// In-memory [`ChatSink`] that records every outbound request.
///
/// Nick changes are recorded but not applied, like a server that never
/// answers. While offline, nick changes are refused and not recorded.
pub struct RecordingSink {
    nick: Mutex<String>,
    online: AtomicBool,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSink {
    pub fn new(nick: &str) -> Arc<Self> {
        Arc::new(Self {
            nick: Mutex::new(nick.to_string()),
            online: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_nick(&self, nick: &str) {
        *self.nick.lock().unwrap() = nick.to_string();
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChatSink for RecordingSink {
    fn send_message(&self, target: &str, text: &str) {
        self.sent.lock().unwrap().push(Sent::Message {
            target: target.to_string(),
            text: text.to_string(),
        });
    }

    fn change_nick(&self, nick: &str) -> bool {
        if !self.online.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(Sent::Nick(nick.to_string()));
        true
    }

    fn current_nick(&self) -> String {
        self.nick.lock().unwrap().clone()
    }
}

/// A generator backed by a shell script.
///
/// The invoker runs `/bin/sh -f <script> [-w <query>]`: the script path
/// takes the corpus slot, so inside the script `$1` is `-w` and `$2` the
/// query. Reading the script through `sh` avoids exec'ing a file that was
/// just written.
pub fn stub_generator(script: &str) -> (TempDir, GeneratorInvoker) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("generator.sh");
    std::fs::write(&path, script).unwrap();

    let invoker = GeneratorInvoker::new(&GeneratorConfig {
        executable: PathBuf::from("/bin/sh"),
        corpus: path,
        timeout_secs: 10,
        max_concurrent: 2,
    });
    (dir, invoker)
}
