//! Nick recovery — keep asking for the configured nick until we hold it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::irc::ChatSink;

pub struct IdentitySupervisor {
    sink: Arc<dyn ChatSink>,
    desired: String,
    interval: Duration,
}

impl IdentitySupervisor {
    pub fn new(sink: Arc<dyn ChatSink>, desired: String, interval: Duration) -> Self {
        Self {
            sink,
            desired,
            interval,
        }
    }

    /// Compare once; on mismatch issue a single nick change.
    /// Returns whether a command was issued.
    pub fn tick(&self) -> bool {
        let current = self.sink.current_nick();
        if current == self.desired {
            return false;
        }
        if !self.sink.change_nick(&self.desired) {
            debug!(%current, desired = %self.desired, "offline, nick regain deferred");
            return false;
        }
        info!(%current, desired = %self.desired, "attempting to regain nick");
        true
    }

    /// Check every `interval`, starting one interval from now. No backoff,
    /// no retry limit.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }
}
