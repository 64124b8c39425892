//! Autonomous emission — unprompted messages on a randomized timer.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::ScheduleConfig;
use crate::irc::ChatSink;

use super::generator::GeneratorInvoker;

/// Sample a delay uniformly from `[min_secs, max_secs]` at millisecond
/// resolution. Both bounds are reachable.
pub fn random_delay<R: Rng + ?Sized>(rng: &mut R, min_secs: u64, max_secs: u64) -> Duration {
    let min_ms = min_secs.saturating_mul(1000);
    let max_ms = max_secs.saturating_mul(1000).max(min_ms);
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}

/// Loops forever: wait a random delay, generate, post to the channel.
pub struct ScheduledSpeaker {
    generator: GeneratorInvoker,
    sink: Arc<dyn ChatSink>,
    channel: String,
    min_secs: u64,
    max_secs: u64,
    rng: StdRng,
}

impl ScheduledSpeaker {
    pub fn new(
        generator: GeneratorInvoker,
        sink: Arc<dyn ChatSink>,
        channel: String,
        schedule: &ScheduleConfig,
    ) -> Self {
        Self {
            generator,
            sink,
            channel,
            min_secs: schedule.min_time_secs,
            max_secs: schedule.max_time_secs,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        random_delay(&mut self.rng, self.min_secs, self.max_secs)
    }

    /// Run until the task is dropped.
    pub async fn run(mut self) {
        loop {
            let delay = self.next_delay();
            info!(delay_secs = delay.as_secs(), "next autonomous message scheduled");
            tokio::time::sleep(delay).await;
            self.emit_once().await;
        }
    }

    /// One emission. Returns whether anything was posted.
    pub async fn emit_once(&self) -> bool {
        let result = self.generator.generate(None).await;
        if result.is_empty() {
            debug!("generator had nothing to say");
            return false;
        }
        self.sink.send_message(&self.channel, &result.text);
        true
    }
}
