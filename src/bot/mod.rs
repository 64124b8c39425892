//! Session core — wires the IRC connection to the generator.
//!
//! The [`Session`] owns the configuration and the outbound sink, consumes
//! inbound events, and runs two background activities for its lifetime.
//! Each concern lives in a focused submodule:
//!
//! | Module      | Responsibility                                 |
//! |-------------|------------------------------------------------|
//! | `generator` | Run the generator subprocess, capture output   |
//! | `trigger`   | Decide whether a message is addressed to us    |
//! | `speaker`   | Unprompted messages on a randomized timer      |
//! | `identity`  | Regain the configured nick after a collision   |

mod generator;
mod identity;
mod speaker;
#[cfg(test)]
mod testing;
mod trigger;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::irc::{ChatSink, IncomingMessage, IrcClient, IrcEvent};

use self::generator::GeneratorInvoker;
use self::identity::IdentitySupervisor;
use self::speaker::ScheduledSpeaker;

// ── Session state ────────────────────────────────────────────────────

/// One bot session: configuration, generator, and the only way out to chat.
pub struct Session {
    config: Config,
    generator: GeneratorInvoker,
    sink: Arc<dyn ChatSink>,
}

// ── Lifecycle ────────────────────────────────────────────────────────

/// Connect, start the background activities, and serve inbound events
/// until the connection task goes away.
pub async fn start(config: Config) -> Result<()> {
    let (handle, events, client) = IrcClient::spawn(config.irc.clone(), config.reconnect.clone());
    let session = Session::new(config, Arc::new(handle));

    let background = session.spawn_background();
    session.run(events).await;

    for task in background {
        task.abort();
    }
    client.abort();
    Err(anyhow!("IRC client stopped unexpectedly"))
}

impl Session {
    pub fn new(config: Config, sink: Arc<dyn ChatSink>) -> Self {
        let generator = GeneratorInvoker::new(&config.generator);
        Self {
            config,
            generator,
            sink,
        }
    }

    /// Spawn the autonomous speaker and the nick supervisor.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let speaker = ScheduledSpeaker::new(
            self.generator.clone(),
            self.sink.clone(),
            self.config.irc.channel.clone(),
            &self.config.schedule,
        );
        let supervisor = IdentitySupervisor::new(
            self.sink.clone(),
            self.config.irc.nickname.clone(),
            self.config.identity.regain_interval(),
        );
        vec![tokio::spawn(speaker.run()), tokio::spawn(supervisor.run())]
    }

    /// Consume inbound events in arrival order until the sender closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<IrcEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
    }
}

// ── Event handling ───────────────────────────────────────────────────

impl Session {
    /// React to one inbound event. Returns the reply task, if one was started.
    pub fn handle_event(&self, event: IrcEvent) -> Option<JoinHandle<()>> {
        match event {
            IrcEvent::Registered { nick } => {
                if nick != self.config.irc.nickname {
                    warn!(%nick, desired = %self.config.irc.nickname, "registered under a fallback nick");
                }
                None
            }
            IrcEvent::Disconnected { reason } => {
                info!(%reason, "disconnected, waiting for reconnect");
                None
            }
            IrcEvent::Message(message) => self.handle_message(&message),
        }
    }

    /// Answer a directed trigger on its own task so a slow generator never
    /// holds up the event loop.
    fn handle_message(&self, message: &IncomingMessage) -> Option<JoinHandle<()>> {
        let current = self.sink.current_nick();
        let trigger = trigger::parse(message, &current, &self.config.irc.nickname)?;
        debug!(requester = %trigger.requester, query = %trigger.query, "directed trigger");

        let generator = self.generator.clone();
        let sink = self.sink.clone();
        Some(tokio::spawn(async move {
            let result = generator.generate(Some(&trigger.query)).await;
            if result.is_empty() {
                return;
            }
            sink.send_message(&trigger.reply_target, &trigger.reply(&result.text));
        }))
    }
}
