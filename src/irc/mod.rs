//! IRC client — the protocol side of the bot.
//!
//! The session core never touches the socket. It sees two things:
//!
//! - an [`mpsc`](tokio::sync::mpsc) receiver of [`IrcEvent`]s, consumed by a
//!   single owner, in the order lines arrived on the connection;
//! - a [`ChatSink`] for everything outbound (messages, nick changes) plus
//!   the currently observed nickname.

pub mod client;
pub mod message;

pub use client::IrcClient;

/// A line of chat seen on the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Nickname of the sender.
    pub source: String,
    /// Channel name, or our own nick for a private message.
    pub target: String,
    pub text: String,
}

/// Something the session should know about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrcEvent {
    /// The server accepted us under `nick` (which may not be the one we asked for).
    Registered { nick: String },
    Message(IncomingMessage),
    /// The connection ended; the client reconnects on its own.
    Disconnected { reason: String },
}

/// Outbound capability shared by every activity of a session.
///
/// Calls enqueue and return immediately; they never wait on the network.
pub trait ChatSink: Send + Sync {
    /// Send `text` to a channel or user.
    fn send_message(&self, target: &str, text: &str);
    /// Ask the server for a different nickname. Returns `false` when the
    /// request could not be queued (e.g. while disconnected).
    fn change_nick(&self, nick: &str) -> bool;
    /// The nickname the server currently knows us by.
    fn current_nick(&self) -> String;
}
