//! Connection lifecycle — registration, keepalive, outbound queue, and
//! reconnect with exponential backoff.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{IrcConfig, ReconnectConfig};
use crate::constants::{FALLBACK_NICK_MAX_LEN, MAX_LINE_BYTES, MAX_NICK_FALLBACKS};

use super::message::{self, Message};
use super::{ChatSink, IncomingMessage, IrcEvent};

// ── Shared presence ──────────────────────────────────────────────────

/// What we currently know about ourselves on the server.
#[derive(Debug)]
struct Presence {
    nick: String,
    registered: bool,
}

/// Cloneable outbound handle. Messages queue while the connection is down
/// and are flushed once the next registration completes.
#[derive(Clone)]
pub struct IrcHandle {
    outbound: mpsc::UnboundedSender<String>,
    presence: Arc<Mutex<Presence>>,
}

impl IrcHandle {
    fn enqueue(&self, line: String) {
        if self.outbound.send(line).is_err() {
            debug!("IRC client stopped, dropping outbound line");
        }
    }

    fn is_registered(&self) -> bool {
        match self.presence.lock() {
            Ok(presence) => presence.registered,
            Err(poisoned) => poisoned.into_inner().registered,
        }
    }
}

impl ChatSink for IrcHandle {
    fn send_message(&self, target: &str, text: &str) {
        for line in message::privmsg_lines(target, text) {
            self.enqueue(line);
        }
    }

    fn change_nick(&self, nick: &str) -> bool {
        // Registration always asks for the configured nick, so a request
        // made while disconnected has nothing to add.
        if !self.is_registered() {
            debug!(nick, "not registered, skipping nick change");
            return false;
        }
        self.enqueue(message::nick(nick));
        true
    }

    fn current_nick(&self) -> String {
        match self.presence.lock() {
            Ok(presence) => presence.nick.clone(),
            Err(poisoned) => poisoned.into_inner().nick.clone(),
        }
    }
}

// ── Client task ──────────────────────────────────────────────────────

/// Owns the socket. Runs until the event receiver is dropped.
pub struct IrcClient {
    irc: IrcConfig,
    reconnect: ReconnectConfig,
    presence: Arc<Mutex<Presence>>,
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<IrcEvent>,
}

/// How one connection attempt ended.
struct ConnectionEnd {
    registered: bool,
    reason: String,
}

impl IrcClient {
    /// Spawn the client on the current runtime.
    ///
    /// Returns the outbound handle, the single-consumer event stream, and
    /// the task handle.
    pub fn spawn(
        irc: IrcConfig,
        reconnect: ReconnectConfig,
    ) -> (IrcHandle, mpsc::UnboundedReceiver<IrcEvent>, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let presence = Arc::new(Mutex::new(Presence {
            nick: irc.nickname.clone(),
            registered: false,
        }));

        let client = IrcClient {
            irc,
            reconnect,
            presence: presence.clone(),
            outbound: outbound_rx,
            events: events_tx,
        };
        let task = tokio::spawn(client.run());

        let handle = IrcHandle {
            outbound: outbound_tx,
            presence,
        };
        (handle, events_rx, task)
    }

    async fn run(mut self) {
        let initial = self.reconnect.initial_backoff();
        let mut backoff = initial;

        loop {
            let end = self.run_connection().await;
            self.set_registered(false);

            if end.registered {
                backoff = initial;
            }
            warn!(reason = %end.reason, retry_in_secs = backoff.as_secs(), "IRC connection ended");

            let event = IrcEvent::Disconnected { reason: end.reason };
            if self.events.send(event).is_err() {
                debug!("session gone, stopping IRC client");
                return;
            }

            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, self.reconnect.max_backoff());
        }
    }

    async fn run_connection(&mut self) -> ConnectionEnd {
        let addr = format!("{}:{}", self.irc.server, self.irc.port);
        let stream = match TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect to {addr}"))
        {
            Ok(stream) => stream,
            Err(err) => {
                return ConnectionEnd {
                    registered: false,
                    reason: format!("{err:#}"),
                };
            }
        };
        info!(%addr, nick = %self.irc.nickname, "connected, registering");

        let (read_half, mut writer) = stream.into_split();
        let (line_tx, mut lines) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_lines(read_half, line_tx));

        let mut registration = Registration::new(&self.irc);
        self.set_nick(registration.current.clone());

        let result = self.drive(&mut writer, &mut lines, &mut registration).await;
        reader.abort();

        ConnectionEnd {
            registered: registration.registered,
            reason: result.unwrap_or_else(|err| format!("{err:#}")),
        }
    }

    /// Pump lines in both directions until the connection ends, returning
    /// the reason it ended.
    ///
    /// Besides a hangup, the connection ends when the server has not
    /// welcomed us by the registration deadline, or stays silent through
    /// an idle PING and its grace period.
    async fn drive(
        &mut self,
        writer: &mut OwnedWriteHalf,
        lines: &mut mpsc::UnboundedReceiver<String>,
        registration: &mut Registration,
    ) -> Result<String> {
        for line in registration.greeting() {
            write_line(writer, &line).await?;
        }

        let ping_interval = self.reconnect.ping_interval();
        let registration_deadline = tokio::time::sleep(self.reconnect.registration_timeout());
        let idle = tokio::time::sleep(ping_interval);
        tokio::pin!(registration_deadline, idle);
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        return Ok("connection closed by server".to_string());
                    };
                    idle.as_mut().reset(Instant::now() + ping_interval);
                    awaiting_pong = false;

                    let Some(msg) = Message::parse(&line) else {
                        debug!(%line, "ignoring unparseable line");
                        continue;
                    };

                    let reaction = registration.on_message(&msg);
                    for reply in &reaction.replies {
                        write_line(writer, reply).await?;
                    }
                    if let Some(nick) = reaction.nick {
                        self.set_nick(nick);
                    }
                    if let Some(event) = reaction.event {
                        if let IrcEvent::Registered { nick } = &event {
                            info!(%nick, channel = %self.irc.channel, "registered");
                            self.set_registered(true);
                        }
                        if self.events.send(event).is_err() {
                            return Ok("session closed".to_string());
                        }
                    }
                    if let Some(reason) = reaction.closed {
                        return Ok(reason);
                    }
                }
                () = &mut registration_deadline, if !registration.registered => {
                    return Ok("registration timed out".to_string());
                }
                () = &mut idle, if registration.registered => {
                    if awaiting_pong {
                        return Ok("ping timeout".to_string());
                    }
                    write_line(writer, &message::ping(&self.irc.server)).await?;
                    awaiting_pong = true;
                    idle.as_mut().reset(Instant::now() + self.reconnect.ping_timeout());
                }
                Some(line) = self.outbound.recv(), if registration.registered => {
                    write_line(writer, &line).await?;
                }
            }
        }
    }

    fn set_nick(&self, nick: String) {
        match self.presence.lock() {
            Ok(mut presence) => presence.nick = nick,
            Err(poisoned) => poisoned.into_inner().nick = nick,
        }
    }

    fn set_registered(&self, registered: bool) {
        match self.presence.lock() {
            Ok(mut presence) => presence.registered = registered,
            Err(poisoned) => poisoned.into_inner().registered = registered,
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    debug!(%line, "send");
    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .context("write to IRC server")
}

/// Read CRLF-terminated lines, decoding lossily so a stray latin-1 byte
/// from another client never tears down the connection. Lines longer than
/// [`MAX_LINE_BYTES`] are dropped whole.
async fn read_lines<R>(read_half: R, lines: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => return,
            Ok(n) => {
                if n == MAX_LINE_BYTES && !buf.ends_with(b"\n") {
                    warn!(limit = MAX_LINE_BYTES, "dropping oversized line");
                    if let Err(err) = skip_line(&mut reader).await {
                        warn!(error = %err, "IRC read failed");
                        return;
                    }
                    continue;
                }
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                if lines.send(line.to_string()).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "IRC read failed");
                return;
            }
        }
    }
}

/// Consume input up to and including the next `\n` without buffering it.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

// ── Registration state machine ───────────────────────────────────────

/// Per-connection protocol state. Pure: it only decides what to reply
/// and what to report, the caller does the I/O.
#[derive(Debug)]
struct Registration {
    current: String,
    /// Configured nick that fallbacks are derived from.
    base: String,
    /// Nick rejections seen before the welcome.
    fallbacks: usize,
    username: String,
    realname: String,
    channel: String,
    registered: bool,
}

/// What a single inbound line calls for.
#[derive(Debug, Default)]
struct Reaction {
    replies: Vec<String>,
    nick: Option<String>,
    event: Option<IrcEvent>,
    closed: Option<String>,
}

impl Registration {
    fn new(irc: &IrcConfig) -> Self {
        Self {
            current: irc.nickname.clone(),
            base: irc.nickname.clone(),
            fallbacks: 0,
            username: irc.username.clone(),
            realname: irc.realname.clone(),
            channel: irc.channel.clone(),
            registered: false,
        }
    }

    fn greeting(&self) -> Vec<String> {
        vec![
            message::nick(&self.current),
            message::user(&self.username, &self.realname),
        ]
    }

    fn on_message(&mut self, msg: &Message) -> Reaction {
        let mut reaction = Reaction::default();
        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.last().map(String::as_str).unwrap_or_default();
                reaction.replies.push(message::pong(token));
            }
            // RPL_WELCOME: the first param is the nick the server settled on.
            "001" => {
                if let Some(nick) = msg.params.first() {
                    self.current = nick.clone();
                }
                self.registered = true;
                reaction.replies.push(message::join(&self.channel));
                reaction.nick = Some(self.current.clone());
                reaction.event = Some(IrcEvent::Registered {
                    nick: self.current.clone(),
                });
            }
            // ERR_ERRONEUSNICKNAME, ERR_NICKNAMEINUSE
            "432" | "433" => {
                if self.registered {
                    debug!(code = %msg.command, nick = %self.current, "nick change refused");
                } else if self.fallbacks >= MAX_NICK_FALLBACKS {
                    reaction.closed = Some(format!(
                        "no nickname accepted after {} attempts",
                        self.fallbacks + 1
                    ));
                } else {
                    self.fallbacks += 1;
                    self.current = fallback_nick(&self.base, self.fallbacks);
                    debug!(code = %msg.command, nick = %self.current, "trying fallback nick");
                    reaction.replies.push(message::nick(&self.current));
                    reaction.nick = Some(self.current.clone());
                }
            }
            "NICK" => {
                let ours = msg.source_nick() == Some(self.current.as_str());
                if let (true, Some(new_nick)) = (ours, msg.params.first()) {
                    info!(old = %self.current, new = %new_nick, "nick changed");
                    self.current = new_nick.clone();
                    reaction.nick = Some(self.current.clone());
                }
            }
            "PRIVMSG" => {
                if let (Some(source), [target, text, ..]) = (msg.source_nick(), msg.params.as_slice())
                {
                    reaction.event = Some(IrcEvent::Message(IncomingMessage {
                        source: source.to_string(),
                        target: target.clone(),
                        text: text.clone(),
                    }));
                }
            }
            "ERROR" => {
                let reason = msg.params.last().cloned().unwrap_or_default();
                reaction.closed = Some(format!("server error: {reason}"));
            }
            _ => {}
        }
        reaction
    }
}

/// The `attempt`-th alternative to `base`: `base_`, then `base_1`, `base_2`,
/// and so on, truncating `base` so the result fits the length limit.
fn fallback_nick(base: &str, attempt: usize) -> String {
    let suffix = match attempt {
        0 | 1 => "_".to_string(),
        n => format!("_{}", n - 1),
    };
    let keep = FALLBACK_NICK_MAX_LEN.saturating_sub(suffix.len());
    let stem: String = base.chars().take(keep).collect();
    stem + &suffix
}
