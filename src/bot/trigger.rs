//! Directed-trigger detection: is a channel message addressed to us?

use crate::irc::IncomingMessage;
use crate::util::is_channel;

/// A channel message that asked the bot for something.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    /// Text after the address, trimmed. May be empty.
    pub query: String,
    /// Channel the reply goes to.
    pub reply_target: String,
    pub requester: String,
}

impl Trigger {
    /// Reply text addressed visibly to the requester.
    pub fn reply(&self, text: &str) -> String {
        format!("{}: {text}", self.requester)
    }
}

/// Check whether `message` starts with `"<nick>:"` for either the nick we
/// currently hold or the one we are configured with.
///
/// Answering to the configured nick keeps the bot usable while a nick
/// collision has it running under a fallback name.
pub fn parse(
    message: &IncomingMessage,
    current_nick: &str,
    configured_nick: &str,
) -> Option<Trigger> {
    if !is_channel(&message.target) {
        return None;
    }

    let text = message.text.as_str();
    let addressed = [current_nick, configured_nick].into_iter().any(|nick| {
        !nick.is_empty()
            && text
                .strip_prefix(nick)
                .is_some_and(|rest| rest.starts_with(':'))
    });
    if !addressed {
        return None;
    }

    let (_, query) = text.split_once(':')?;
    Some(Trigger {
        query: query.trim().to_string(),
        reply_target: message.target.clone(),
        requester: message.source.clone(),
    })
}
