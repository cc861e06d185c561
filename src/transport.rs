//! Boundary between the bot core and the messaging platform.
//!
//! The platform adapter turns updates into [`InboundEvent`]s and carries
//! out the [`OutboundAction`]s the core produces. Anything that implements
//! [`ChatTransport`] can sit behind the core, including test doubles.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Identifies one message in one chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Chat identifier as the platform prints it (e.g. `-1001234567890`).
    pub chat: String,
    /// Message identifier within the chat.
    pub id: i32,
}

impl MessageRef {
    #[must_use]
    pub fn new(chat: impl Into<String>, id: i32) -> Self {
        Self {
            chat: chat.into(),
            id,
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.id)
    }
}

/// Something that happened on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Ordinary text (not a command).
    TextMessage {
        message: MessageRef,
        text: String,
        sender_name: String,
    },
    /// One or more users joined; names are in platform order.
    MembersJoined { chat: String, names: Vec<String> },
    /// A user left or was removed.
    MemberLeft { chat: String, name: String },
    /// A `/command` addressed to the bot.
    Command {
        message: MessageRef,
        name: String,
        args: Vec<String>,
    },
    /// The broadcast timer fired.
    TimerTick,
}

impl InboundEvent {
    /// Classifies a plain text message as a command or ordinary text.
    ///
    /// A command name must follow the slash directly, so `/ spam` is
    /// ordinary text. Returns `None` for a command explicitly addressed to
    /// another bot (`/help@other_bot`) when `bot_username` is known.
    #[must_use]
    pub fn from_text(
        message: MessageRef,
        text: &str,
        sender_name: impl Into<String>,
        bot_username: Option<&str>,
    ) -> Option<Self> {
        let Some(rest) = text
            .trim_start()
            .strip_prefix('/')
            .filter(|rest| starts_with_command_name(rest))
        else {
            return Some(Self::TextMessage {
                message,
                text: text.to_owned(),
                sender_name: sender_name.into(),
            });
        };

        let mut parts = rest.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let (name, mention) = head.split_once('@').map_or((head, None), |(n, m)| (n, Some(m)));
        if let (Some(mention), Some(own)) = (mention, bot_username)
            && !mention.eq_ignore_ascii_case(own.trim_start_matches('@'))
        {
            return None;
        }

        Some(Self::Command {
            message,
            name: name.to_owned(),
            args: parts.map(str::to_owned).collect(),
        })
    }
}

/// True when `rest` (the text after `/`) opens with a command name.
pub(crate) fn starts_with_command_name(rest: &str) -> bool {
    rest.chars()
        .next()
        .is_some_and(|c| !c.is_whitespace() && c != '@')
}

/// Something the platform should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    SendText { chat: String, body: String },
    DeleteMessage { message: MessageRef },
}

impl OutboundAction {
    #[must_use]
    pub fn send_text(chat: impl Into<String>, body: impl Into<String>) -> Self {
        Self::SendText {
            chat: chat.into(),
            body: body.into(),
        }
    }
}

/// The platform refused or failed to carry out an action.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Unknown chat: {0}")]
    UnknownChat(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Outbound half of the messaging platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat: &str, body: &str) -> Result<(), DeliveryError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError>;

    /// Carries out a single action.
    async fn execute(&self, action: &OutboundAction) -> Result<(), DeliveryError> {
        match action {
            OutboundAction::SendText { chat, body } => self.send_text(chat, body).await,
            OutboundAction::DeleteMessage { message } => self.delete_message(message).await,
        }
    }
}

/// Transport that only logs and remembers what it was asked to do.
///
/// Backs `--dry-run` and doubles as a test transport.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    actions: Mutex<Vec<OutboundAction>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    #[must_use]
    pub fn actions(&self) -> Vec<OutboundAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains the recorded actions.
    pub fn take(&self) -> Vec<OutboundAction> {
        std::mem::take(&mut *self.actions.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record(&self, action: OutboundAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat: &str, body: &str) -> Result<(), DeliveryError> {
        info!("[dry-run] send to {}: {}", chat, body);
        self.record(OutboundAction::send_text(chat, body));
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        info!("[dry-run] delete message {}", message);
        self.record(OutboundAction::DeleteMessage {
            message: message.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_dispatches_by_variant() {
        let transport = RecordingTransport::new();
        let send = OutboundAction::send_text("-100", "hi");
        let delete = OutboundAction::DeleteMessage {
            message: MessageRef::new("-100", 7),
        };

        transport.execute(&send).await.unwrap();
        transport.execute(&delete).await.unwrap();

        assert_eq!(transport.take(), vec![send, delete]);
        assert!(transport.actions().is_empty());
    }

    #[test]
    fn test_from_text_splits_commands() {
        let event = InboundEvent::from_text(
            MessageRef::new("-100", 1),
            "/setautoreply  hi   hello there",
            "Ann",
            None,
        );
        assert_eq!(
            event,
            Some(InboundEvent::Command {
                message: MessageRef::new("-100", 1),
                name: "setautoreply".to_owned(),
                args: vec!["hi".to_owned(), "hello".to_owned(), "there".to_owned()],
            })
        );
    }

    #[test]
    fn test_from_text_plain_and_foreign_mentions() {
        let plain = InboundEvent::from_text(MessageRef::new("-100", 1), "hello", "Ann", None);
        assert!(matches!(plain, Some(InboundEvent::TextMessage { .. })));

        let foreign = InboundEvent::from_text(
            MessageRef::new("-100", 1),
            "/help@other_bot",
            "Ann",
            Some("guard_bot"),
        );
        assert_eq!(foreign, None);

        let own = InboundEvent::from_text(
            MessageRef::new("-100", 1),
            "/help@Guard_Bot",
            "Ann",
            Some("@guard_bot"),
        );
        assert!(matches!(own, Some(InboundEvent::Command { ref name, .. }) if name == "help"));
    }

    #[test]
    fn test_from_text_needs_name_right_after_slash() {
        for line in ["/ buy spam now", "/", "/@guard_bot", "/\tsetwelcome x"] {
            let event = InboundEvent::from_text(MessageRef::new("-100", 1), line, "Ann", None);
            assert_eq!(
                event,
                Some(InboundEvent::TextMessage {
                    message: MessageRef::new("-100", 1),
                    text: line.to_owned(),
                    sender_name: "Ann".to_owned(),
                }),
                "{line:?}"
            );
        }
    }

    #[test]
    fn test_message_ref_display() {
        assert_eq!(MessageRef::new("-100", 42).to_string(), "-100/42");
    }
}
