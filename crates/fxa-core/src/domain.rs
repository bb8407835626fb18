use std::fmt;

use chrono::{DateTime, Utc};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

/// A stable reference to a sent Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Conversation correlation key.
///
/// Platform-provided where possible (Telegram chat id, WhatsApp sender address);
/// random for web visitors that do not bring their own.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn from_chat(chat_id: ChatId) -> Self {
        Self(chat_id.0.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Front end a message arrived through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Telegram,
    WhatsApp,
    Web,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Telegram => "telegram",
            Channel::WhatsApp => "whatsapp",
            Channel::Web => "web",
        }
    }
}

/// Sessions are scoped per channel so a web id can never collide with a chat id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub channel: Channel,
    pub id: SessionId,
}

impl SessionKey {
    pub fn new(channel: Channel, id: SessionId) -> Self {
        Self { channel, id }
    }
}

/// One inbound user message, channel-agnostic.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub session: SessionKey,
    pub text: String,
    pub sender_name: Option<String>,
    /// Sent in a group chat rather than one to one.
    pub is_group: bool,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(channel: Channel, session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session: SessionKey::new(channel, session_id),
            text: text.into(),
            sender_name: None,
            is_group: false,
            received_at: Utc::now(),
        }
    }

    pub fn with_sender(mut self, name: Option<String>) -> Self {
        self.sender_name = name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn in_group(mut self, is_group: bool) -> Self {
        self.is_group = is_group;
        self
    }

    pub fn channel(&self) -> Channel {
        self.session.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 32);
    }

    #[test]
    fn blank_sender_names_are_dropped() {
        let m = InboundMessage::new(Channel::Web, SessionId("s".into()), "hi")
            .with_sender(Some("  ".to_string()));
        assert!(m.sender_name.is_none());
    }
}
