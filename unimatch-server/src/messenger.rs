//! The messaging-platform seam.
//!
//! The interpreter only ever talks to a [`Messenger`]. The production
//! implementation is the Telegram client; tests use a recording fake.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::profile::{PhotoRef, UserId};

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatId {
    /// A private chat with a user; Telegram uses the user id as the chat id.
    User(UserId),
    /// A channel, by `@username` or numeric id.
    Channel(String),
}

impl From<UserId> for ChatId {
    fn from(user: UserId) -> Self {
        ChatId::User(user)
    }
}

/// A message the bot sent earlier, e.g. the one carrying a tapped button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    /// Callback token, parsed back by [`crate::command::Selection::parse`].
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    /// Leave whatever keyboard the user has.
    #[default]
    None,
    /// Replace the user's keyboard with these buttons (rows of labels).
    Reply(Vec<Vec<String>>),
    /// Hide the reply keyboard.
    RemoveReply,
    /// Buttons attached to the message itself.
    Inline(Vec<Vec<InlineButton>>),
}

/// A fully rendered outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Text {
        text: String,
        keyboard: Keyboard,
    },
    Photo {
        photo: PhotoRef,
        caption: String,
        keyboard: Keyboard,
    },
}

impl Delivery {
    pub fn text(text: impl Into<String>) -> Self {
        Delivery::Text {
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }

    pub fn with_keyboard(mut self, new: Keyboard) -> Self {
        match &mut self {
            Delivery::Text { keyboard, .. } | Delivery::Photo { keyboard, .. } => *keyboard = new,
        }
        self
    }

    /// The visible text (message body or photo caption).
    pub fn body(&self) -> &str {
        match self {
            Delivery::Text { text, .. } => text,
            Delivery::Photo { caption, .. } => caption,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The request never got a well-formed answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform rejected the request (blocked bot, unknown chat, ...).
    #[error("platform error {code}: {description}")]
    Api { code: i64, description: String },
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Whether `user` is currently a member of `channel`.
    async fn is_member(&self, channel: &str, user: UserId) -> Result<bool, DeliveryError>;

    async fn deliver(&self, to: &ChatId, delivery: &Delivery) -> Result<(), DeliveryError>;

    /// Replace the content of an earlier message in place.
    async fn replace(&self, message: &MessageRef, delivery: &Delivery)
        -> Result<(), DeliveryError>;

    /// Acknowledge a button tap so the client stops waiting.
    async fn acknowledge(&self, _callback_id: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}
