//! Telegram `Update` payloads and their classification into core events.
//!
//! Only the fields the bot reads are modelled; serde ignores the rest.

use serde::Deserialize;
use tracing::debug;

use crate::command::{parse_command, Decision, Selection};
use crate::messenger::MessageRef;
use crate::profile::{PhotoRef, UserId};
use crate::state_machine::Event;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: Chat,
    pub text: Option<String>,
    /// All available sizes of a photo, smallest first.
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// An update reduced to what the core needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user: UserId,
    pub event: Event,
    /// The message whose inline button was tapped.
    pub origin: Option<MessageRef>,
    /// Callback query to acknowledge, if the update was a button tap.
    pub callback_id: Option<String>,
}

/// Classify an update, or None if the bot has nothing to do with it.
pub fn classify(update: Update) -> Option<Inbound> {
    if let Some(query) = update.callback_query {
        return classify_callback(query);
    }
    if let Some(message) = update.message {
        return classify_message(message);
    }
    debug!("Ignoring update {} without message or callback", update.update_id);
    None
}

fn classify_message(message: Message) -> Option<Inbound> {
    let Some(from) = message.from else {
        debug!("Ignoring message {} without sender", message.message_id);
        return None;
    };
    if from.is_bot || message.chat.kind != "private" {
        debug!(
            "Ignoring message {} from a {} chat",
            message.message_id, message.chat.kind
        );
        return None;
    }

    let event = if let Some(largest) = message
        .photo
        .into_iter()
        .flatten()
        .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
    {
        Event::Photo(PhotoRef(largest.file_id))
    } else if let Some(text) = message.text {
        if let Some(command) = parse_command(&text) {
            Event::Command(command)
        } else if let Some(decision) = Decision::from_label(&text) {
            Event::Decision(decision)
        } else {
            Event::Text(text)
        }
    } else {
        debug!("Ignoring unsupported message {}", message.message_id);
        return None;
    };

    Some(Inbound {
        user: UserId(from.id),
        event,
        origin: None,
        callback_id: None,
    })
}

fn classify_callback(query: CallbackQuery) -> Option<Inbound> {
    if query.from.is_bot {
        return None;
    }
    let Some(data) = query.data else {
        debug!("Ignoring callback {} without data", query.id);
        return None;
    };

    Some(Inbound {
        user: UserId(query.from.id),
        event: Event::Selection(Selection::parse(&data)),
        origin: query.message.map(|m| MessageRef {
            chat: m.chat.id,
            message_id: m.message_id,
        }),
        callback_id: Some(query.id),
    })
}
