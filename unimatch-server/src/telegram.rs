//! Telegram Bot API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::messenger::{ChatId, Delivery, DeliveryError, Keyboard, MessageRef, Messenger};
use crate::profile::UserId;
use crate::recording::{RecordingLogger, RecordingMiddleware};

const API_BASE: &str = "https://api.telegram.org";

/// Membership statuses that count as "joined".
const MEMBER_STATUSES: &[&str] = &["creator", "administrator", "member"];

#[derive(Clone)]
pub struct TelegramClient {
    client: ClientWithMiddleware,
    token: String,
    api_base: String,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    /// Only present for `restricted` members.
    #[serde(default)]
    is_member: bool,
}

impl ChatMember {
    fn has_joined(&self) -> bool {
        MEMBER_STATUSES.contains(&self.status.as_str())
            || (self.status == "restricted" && self.is_member)
    }
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self::new_with_recording(token, None)
    }

    pub fn new_with_recording(token: String, recording_logger: Option<RecordingLogger>) -> Self {
        Self {
            client: create_telegram_client(recording_logger),
            token,
            api_base: API_BASE.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Call a Bot API method with a JSON body.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, DeliveryError> {
        debug!("Calling Bot API method {}", method);

        let response = self
            .client
            .post(self.method_url(method))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(format!("unreadable {} response: {}", method, e)))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(DeliveryError::Api {
                code: error_code.unwrap_or(0),
                description: description.unwrap_or_else(|| format!("{} failed", method)),
            }),
        }
    }

    /// Register `url` as the webhook, with Telegram echoing `secret` in the
    /// secret-token header of every delivery.
    pub async fn set_webhook(&self, url: &str, secret: &str) -> Result<()> {
        info!("Registering webhook at {}", url);
        let _: bool = self
            .call(
                "setWebhook",
                &json!({
                    "url": url,
                    "secret_token": secret,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await
            .context("Failed to set webhook")?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self
            .call("deleteWebhook", &json!({}))
            .await
            .context("Failed to delete webhook")?;
        Ok(())
    }

    pub async fn webhook_info(&self) -> Result<Value> {
        self.call("getWebhookInfo", &json!({}))
            .await
            .context("Failed to fetch webhook info")
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn is_member(&self, channel: &str, user: UserId) -> Result<bool, DeliveryError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": channel, "user_id": user.0 }),
            )
            .await?;
        Ok(member.has_joined())
    }

    async fn deliver(&self, to: &ChatId, delivery: &Delivery) -> Result<(), DeliveryError> {
        let (method, body) = send_request(to, delivery);
        let _: Value = self.call(method, &body).await?;
        Ok(())
    }

    async fn replace(
        &self,
        message: &MessageRef,
        delivery: &Delivery,
    ) -> Result<(), DeliveryError> {
        let (method, body) = edit_request(message, delivery);
        // Edits return the message, or `true` for inline messages.
        let _: Value = self.call(method, &body).await?;
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), DeliveryError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }
}

fn send_request(to: &ChatId, delivery: &Delivery) -> (&'static str, Value) {
    let (method, mut body) = match delivery {
        Delivery::Text { text, .. } => ("sendMessage", json!({ "chat_id": to, "text": text })),
        Delivery::Photo { photo, caption, .. } => (
            "sendPhoto",
            json!({ "chat_id": to, "photo": photo.0, "caption": caption }),
        ),
    };
    if let Some(markup) = reply_markup(keyboard_of(delivery)) {
        body["reply_markup"] = markup;
    }
    (method, body)
}

/// Edits can only carry inline keyboards; any other keyboard is dropped.
fn edit_request(message: &MessageRef, delivery: &Delivery) -> (&'static str, Value) {
    let (method, mut body) = match delivery {
        Delivery::Text { text, .. } => (
            "editMessageText",
            json!({ "chat_id": message.chat, "message_id": message.message_id, "text": text }),
        ),
        Delivery::Photo { caption, .. } => (
            "editMessageCaption",
            json!({ "chat_id": message.chat, "message_id": message.message_id, "caption": caption }),
        ),
    };
    let keyboard = keyboard_of(delivery);
    if matches!(keyboard, Keyboard::Inline(_)) {
        if let Some(markup) = reply_markup(keyboard) {
            body["reply_markup"] = markup;
        }
    }
    (method, body)
}

fn keyboard_of(delivery: &Delivery) -> &Keyboard {
    match delivery {
        Delivery::Text { keyboard, .. } | Delivery::Photo { keyboard, .. } => keyboard,
    }
}

fn reply_markup(keyboard: &Keyboard) -> Option<Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Reply(rows) => Some(json!({
            "keyboard": rows
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
            "one_time_keyboard": true,
            "resize_keyboard": true,
        })),
        Keyboard::RemoveReply => Some(json!({ "remove_keyboard": true })),
        Keyboard::Inline(rows) => Some(json!({
            "inline_keyboard": rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| json!({ "text": b.text, "callback_data": b.data }))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>(),
        })),
    }
}

pub fn create_telegram_client(recording_logger: Option<RecordingLogger>) -> ClientWithMiddleware {
    let client = Client::builder()
        .user_agent(concat!("unimatch/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_default();

    let mut builder = ClientBuilder::new(client);

    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger));
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::InlineButton;
    use crate::profile::PhotoRef;

    #[test]
    fn test_photo_with_reply_keyboard() {
        let delivery = Delivery::Photo {
            photo: PhotoRef::from("file-1"),
            caption: "hi".into(),
            keyboard: Keyboard::Reply(vec![vec!["👍 Like".into(), "⏭️ Skip".into()]]),
        };
        let (method, body) = send_request(&ChatId::User(UserId(7)), &delivery);
        assert_eq!(method, "sendPhoto");
        assert_eq!(
            body,
            json!({
                "chat_id": 7,
                "photo": "file-1",
                "caption": "hi",
                "reply_markup": {
                    "keyboard": [[{ "text": "👍 Like" }, { "text": "⏭️ Skip" }]],
                    "one_time_keyboard": true,
                    "resize_keyboard": true
                }
            })
        );
    }

    #[test]
    fn test_channel_chat_id_is_username() {
        let (method, body) = send_request(
            &ChatId::Channel("@unimatch_confession".into()),
            &Delivery::text("📩 New Confession"),
        );
        assert_eq!(method, "sendMessage");
        assert_eq!(body["chat_id"], "@unimatch_confession");
        assert!(body.get("reply_markup").is_none());
    }

    #[test]
    fn test_edit_keeps_only_inline_keyboards() {
        let message = MessageRef {
            chat: 5,
            message_id: 9,
        };
        let inline = Delivery::text("pick").with_keyboard(Keyboard::Inline(vec![vec![
            InlineButton {
                text: "✅ Done".into(),
                data: "__done__".into(),
            },
        ]]));
        let (method, body) = edit_request(&message, &inline);
        assert_eq!(method, "editMessageText");
        assert_eq!(
            body["reply_markup"],
            json!({ "inline_keyboard": [[{ "text": "✅ Done", "callback_data": "__done__" }]] })
        );

        let removal = Delivery::text("done").with_keyboard(Keyboard::RemoveReply);
        let (_, body) = edit_request(&message, &removal);
        assert!(body.get("reply_markup").is_none());
    }

    #[test]
    fn test_member_statuses() {
        let member = |status: &str, is_member: bool| ChatMember {
            status: status.into(),
            is_member,
        };
        assert!(member("creator", false).has_joined());
        assert!(member("member", false).has_joined());
        assert!(member("restricted", true).has_joined());
        assert!(!member("restricted", false).has_joined());
        assert!(!member("left", false).has_joined());
        assert!(!member("kicked", false).has_joined());
    }

    #[test]
    fn test_api_error_envelope() {
        let envelope: ApiResponse<Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }))
        .unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.error_code, Some(403));
        assert!(envelope.result.is_none());
    }
}
