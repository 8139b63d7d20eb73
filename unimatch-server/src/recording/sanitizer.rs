use serde_json::Value;
use std::collections::HashMap;

const REDACTED: &str = "[REDACTED]";

/// Headers that contain security-sensitive values and must be redacted.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-telegram-bot-api-secret-token",
];

pub struct Sanitizer;

impl Sanitizer {
    /// Check if a header name is sensitive and should be redacted.
    pub fn is_sensitive_header(header_name: &str) -> bool {
        let lower = header_name.to_lowercase();
        SENSITIVE_HEADERS.contains(&lower.as_str())
    }

    /// Remove sensitive data from headers
    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let value = if Self::is_sensitive_header(key) {
                    REDACTED.to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Remove the bot token from a Bot API URL.
    ///
    /// Telegram puts the token in the path (`/bot<token>/<method>`), so every
    /// recorded request URL would otherwise leak it.
    pub fn sanitize_url(url: &str) -> String {
        let Ok(mut parsed) = url::Url::parse(url) else {
            return REDACTED.to_string();
        };
        let path = parsed
            .path()
            .split('/')
            .map(|segment| {
                if segment.starts_with("bot") && segment.contains(':') {
                    format!("bot{}", REDACTED)
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        parsed.set_path(&path);
        parsed.to_string()
    }

    /// Remove sensitive data from JSON payloads
    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sanitized = serde_json::Map::new();
                for (key, val) in map {
                    let sanitized_val = match key.as_str() {
                        "token" | "secret" | "secret_token" | "password" => {
                            Value::String(REDACTED.to_string())
                        }
                        _ => Self::sanitize_json(val),
                    };
                    sanitized.insert(key.clone(), sanitized_val);
                }
                Value::Object(sanitized)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }
}
