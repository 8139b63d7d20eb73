use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Channels a user must have joined, and where confessions are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub required: Vec<String>,
    pub confession: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            required: parse_channel_list(DEFAULT_REQUIRED_CHANNELS),
            confession: DEFAULT_CONFESSION_CHANNEL.to_string(),
        }
    }
}

const DEFAULT_REQUIRED_CHANNELS: &str = "@unimatch_ethio,@unimatch_confession";
const DEFAULT_CONFESSION_CHANNEL: &str = "@unimatch_confession";

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    /// Value Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: String,
    /// Public base URL; when set the webhook is registered at startup.
    pub public_url: Option<String>,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub channels: ChannelConfig,
    /// Optional bearer token for /status endpoint authentication.
    /// If not set, /status endpoint is disabled (returns 403 Forbidden).
    pub status_auth_token: Option<String>,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token =
            env::var("BOT_TOKEN").context("BOT_TOKEN environment variable is required")?;
        if bot_token.trim().is_empty() {
            bail!("BOT_TOKEN must not be empty");
        }

        let webhook_secret = env::var("WEBHOOK_SECRET")
            .context("WEBHOOK_SECRET environment variable is required")?;
        validate_webhook_secret(&webhook_secret)?;

        let public_url = optional_var("PUBLIC_URL").or_else(|| optional_var("RENDER_EXTERNAL_URL"));
        if let Some(url) = &public_url {
            url::Url::parse(url).context("PUBLIC_URL must be an absolute URL")?;
        }

        let port = optional_var("PORT")
            .unwrap_or_else(|| "10000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = optional_var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let required = optional_var("REQUIRED_CHANNELS")
            .map(|list| parse_channel_list(&list))
            .unwrap_or_else(|| parse_channel_list(DEFAULT_REQUIRED_CHANNELS));
        let confession = optional_var("CONFESSION_CHANNEL_ID")
            .unwrap_or_else(|| DEFAULT_CONFESSION_CHANNEL.to_string());

        let status_auth_token = parse_status_auth_token(env::var("STATUS_AUTH_TOKEN").ok());

        let recording_enabled = optional_var("RECORDING_ENABLED")
            .map(|v| v.parse::<bool>().unwrap_or(false))
            .unwrap_or(false);

        let recording_log_path =
            optional_var("RECORDING_LOG_PATH").unwrap_or_else(|| "recordings.jsonl".to_string());

        Ok(Config {
            bot_token,
            webhook_secret,
            public_url,
            port,
            state_dir,
            channels: ChannelConfig {
                required,
                confession,
            },
            status_auth_token,
            recording_enabled,
            recording_log_path,
        })
    }

    /// Full URL Telegram should post updates to.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{}/webhook", base.trim_end_matches('/')))
    }
}

/// Read an environment variable, treating empty or whitespace-only values as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Split a comma-separated channel list, dropping blanks.
pub fn parse_channel_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Telegram accepts 1-256 characters from `A-Z`, `a-z`, `0-9`, `_` and `-`.
pub fn validate_webhook_secret(secret: &str) -> Result<()> {
    if secret.is_empty() || secret.len() > 256 {
        bail!("WEBHOOK_SECRET must be 1-256 characters long");
    }
    if !secret
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("WEBHOOK_SECRET may only contain A-Z, a-z, 0-9, '_' and '-'");
    }
    Ok(())
}

/// Parse STATUS_AUTH_TOKEN from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace.
/// This prevents security issues where an empty token would allow unauthenticated access.
pub fn parse_status_auth_token(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
