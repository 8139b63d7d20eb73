//! Operational endpoints: health, service description and status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::repository::StoreStats;
use crate::webhook::secrets_match;
use crate::{get_bot_version, AppState};

/// Live conversation contexts, by flow.
#[derive(Debug, Default, Serialize)]
pub struct SessionSummary {
    pub total: usize,
    pub by_flow: BTreeMap<&'static str, usize>,
}

/// Full status data for rendering.
#[derive(Debug, Serialize)]
pub struct StatusData {
    pub version: String,
    pub store: StoreStats,
    pub sessions: SessionSummary,
}

impl StatusData {
    pub fn new(version: String, store: StoreStats, by_flow: BTreeMap<&'static str, usize>) -> Self {
        Self {
            version,
            store,
            sessions: SessionSummary {
                total: by_flow.values().sum(),
                by_flow,
            },
        }
    }
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "unimatch"
    }))
}

pub async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "unimatch",
        "version": get_bot_version(),
        "description": "Telegram matchmaking bot for Ethiopian university students",
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint",
                "authentication": "None"
            },
            {
                "path": "/webhook",
                "method": "POST",
                "description": "Telegram update receiver",
                "authentication": "X-Telegram-Bot-Api-Secret-Token header"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "Service information",
                "authentication": "None"
            },
            {
                "path": "/status",
                "method": "GET",
                "description": "Store counts and live conversation flows",
                "authentication": "Authorization: Bearer <STATUS_AUTH_TOKEN>"
            }
        ],
        "commands": [
            "/start", "/browse", "/profile", "/matches",
            "/stopchat", "/confess", "/cancel", "/help"
        ],
        "configuration": {
            "required_env_vars": ["BOT_TOKEN", "WEBHOOK_SECRET"],
            "optional_env_vars": [
                "PUBLIC_URL (or RENDER_EXTERNAL_URL)",
                "PORT (default: 10000)",
                "STATE_DIR (default: current directory)",
                "REQUIRED_CHANNELS (default: @unimatch_ethio,@unimatch_confession)",
                "CONFESSION_CHANNEL_ID (default: @unimatch_confession)",
                "STATUS_AUTH_TOKEN (unset disables /status)",
                "RECORDING_ENABLED (default: false)",
                "RECORDING_LOG_PATH (default: recordings.jsonl)"
            ]
        }
    }))
}

/// Check `Authorization: Bearer <token>` against the configured token.
/// Without a configured token the endpoint is disabled.
fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = expected else {
        return Err(StatusCode::FORBIDDEN);
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if secrets_match(expected, provided) {
        Ok(())
    } else {
        warn!("Rejected /status request with a wrong token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub async fn status_handler(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    if let Err(status) = authorize(state.status_auth_token.as_deref(), &headers) {
        return status.into_response();
    }

    let store = match state.dispatcher.services().engine.repository().stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to read store stats: {}", e);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    let flows = state.dispatcher.sessions().flow_counts();

    Json(StatusData::new(get_bot_version(), store, flows)).into_response()
}
