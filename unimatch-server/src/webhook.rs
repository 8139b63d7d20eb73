use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::recording::{CorrelationId, Direction, EventType, RecordedEvent, Sanitizer};
use crate::update::{classify, Update};
use crate::AppState;

/// Header in which Telegram echoes the secret given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram updates are small; anything bigger is not from Telegram.
const MAX_UPDATE_BYTES: usize = 1024 * 1024;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

/// Compare two secrets without leaking the position of the first mismatch.
pub(crate) fn secrets_match(expected: &str, provided: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

/// Reject requests without the right secret token before the body is parsed.
async fn verify_secret_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();

    let token = parts
        .headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !secrets_match(&state.webhook_secret, token) {
        error!("Invalid webhook secret token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let bytes = axum::body::to_bytes(body, MAX_UPDATE_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    // Record the update if recording is enabled
    if let Some(ref logger) = state.recording_logger {
        logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.0.clone(),
            event_type: EventType::UpdateReceived,
            direction: Direction::Request,
            operation: "webhook".to_string(),
            data: serde_json::json!({
                "headers": Sanitizer::sanitize_headers(&headers_to_hashmap(&parts.headers)),
                "body": serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map(|body| Sanitizer::sanitize_json(&body))
                    .unwrap_or(serde_json::Value::Null)
            }),
            metadata: HashMap::new(),
        });
    }

    let mut request = Request::from_parts(parts, axum::body::Body::from(bytes));
    request.extensions_mut().insert(correlation_id);

    Ok(next.run(request).await)
}

fn headers_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

/// Accept an update and queue it for its user's worker so Telegram gets its
/// 200 without waiting on the store or on outbound calls.
pub async fn telegram_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPDATE_BYTES)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let update: Update = serde_json::from_slice(&bytes).map_err(|e| {
        warn!("Malformed update: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let update_id = update.update_id;

    let Some(inbound) = classify(update) else {
        debug!("Update {} needs no processing", update_id);
        return Ok(Json(WebhookResponse {
            message: "Ignored".to_string(),
        }));
    };

    info!(
        "Update {} from user {} ({}) [{}]",
        update_id,
        inbound.user,
        inbound.event.log_summary(),
        correlation_id
    );

    state.dispatcher.enqueue(inbound);

    Ok(Json(WebhookResponse {
        message: "Accepted".to_string(),
    }))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(telegram_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_secret_token,
        ))
}
