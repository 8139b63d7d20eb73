use super::sanitizer::Sanitizer;
use super::{
    CorrelationId, Direction, EventType, RecordedEvent, RecordingLogger, CORRELATION_ID_HEADER,
};
use axum::http;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use uuid::Uuid;

/// Records every outbound Bot API request and its response status.
pub struct RecordingMiddleware {
    logger: RecordingLogger,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger) -> Self {
        Self { logger }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| extensions.get::<CorrelationId>().map(|id| id.0.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !req.headers().contains_key(CORRELATION_ID_HEADER) {
            if let Ok(value) = correlation_id.parse() {
                req.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        let method = api_method(req.url());
        self.record(
            &correlation_id,
            Direction::Request,
            method.clone(),
            request_data(&req),
        );

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => self.record(
                &correlation_id,
                Direction::Response,
                format!("{} {}", method, resp.status().as_u16()),
                serde_json::json!({
                    "status_code": resp.status().as_u16(),
                    "headers": Sanitizer::sanitize_headers(&header_map(resp.headers())),
                    "body_size": resp.content_length().unwrap_or(0),
                }),
            ),
            Err(err) => self.record(
                &correlation_id,
                Direction::Response,
                format!("{} error", method),
                serde_json::json!({ "error": err.to_string() }),
            ),
        }

        response
    }
}

impl RecordingMiddleware {
    fn record(
        &self,
        correlation_id: &str,
        direction: Direction,
        operation: String,
        data: serde_json::Value,
    ) {
        self.logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type: EventType::TelegramApiCall,
            direction,
            operation,
            data,
            metadata: HashMap::new(),
        });
    }
}

/// The Bot API method name: the last path segment.
fn api_method(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("unknown")
        .to_string()
}

fn header_map(headers: &http::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

fn request_data(req: &Request) -> serde_json::Value {
    let body = match req.body().and_then(|body| body.as_bytes()) {
        Some(bytes) => match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(json) => Sanitizer::sanitize_json(&json),
            Err(_) => serde_json::Value::String(format!("[NON_JSON_BODY_{}b]", bytes.len())),
        },
        None => serde_json::Value::Null,
    };

    serde_json::json!({
        "method": req.method().as_str(),
        "url": Sanitizer::sanitize_url(req.url().as_str()),
        "headers": Sanitizer::sanitize_headers(&header_map(req.headers())),
        "body": body,
    })
}
