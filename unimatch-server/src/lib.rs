pub mod catalog;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod matching;
pub mod messenger;
pub mod profile;
pub mod recording;
pub mod render;
pub mod repository;
pub mod state_machine;
pub mod status;
pub mod telegram;
pub mod update;
pub mod webhook;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use dispatcher::Dispatcher;
pub use recording::RecordingLogger;
pub use telegram::TelegramClient;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub fn get_bot_version() -> String {
    // First check for a git hash injected by the deployment build
    if let Some(git_hash) = option_env!("UNIMATCH_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        // Fall back to built crate's git detection (for cargo builds)
        short_hash(git_hash)
    } else {
        "unknown".to_string()
    }
}

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub webhook_secret: String,
    pub status_auth_token: Option<String>,
    pub recording_logger: Option<RecordingLogger>,
}

/// The full HTTP surface: operational endpoints plus the webhook.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(status::health_check))
        .route("/help", get(status::help_handler))
        .route("/status", get(status::status_handler))
        .merge(webhook::webhook_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
