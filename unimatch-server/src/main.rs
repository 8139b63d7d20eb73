use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};

use unimatch_server::config::Config;
use unimatch_server::engine::Matchmaker;
use unimatch_server::repository::SqliteRepository;
use unimatch_server::state_machine::interpreter::Services;
use unimatch_server::{app_router, AppState, Dispatcher, RecordingLogger, TelegramClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting Unimatch bot (version {})",
        unimatch_server::get_bot_version()
    );

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    // Initialize recording logger if enabled
    let recording_logger = if config.recording_enabled {
        match RecordingLogger::new(PathBuf::from(&config.recording_log_path)) {
            Ok(logger) => {
                info!(
                    "Recording enabled, logging to: {}",
                    config.recording_log_path
                );
                Some(logger)
            }
            Err(e) => {
                error!("Failed to initialize recording logger: {}", e);
                None
            }
        }
    } else {
        None
    };

    let telegram = Arc::new(TelegramClient::new_with_recording(
        config.bot_token.clone(),
        recording_logger.clone(),
    ));

    if let Some(url) = config.webhook_url() {
        telegram
            .set_webhook(&url, &config.webhook_secret)
            .await
            .context("Failed to register webhook at startup")?;
    } else {
        info!("PUBLIC_URL not set; leaving the registered webhook unchanged");
    }

    let db_path = config.state_dir.join("unimatch.db");
    info!("Using database: {}", db_path.display());
    let repository =
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?;

    let services = Services {
        engine: Matchmaker::new(Arc::new(repository)),
        messenger: telegram,
        channels: config.channels.clone(),
    };

    let app_state = Arc::new(AppState {
        dispatcher: Dispatcher::new(services),
        webhook_secret: config.webhook_secret.clone(),
        status_auth_token: config.status_auth_token.clone(),
        recording_logger,
    });

    let app = app_router(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
