use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

use unimatch_server::config::validate_webhook_secret;
use unimatch_server::repository::{ProfileRepository, SqliteRepository};
use unimatch_server::TelegramClient;

/// Unimatch: operator tools for the matchmaking bot
#[derive(Parser, Debug)]
#[command(name = "unimatch")]
#[command(about = "Operator tools for the Unimatch bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Point Telegram at a webhook URL
    SetWebhook(SetWebhookArgs),
    /// Remove the registered webhook
    DeleteWebhook(TokenArgs),
    /// Show what Telegram knows about the webhook
    WebhookInfo(TokenArgs),
    /// Print user, like, match and chat counts from a database file
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
struct TokenArgs {
    /// Bot token (if not provided, will use BOT_TOKEN environment variable)
    #[arg(long)]
    token: Option<String>,
}

#[derive(Parser, Debug)]
struct SetWebhookArgs {
    /// Full webhook URL, e.g. https://example.com/webhook
    #[arg(long)]
    url: String,

    /// Secret Telegram echoes on every delivery (if not provided, will use
    /// WEBHOOK_SECRET environment variable)
    #[arg(long)]
    secret: Option<String>,

    #[command(flatten)]
    token: TokenArgs,
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// Path to the SQLite database
    #[arg(long, default_value = "unimatch.db")]
    db: PathBuf,
}

fn from_arg_or_env(arg: Option<String>, var: &str) -> Result<String> {
    arg.or_else(|| env::var(var).ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("pass it as a flag or set {}", var))
}

fn telegram(args: TokenArgs) -> Result<TelegramClient> {
    let token = from_arg_or_env(args.token, "BOT_TOKEN").context("Bot token required")?;
    Ok(TelegramClient::new(token))
}

async fn stats(args: StatsArgs) -> Result<()> {
    if !args.db.exists() {
        return Err(anyhow!("Database not found: {}", args.db.display()));
    }
    let repository = SqliteRepository::new(&args.db)
        .with_context(|| format!("Failed to open {}", args.db.display()))?;
    let stats = repository.stats().await.context("Failed to read stats")?;

    println!("Users:       {}", stats.users);
    println!("Registered:  {}", stats.registered);
    println!("Likes:       {}", stats.likes);
    println!("Matches:     {}", stats.matches);
    println!("In a chat:   {}", stats.chatting);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::SetWebhook(args) => {
            url::Url::parse(&args.url).context("--url must be an absolute URL")?;
            let secret =
                from_arg_or_env(args.secret, "WEBHOOK_SECRET").context("Webhook secret required")?;
            validate_webhook_secret(&secret)?;
            telegram(args.token)?.set_webhook(&args.url, &secret).await?;
            println!("✅ Webhook set to {}", args.url);
        }
        Commands::DeleteWebhook(args) => {
            telegram(args)?.delete_webhook().await?;
            println!("✅ Webhook deleted");
        }
        Commands::WebhookInfo(args) => {
            let info = telegram(args)?.webhook_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Stats(args) => stats(args).await?,
    }

    Ok(())
}
