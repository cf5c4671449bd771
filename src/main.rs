//! Palaver CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use palaver::config::Config;
use palaver::conversation::ConversationStore;
use palaver::llm::OpenAiChatClient;
use palaver::orchestrator::MentionOrchestrator;
use palaver::tools::{TavilyClient, ToolExecutor};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "A mention-driven Discord chat bot with conversation memory and web search")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("starting palaver");

    let config = Config::load().context("failed to load configuration from environment")?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        model = %config.llm.model,
        "configuration loaded"
    );

    let options = SqliteConnectOptions::new()
        .filename(config.sqlite_path())
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open the conversation database")?;

    let store = ConversationStore::new(pool.clone());
    store
        .initialize()
        .await
        .context("failed to initialize the conversation schema")?;
    tracing::info!(path = %config.sqlite_path().display(), "conversation store ready");

    let llm = OpenAiChatClient::new(config.llm.clone());
    let search = TavilyClient::new(config.search.api_key.clone());
    let tools = ToolExecutor::with_timeout(search, Duration::from_secs(config.search.timeout_secs));
    let orchestrator = Arc::new(MentionOrchestrator::new(store, llm, tools));

    tokio::select! {
        result = palaver::discord::run(&config.discord_token, orchestrator) => {
            result.context("gateway connection ended")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("shutting down");
    pool.close().await;
    Ok(())
}
