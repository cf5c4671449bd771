//! One-shot search probe for checking Tavily connectivity and key setup.

use clap::Parser;
use palaver::tools::TavilyClient;
use palaver::tools::search::{IncludeAnswer, SearchBackend as _, SearchDepth, SearchOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tavily-probe")]
#[command(about = "Run a single Tavily search and print the synthesized answer")]
struct Cli {
    /// Search query
    query: String,

    /// Search depth: basic or advanced
    #[arg(long, default_value = "advanced")]
    depth: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u8).range(1..=50))]
    max_results: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let depth = match cli.depth.as_str() {
        "basic" => SearchDepth::Basic,
        "advanced" => SearchDepth::Advanced,
        other => anyhow::bail!("unknown search depth: {other}"),
    };

    let options = SearchOptions {
        include_answer: Some(IncludeAnswer::Advanced),
        search_depth: Some(depth),
        max_results: Some(cli.max_results),
    };

    let api_key = std::env::var("TAVILY_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());
    let client = TavilyClient::new(api_key);

    match client.search(&cli.query, &options).await? {
        Some(answer) => println!("{answer}"),
        None => println!("(no synthesized answer returned)"),
    }
    Ok(())
}
