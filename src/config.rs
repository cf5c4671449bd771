//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use std::path::PathBuf;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 20;

/// Palaver configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token.
    pub discord_token: String,

    /// Data directory holding the SQLite database.
    pub data_dir: PathBuf,

    /// LLM endpoint configuration.
    pub llm: LlmConfig,

    /// Web search configuration.
    pub search: SearchConfig,
}

/// LLM endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the chat-completions endpoint.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,

    /// Model name for both chat calls.
    pub model: String,
}

/// Web search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Tavily API key. Searches fail with an error envelope when unset.
    pub api_key: Option<String>,

    /// Timeout applied to each tool invocation.
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let discord_token = non_empty_var("DISCORD_TOKEN")
            .ok_or(ConfigError::MissingVar("DISCORD_TOKEN"))?;

        let data_dir = non_empty_var("PALAVER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))
            .map_err(ConfigError::Other)?;

        let llm = LlmConfig {
            api_key: non_empty_var("OPENAI_API_KEY"),
            base_url: non_empty_var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            model: non_empty_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
        };

        // A keyless setup is only valid when pointed at a custom endpoint
        // (e.g. a local server that ignores authorization).
        if llm.api_key.is_none() && llm.base_url == DEFAULT_OPENAI_BASE_URL {
            return Err(ConfigError::Invalid(
                "OPENAI_API_KEY is not set and OPENAI_BASE_URL is the default endpoint".into(),
            )
            .into());
        }

        let search = SearchConfig {
            api_key: non_empty_var("TAVILY_API_KEY"),
            timeout_secs: non_empty_var("PALAVER_SEARCH_TIMEOUT_SECS")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_SEARCH_TIMEOUT_SECS),
        };

        if search.api_key.is_none() {
            tracing::warn!("TAVILY_API_KEY is not set; web search calls will fail");
        }

        Ok(Self {
            discord_token,
            data_dir,
            llm,
            search,
        })
    }

    /// Get the SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("palaver.db")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
