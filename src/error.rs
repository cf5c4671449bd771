//! Top-level error types for Palaver.

use std::time::Duration;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("gateway error: {0}")]
    Gateway(#[from] serenity::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// LLM adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider answered but not with a conforming structured response.
    #[error("structured response parse failed: {0}")]
    Parse(String),

    /// The request never produced a usable completion.
    #[error("chat request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        LlmError::Transport(error.to_string())
    }
}

/// Web search collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query is required")]
    EmptyQuery,

    #[error("TAVILY_API_KEY is not configured")]
    MissingKey,

    #[error("invalid search options: {0}")]
    InvalidOptions(String),

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("search request failed: {0}")]
    Request(String),
}
