//! Tool dispatch and result envelopes.
//!
//! The registry is a closed enum so adding a tool forces every match site to
//! handle it; unknown names become error envelopes, never errors.

pub mod search;

pub use search::{SearchBackend, SearchOptions, TavilyClient};

use crate::error::SearchError;
use crate::llm::ToolUsage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Default timeout for a single tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Tools the executor knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownTool {
    WebSearch,
}

impl KnownTool {
    pub const WEB_SEARCH_NAME: &'static str = "tavily_search";

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            Self::WEB_SEARCH_NAME => Some(KnownTool::WebSearch),
            _ => None,
        }
    }
}

/// Execution status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Normalized result of a tool invocation, persisted as a `tool` turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultEnvelope {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    fn ok(tool: &str, arguments: &Map<String, Value>, result: Value) -> Self {
        Self {
            status: ToolStatus::Ok,
            tool: Some(tool.to_string()),
            arguments: arguments.clone(),
            result: Some(result),
            error: None,
        }
    }

    fn error(tool: Option<&str>, arguments: &Map<String, Value>, message: String) -> Self {
        Self {
            status: ToolStatus::Error,
            tool: tool.map(String::from),
            arguments: arguments.clone(),
            result: None,
            error: Some(message),
        }
    }
}

/// Dispatches named tool calls to their implementations.
///
/// `execute` always returns an envelope; tool-specific failures never
/// propagate past this boundary.
#[derive(Debug, Clone)]
pub struct ToolExecutor<S> {
    search: S,
    timeout: Duration,
}

impl<S: SearchBackend> ToolExecutor<S> {
    pub fn new(search: S) -> Self {
        Self::with_timeout(search, DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(search: S, timeout: Duration) -> Self {
        Self { search, timeout }
    }

    /// Dispatch one tool call and wrap its outcome.
    pub async fn execute(&self, usage: &ToolUsage) -> ResultEnvelope {
        let name = usage.name.trim();
        if name.is_empty() {
            return ResultEnvelope::error(None, &Map::new(), "missing tool name".into());
        }

        match KnownTool::from_name(name) {
            Some(KnownTool::WebSearch) => self.run_web_search(name, &usage.arguments).await,
            None => ResultEnvelope::error(
                Some(name),
                &usage.arguments,
                format!("unknown tool: {name}"),
            ),
        }
    }

    async fn run_web_search(&self, name: &str, arguments: &Map<String, Value>) -> ResultEnvelope {
        // The query is trimmed but not validated here: an empty query is a
        // search failure, reported through the envelope like any other.
        let query = arguments
            .get("query")
            .map(value_to_string)
            .unwrap_or_default();

        let options = match SearchOptions::from_arguments(arguments) {
            Ok(options) => options,
            Err(error) => {
                tracing::error!(%error, tool = name, "rejected tool arguments");
                return ResultEnvelope::error(Some(name), arguments, error.to_string());
            }
        };

        let outcome =
            tokio::time::timeout(self.timeout, self.search.search(query.trim(), &options)).await;

        let error = match outcome {
            Ok(Ok(answer)) => {
                return ResultEnvelope::ok(name, arguments, json!({ "answer": answer }));
            }
            Ok(Err(error)) => error,
            Err(_elapsed) => SearchError::Timeout(self.timeout),
        };

        match &error {
            SearchError::Timeout(timeout) => {
                tracing::error!(timeout_secs = timeout.as_secs(), "web search timed out");
            }
            other => {
                tracing::error!(error = %other, "web search failed");
            }
        }

        ResultEnvelope::error(Some(name), arguments, error.to_string())
    }
}

/// Serialize an envelope to compact JSON.
///
/// The envelope shape cannot realistically fail to serialize, but a failure
/// degrades to a fixed error envelope instead of raising.
pub fn serialize_envelope(envelope: &ResultEnvelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|_| {
        r#"{"status":"error","error":"failed to serialize tool result"}"#.to_string()
    })
}

/// Mirror loose argument values into strings the way the search API expects.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::search::SearchAnswer;
    use parking_lot::Mutex;

    /// Scripted search backend returning a queued outcome per call.
    struct ScriptedSearch {
        outcomes: Mutex<Vec<Result<SearchAnswer, SearchError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        fn new(outcomes: Vec<Result<SearchAnswer, SearchError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl SearchBackend for &ScriptedSearch {
        async fn search(
            &self,
            query: &str,
            _options: &SearchOptions,
        ) -> Result<SearchAnswer, SearchError> {
            self.queries.lock().push(query.to_string());
            self.outcomes.lock().remove(0)
        }
    }

    fn usage(name: &str, arguments: serde_json::Value) -> ToolUsage {
        ToolUsage {
            name: name.into(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_envelope_with_echo() {
        let search = ScriptedSearch::new(vec![]);
        let executor = ToolExecutor::new(&search);

        let envelope = executor
            .execute(&usage("crystal_ball", json!({ "question": "?" })))
            .await;

        assert_eq!(envelope.status, ToolStatus::Error);
        assert_eq!(envelope.tool.as_deref(), Some("crystal_ball"));
        assert_eq!(envelope.arguments["question"], "?");
        assert_eq!(envelope.error.as_deref(), Some("unknown tool: crystal_ball"));
    }

    #[tokio::test]
    async fn missing_tool_name_is_an_error_envelope() {
        let search = ScriptedSearch::new(vec![]);
        let executor = ToolExecutor::new(&search);

        let envelope = executor.execute(&usage("  ", json!({}))).await;
        assert_eq!(envelope.status, ToolStatus::Error);
        assert_eq!(envelope.tool, None);
        assert_eq!(envelope.error.as_deref(), Some("missing tool name"));
    }

    #[tokio::test]
    async fn successful_search_wraps_the_answer() {
        let search = ScriptedSearch::new(vec![Ok(Some("42 degrees".to_string()))]);
        let executor = ToolExecutor::new(&search);

        let envelope = executor
            .execute(&usage(
                "tavily_search",
                json!({ "query": "  weather berlin  ", "max_results": 5 }),
            ))
            .await;

        assert_eq!(envelope.status, ToolStatus::Ok);
        assert_eq!(envelope.result, Some(json!({ "answer": "42 degrees" })));
        assert_eq!(envelope.arguments["max_results"], 5);
        assert_eq!(search.queries.lock()[0], "weather berlin");
    }

    #[tokio::test]
    async fn empty_query_is_passed_through_and_fails_in_the_search_call() {
        let search = ScriptedSearch::new(vec![Err(SearchError::EmptyQuery)]);
        let executor = ToolExecutor::new(&search);

        let envelope = executor.execute(&usage("tavily_search", json!({}))).await;

        assert_eq!(search.queries.lock().len(), 1, "search must still be invoked");
        assert_eq!(envelope.status, ToolStatus::Error);
        assert_eq!(envelope.error.as_deref(), Some("query is required"));
    }

    #[tokio::test]
    async fn invalid_options_become_error_envelopes() {
        let search = ScriptedSearch::new(vec![]);
        let executor = ToolExecutor::new(&search);

        let envelope = executor
            .execute(&usage(
                "tavily_search",
                json!({ "query": "x", "max_results": 99 }),
            ))
            .await;

        assert_eq!(envelope.status, ToolStatus::Error);
        assert!(
            envelope.error.as_deref().unwrap_or_default().contains("max_results"),
            "error should name the offending option"
        );
        assert!(search.queries.lock().is_empty(), "backend must not be called");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_searches_are_cut_off_by_the_timeout() {
        struct SleepySearch;
        impl SearchBackend for SleepySearch {
            async fn search(
                &self,
                _query: &str,
                _options: &SearchOptions,
            ) -> Result<SearchAnswer, SearchError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Some("too late".to_string()))
            }
        }

        let executor = ToolExecutor::with_timeout(SleepySearch, Duration::from_secs(1));
        let envelope = executor
            .execute(&usage("tavily_search", json!({ "query": "x" })))
            .await;

        assert_eq!(envelope.status, ToolStatus::Error);
        assert!(
            envelope.error.as_deref().unwrap_or_default().contains("timed out"),
            "timeout must be reported distinctly"
        );
    }

    #[test]
    fn envelope_round_trips_through_serialization() {
        let envelope = ResultEnvelope {
            status: ToolStatus::Error,
            tool: Some("tavily_search".into()),
            arguments: json!({ "query": "x" }).as_object().cloned().unwrap_or_default(),
            result: None,
            error: Some("search timed out after 20s".into()),
        };

        let raw = serialize_envelope(&envelope);
        let parsed: ResultEnvelope =
            serde_json::from_str(&raw).expect("serialized envelope should parse back");

        assert_eq!(parsed.status, envelope.status);
        assert_eq!(parsed.tool, envelope.tool);
        assert_eq!(parsed.arguments, envelope.arguments);
    }
}
