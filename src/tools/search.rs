//! Web search collaborator (Tavily).

use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// The synthesized answer extracted from a search response. The executor
/// only forwards this field; raw result lists stay with the provider.
pub type SearchAnswer = Option<String>;

/// Seam for the search collaborator, so the executor and orchestrator can be
/// tested against scripted backends.
pub trait SearchBackend: Send + Sync {
    fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> impl std::future::Future<Output = Result<SearchAnswer, SearchError>> + Send;
}

/// How much synthesized answer to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeAnswer {
    None,
    Basic,
    Advanced,
}

/// How broadly the search should explore sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

/// Validated optional search parameters. Unset fields are omitted from the
/// request so the provider applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub include_answer: Option<IncludeAnswer>,
    pub search_depth: Option<SearchDepth>,
    pub max_results: Option<u8>,
}

impl SearchOptions {
    /// Validate loose tool-call arguments into options. Null values count
    /// as unset; anything else malformed is rejected.
    pub fn from_arguments(arguments: &Map<String, Value>) -> Result<Self, SearchError> {
        let include_answer = match arguments.get("include_answer") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(match s.as_str() {
                "none" => IncludeAnswer::None,
                "basic" => IncludeAnswer::Basic,
                "advanced" => IncludeAnswer::Advanced,
                other => {
                    return Err(SearchError::InvalidOptions(format!(
                        "include_answer must be one of none, basic, advanced (got {other:?})"
                    )));
                }
            }),
            Some(other) => {
                return Err(SearchError::InvalidOptions(format!(
                    "include_answer must be a string (got {other})"
                )));
            }
        };

        let search_depth = match arguments.get("search_depth") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(match s.as_str() {
                "basic" => SearchDepth::Basic,
                "advanced" => SearchDepth::Advanced,
                other => {
                    return Err(SearchError::InvalidOptions(format!(
                        "search_depth must be one of basic, advanced (got {other:?})"
                    )));
                }
            }),
            Some(other) => {
                return Err(SearchError::InvalidOptions(format!(
                    "search_depth must be a string (got {other})"
                )));
            }
        };

        let max_results = match arguments.get("max_results") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_i64() {
                Some(n) if (1..=50).contains(&n) => Some(n as u8),
                _ => {
                    return Err(SearchError::InvalidOptions(format!(
                        "max_results must be an integer between 1 and 50 (got {value})"
                    )));
                }
            },
        };

        Ok(Self {
            include_answer,
            search_depth,
            max_results,
        })
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_answer: Option<IncludeAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_depth: Option<SearchDepth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
}

/// Tavily HTTP client.
#[derive(Debug, Clone)]
pub struct TavilyClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl TavilyClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }
}

impl SearchBackend for TavilyClient {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchAnswer, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingKey)?;

        let request = TavilyRequest {
            api_key,
            query,
            include_answer: options.include_answer,
            search_depth: options.search_depth,
            max_results: options.max_results,
        };

        let response = self
            .http
            .post(TAVILY_ENDPOINT)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Request(format!(
                "search endpoint returned {status}: {body}"
            )));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        Ok(parsed.answer)
    }
}

/// JSON schema describing the web search tool, embedded in the system prompt.
pub fn tool_schema() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": crate::tools::KnownTool::WEB_SEARCH_NAME,
            "description": "Searches the web for up-to-date information using Tavily. Use for recent, factual, or source-backed queries.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Clear, specific search query phrased for a web search engine."
                    },
                    "include_answer": {
                        "type": "string",
                        "enum": ["none", "basic", "advanced"],
                        "default": "advanced",
                        "description": "Controls inclusion of synthesized answer; use 'advanced' for rich summaries."
                    },
                    "search_depth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "default": "advanced",
                        "description": "Depth of search exploration; 'advanced' for broader sources."
                    },
                    "max_results": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 50,
                        "default": 7,
                        "description": "Maximum number of results to retrieve (1-50)."
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }
        }
    })
}

/// Usage guidance for the web search tool, appended to the system prompt.
pub fn tool_instructions() -> String {
    "You can call a web search tool when external, current, or factual information is needed. \
     Use it when questions require recent events, statistics, sources, or verification. \
     Always pass a concise, specific 'query' and prefer include_answer='advanced', \
     search_depth='advanced', max_results up to 7. \
     If the user asks to browse, verify facts, find sources, or requests up-to-date info, call the tool. \
     If the answer is purely conceptual or self-contained with no need for current data, do not call the tool. \
     After a tool call, summarize the findings with attributions and note uncertainty if applicable."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_arguments_mean_all_options_unset() {
        let options =
            SearchOptions::from_arguments(&args(json!({}))).expect("empty args are valid");
        assert_eq!(options, SearchOptions::default());
    }

    #[test]
    fn null_values_count_as_unset() {
        let options = SearchOptions::from_arguments(&args(json!({
            "include_answer": null,
            "search_depth": null,
            "max_results": null,
        })))
        .expect("null args are valid");
        assert_eq!(options, SearchOptions::default());
    }

    #[test]
    fn valid_options_parse() {
        let options = SearchOptions::from_arguments(&args(json!({
            "include_answer": "advanced",
            "search_depth": "basic",
            "max_results": 7,
        })))
        .expect("valid args should parse");

        assert_eq!(options.include_answer, Some(IncludeAnswer::Advanced));
        assert_eq!(options.search_depth, Some(SearchDepth::Basic));
        assert_eq!(options.max_results, Some(7));
    }

    #[test]
    fn out_of_range_max_results_is_rejected() {
        let error = SearchOptions::from_arguments(&args(json!({ "max_results": 0 })))
            .expect_err("0 is out of range");
        assert!(matches!(error, SearchError::InvalidOptions(_)));

        let error = SearchOptions::from_arguments(&args(json!({ "max_results": 51 })))
            .expect_err("51 is out of range");
        assert!(error.to_string().contains("max_results"));
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let error = SearchOptions::from_arguments(&args(json!({ "include_answer": "verbose" })))
            .expect_err("unknown variant must fail");
        assert!(error.to_string().contains("include_answer"));

        let error = SearchOptions::from_arguments(&args(json!({ "search_depth": 3 })))
            .expect_err("non-string must fail");
        assert!(error.to_string().contains("search_depth"));
    }

    #[test]
    fn request_serialization_omits_unset_fields() {
        let request = TavilyRequest {
            api_key: "k",
            query: "q",
            include_answer: None,
            search_depth: Some(SearchDepth::Advanced),
            max_results: None,
        };

        let raw = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(raw, json!({ "api_key": "k", "query": "q", "search_depth": "advanced" }));
    }

    #[test]
    fn schema_names_the_registered_tool() {
        let schema = tool_schema();
        assert_eq!(
            schema["function"]["name"],
            crate::tools::KnownTool::WEB_SEARCH_NAME
        );
        assert_eq!(schema["function"]["parameters"]["required"], json!(["query"]));
    }
}
