//! OpenAI-compatible chat adapter.
//!
//! Primary path requests a structured response constrained to the
//! `ChatResponse` schema; on any failure of that call the adapter retries
//! with a plain completion and wraps the raw text, so a tool-less reply is
//! always a valid outcome.

use super::{ChatClient, ChatOutcome, ChatResponse, HistoryEntry};
use crate::config::LlmConfig;
use crate::conversation::TurnRole;
use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Chat client speaking the OpenAI chat-completions wire format.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn post_chat(&self, request: &ChatRequest<'_>) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "chat endpoint returned {status}: {body}"
            )));
        }

        Ok(response.json::<Completion>().await?)
    }

    async fn request_structured(
        &self,
        messages: &[WireMessage],
    ) -> Result<ChatResponse, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            response_format: Some(response_format()),
        };

        let completion = self.post_chat(&request).await?;
        let content = extract_content(completion)
            .ok_or_else(|| LlmError::Parse("completion carried no message content".into()))?;
        parse_structured(&content)
    }

    async fn request_text(&self, messages: &[WireMessage]) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            response_format: None,
        };

        let completion = self.post_chat(&request).await?;
        Ok(extract_content(completion).unwrap_or_default())
    }
}

impl ChatClient for OpenAiChatClient {
    async fn chat(
        &self,
        text: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<ChatResponse, LlmError> {
        let messages = build_messages(text, system_prompt, history);

        match self.request_structured(&messages).await {
            Ok(response) => Ok(ChatOutcome::Structured(response).into_response()),
            Err(error) => {
                tracing::warn!(%error, "structured chat call failed; falling back to plain completion");
                let raw = self.request_text(&messages).await.map_err(|error| {
                    tracing::error!(%error, "fallback chat call failed");
                    error
                })?;
                Ok(ChatOutcome::Raw(raw).into_response())
            }
        }
    }
}

/// Build the ordered wire message list: system prompt first, then history
/// entries with role user/assistant and non-empty content, then the new
/// user message last. Tool turns never reach the model directly.
fn build_messages(text: &str, system_prompt: &str, history: &[HistoryEntry]) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    if !system_prompt.is_empty() {
        messages.push(WireMessage {
            role: "system",
            content: system_prompt.to_string(),
        });
    }

    for entry in history {
        let role = match entry.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => continue,
        };
        if entry.content.is_empty() {
            continue;
        }
        messages.push(WireMessage {
            role,
            content: entry.content.clone(),
        });
    }

    messages.push(WireMessage {
        role: "user",
        content: text.to_string(),
    });

    messages
}

/// `response_format` payload constraining the reply to the ChatResponse shape.
fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "chat_response",
            "schema": {
                "type": "object",
                "properties": {
                    "message": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string" }
                        },
                        "required": ["content"],
                        "additionalProperties": false
                    },
                    "tool": {
                        "anyOf": [
                            {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "arguments": { "type": "object" }
                                },
                                "required": ["name"]
                            },
                            { "type": "null" }
                        ]
                    }
                },
                "required": ["message"],
                "additionalProperties": false
            }
        }
    })
}

fn extract_content(completion: Completion) -> Option<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}

/// Parse the structured content body into a `ChatResponse`.
fn parse_structured(content: &str) -> Result<ChatResponse, LlmError> {
    serde_json::from_str(content).map_err(|e| LlmError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiChatClient {
        OpenAiChatClient::new(LlmConfig {
            api_key: None,
            base_url: server.uri(),
            model: "test-model".into(),
        })
    }

    fn completion(content: &str) -> Value {
        json!({ "choices": [{ "message": { "content": content } }] })
    }

    #[tokio::test]
    async fn structured_success_needs_a_single_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"message":{"content":"structured reply"}}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .chat("hi", "be brief", &[])
            .await
            .expect("structured call should succeed");

        assert_eq!(response.message.content, "structured reply");
        assert_eq!(response.tool, None);
    }

    #[tokio::test]
    async fn non_conforming_structured_reply_falls_back_to_plain_completion() {
        let server = MockServer::start().await;

        // The structured call carries a response_format; answer it with
        // prose so parsing fails.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(
                json!({ "response_format": { "type": "json_schema" } }),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("plain prose, not JSON")),
            )
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        // The retry sends no response_format and lands here.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .chat("hi", "be brief", &[])
            .await
            .expect("fallback should recover the turn");

        assert_eq!(response.message.content, "hello");
        assert_eq!(response.tool, None, "fallback text never carries a tool");
    }

    #[tokio::test]
    async fn transport_failure_on_both_calls_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let error = client_for(&server)
            .chat("hi", "", &[])
            .await
            .expect_err("a dead endpoint must fail the turn");

        assert!(matches!(error, LlmError::Transport(_)));
    }

    #[test]
    fn parses_structured_content_with_tool() {
        let content = indoc! {r#"
            {
              "message": { "content": "let me look that up" },
              "tool": { "name": "tavily_search", "arguments": { "query": "weather berlin" } }
            }
        "#};

        let parsed = parse_structured(content).expect("conforming body should parse");
        assert_eq!(parsed.message.content, "let me look that up");
        let tool = parsed.tool.expect("tool call should be present");
        assert_eq!(tool.name, "tavily_search");
        assert_eq!(tool.arguments["query"], "weather berlin");
    }

    #[test]
    fn missing_tool_and_arguments_default() {
        let parsed = parse_structured(r#"{"message":{"content":"hi"}}"#)
            .expect("tool-less body should parse");
        assert_eq!(parsed.tool, None);

        let parsed = parse_structured(r#"{"message":{"content":"hi"},"tool":{"name":"x"}}"#)
            .expect("argument-less tool should parse");
        assert!(parsed.tool.expect("tool present").arguments.is_empty());
    }

    #[test]
    fn non_conforming_content_is_a_parse_error() {
        let error = parse_structured("plain prose, not JSON").expect_err("must not parse");
        assert!(matches!(error, LlmError::Parse(_)));
    }

    #[test]
    fn raw_fallback_never_carries_a_tool() {
        let response = ChatOutcome::Raw("hello".into()).into_response();
        assert_eq!(response.message.content, "hello");
        assert_eq!(response.tool, None);
    }

    #[test]
    fn message_list_excludes_tool_and_empty_history_entries() {
        let history = vec![
            HistoryEntry {
                role: TurnRole::User,
                content: "earlier question".into(),
            },
            HistoryEntry {
                role: TurnRole::Tool,
                content: r#"{"status":"ok"}"#.into(),
            },
            HistoryEntry {
                role: TurnRole::Assistant,
                content: String::new(),
            },
            HistoryEntry {
                role: TurnRole::Assistant,
                content: "earlier answer".into(),
            },
        ];

        let messages = build_messages("new question", "be brief", &history);
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages.last().expect("user message").content, "new question");
    }

    #[test]
    fn message_list_omits_empty_system_prompt() {
        let messages = build_messages("hi", "", &[]);
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user"]);
    }
}
