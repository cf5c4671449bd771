//! LLM chat types and the client seam used by the orchestrator.

pub mod openai;

pub use openai::OpenAiChatClient;

use crate::conversation::TurnRole;
use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The reply text portion of a chat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub content: String,
}

/// A structured tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUsage {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// The structured response shape requested from the provider.
///
/// Only its serialization is persisted; the value itself is consumed by the
/// orchestrator and discarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub tool: Option<ToolUsage>,
}

/// Outcome of a provider round-trip before normalization.
///
/// The adapter resolves the structured-versus-fallback split here instead of
/// leaking exception-driven control flow to the call site.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    /// The provider produced a conforming structured response.
    Structured(ChatResponse),
    /// The fallback plain completion produced raw text (possibly empty).
    Raw(String),
}

impl ChatOutcome {
    /// Normalize into a `ChatResponse`. Raw text never carries a tool call.
    pub fn into_response(self) -> ChatResponse {
        match self {
            ChatOutcome::Structured(response) => response,
            ChatOutcome::Raw(content) => ChatResponse {
                message: ChatMessage { content },
                tool: None,
            },
        }
    }
}

/// One prior turn as presented to the model.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: TurnRole,
    pub content: String,
}

/// Client seam for the chat endpoint, so the orchestrator can be driven by
/// scripted fakes in tests.
pub trait ChatClient: Send + Sync {
    /// Send one chat request and return the normalized response.
    fn chat(
        &self,
        text: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> impl std::future::Future<Output = Result<ChatResponse, LlmError>> + Send;
}
