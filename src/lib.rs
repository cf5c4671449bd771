//! Palaver: a mention-driven Discord bot backed by an LLM, a web search
//! tool, and a SQLite conversation log.

pub mod config;
pub mod conversation;
pub mod discord;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod payload;
pub mod prompt;
pub mod tools;

pub use error::{Error, Result};

use chrono::{DateTime, Utc};

/// The bot's own identity as seen on the gateway.
///
/// Unknown until the gateway cache is primed; events that arrive before then
/// are ignored by the orchestrator.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: u64,
    pub display_name: String,
}

/// A snapshot of an inbound message, decoupled from the gateway library so
/// the orchestrator can be driven by tests.
#[derive(Debug, Clone)]
pub struct MentionEvent {
    pub message_id: u64,
    pub created_at: DateTime<Utc>,
    /// Raw message text, mention tokens included.
    pub content: String,
    /// Whether the bot was referenced in the message.
    pub mentions_bot: bool,
    pub author: AuthorMeta,
    pub channel: ChannelMeta,
    pub guild: Option<GuildMeta>,
    pub reference: Option<ReferenceMeta>,
}

/// Author metadata carried into the persisted user-turn envelope.
#[derive(Debug, Clone)]
pub struct AuthorMeta {
    pub id: u64,
    pub name: String,
    pub display_name: Option<String>,
    pub bot: bool,
}

/// Channel metadata carried into the persisted user-turn envelope.
#[derive(Debug, Clone)]
pub struct ChannelMeta {
    pub id: u64,
    /// Channel kind label, e.g. "text" or "private".
    pub kind: String,
    pub name: Option<String>,
    pub topic: Option<String>,
}

/// Guild (server) metadata. Absent for direct messages.
#[derive(Debug, Clone)]
pub struct GuildMeta {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<u64>,
    pub member_count: Option<u64>,
}

/// Metadata about the message this event replied to, if any.
#[derive(Debug, Clone)]
pub struct ReferenceMeta {
    pub message_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub guild_id: Option<u64>,
    pub author_name: Option<String>,
    /// First 500 chars of the referenced message, when resolved.
    pub content_preview: Option<String>,
}
