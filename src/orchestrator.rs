//! Mention-turn orchestration.
//!
//! Coordinates the store, the LLM adapter, and the tool executor for each
//! inbound mention: persist the user turn, fetch history, call the model,
//! persist and reply, and optionally run one tool round-trip with a
//! follow-up reply. The first reply never waits on tool latency; the tool
//! round-trip is additive.

use crate::conversation::{ConversationStore, TurnRole};
use crate::error::Result;
use crate::llm::{ChatClient, HistoryEntry};
use crate::tools::{SearchBackend, ToolExecutor, serialize_envelope};
use crate::{BotIdentity, MentionEvent, payload, prompt, tools};
use anyhow::Context as _;

/// History window for the first LLM call.
pub const FIRST_PASS_HISTORY_LIMIT: i64 = 20;

/// History window for the post-tool call; two wider than the first pass to
/// account for the assistant and tool turns written in between.
pub const SECOND_PASS_HISTORY_LIMIT: i64 = 22;

/// Handle to the first reply, used to thread the follow-up off it.
#[derive(Debug, Clone, Copy)]
pub struct ReplyTicket {
    pub message_id: u64,
}

/// Outbound seam for replies, so the orchestrator can be driven by tests.
pub trait Responder: Send + Sync {
    /// Reply to the originating message without pinging its author.
    fn reply(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<ReplyTicket>> + Send;

    /// Send a second reply threaded off the first one.
    fn follow_up(
        &self,
        first: &ReplyTicket,
        text: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// Why an event produced no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    IdentityUnknown,
    BotAuthor,
    NotMentioned,
    EmptyAfterStrip,
}

/// Terminal state of one mention turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Guard rejected the event; zero store writes, zero replies.
    Ignored(IgnoreReason),
    /// The model returned no usable content; the turn ended silently.
    NoContent,
    /// The user got their reply (and possibly a tool-augmented follow-up).
    Replied { followed_up: bool },
    /// A processing failure was caught and logged; the turn was dropped.
    Failed,
}

/// Coordinates one conversation turn per inbound mention.
///
/// All collaborators are injected at construction; the orchestrator holds no
/// global state and each call builds its own message lists.
pub struct MentionOrchestrator<L, S> {
    store: ConversationStore,
    llm: L,
    tools: ToolExecutor<S>,
}

impl<L: ChatClient, S: SearchBackend> MentionOrchestrator<L, S> {
    pub fn new(store: ConversationStore, llm: L, tools: ToolExecutor<S>) -> Self {
        Self { store, llm, tools }
    }

    /// Process one inbound message event.
    ///
    /// Never propagates a failure to the event dispatcher: anything the
    /// inner flow raises is logged here and the turn is dropped.
    pub async fn handle(
        &self,
        identity: Option<&BotIdentity>,
        event: &MentionEvent,
        responder: &impl Responder,
    ) -> TurnOutcome {
        match self.process(identity, event, responder).await {
            Ok(outcome) => {
                tracing::debug!(
                    guild_id = ?event.guild.as_ref().map(|g| g.id),
                    channel_id = event.channel.id,
                    author_id = event.author.id,
                    ?outcome,
                    "mention turn finished"
                );
                outcome
            }
            Err(error) => {
                tracing::error!(
                    guild_id = ?event.guild.as_ref().map(|g| g.id),
                    channel_id = event.channel.id,
                    author_id = event.author.id,
                    %error,
                    "mention turn failed"
                );
                TurnOutcome::Failed
            }
        }
    }

    async fn process(
        &self,
        identity: Option<&BotIdentity>,
        event: &MentionEvent,
        responder: &impl Responder,
    ) -> Result<TurnOutcome> {
        let Some(identity) = identity else {
            return Ok(TurnOutcome::Ignored(IgnoreReason::IdentityUnknown));
        };
        if event.author.bot {
            return Ok(TurnOutcome::Ignored(IgnoreReason::BotAuthor));
        }
        if !event.mentions_bot {
            return Ok(TurnOutcome::Ignored(IgnoreReason::NotMentioned));
        }

        let cleaned = strip_bot_mentions(&event.content, identity.user_id);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Ok(TurnOutcome::Ignored(IgnoreReason::EmptyAfterStrip));
        }

        let guild_id = event.guild.as_ref().map(|g| g.id as i64);
        let channel_id = event.channel.id as i64;
        let bot_user_id = Some(identity.user_id as i64);

        let server_info = payload::build_server_info(event.guild.as_ref());
        let system_prompt = prompt::build_system_prompt(
            &identity.display_name,
            &server_info,
            &[tools::search::tool_schema()],
            &[tools::search::tool_instructions()],
        );

        // The user turn goes in before the model sees anything, so the
        // history read below already reflects it.
        let user_payload = payload::build_message_json(event, cleaned);
        self.store
            .append(
                guild_id,
                channel_id,
                Some(event.author.id as i64),
                TurnRole::User,
                &user_payload,
            )
            .await?;

        let history = self
            .fetch_history(guild_id, channel_id, FIRST_PASS_HISTORY_LIMIT)
            .await?;
        let parsed = self
            .llm
            .chat(&user_payload, &system_prompt, &history)
            .await?;

        if parsed.message.content.is_empty() {
            return Ok(TurnOutcome::NoContent);
        }

        let assistant_json = serde_json::to_string_pretty(&parsed)
            .context("failed to serialize assistant response")?;
        self.store
            .append(
                guild_id,
                channel_id,
                bot_user_id,
                TurnRole::Assistant,
                &assistant_json,
            )
            .await?;

        let ticket = responder
            .reply(&parsed.message.content)
            .await
            .context("failed to send reply")?;

        let Some(tool) = &parsed.tool else {
            return Ok(TurnOutcome::Replied { followed_up: false });
        };

        let envelope = self.tools.execute(tool).await;
        self.store
            .append(
                guild_id,
                channel_id,
                bot_user_id,
                TurnRole::Tool,
                &serialize_envelope(&envelope),
            )
            .await?;

        let history = self
            .fetch_history(guild_id, channel_id, SECOND_PASS_HISTORY_LIMIT)
            .await?;
        let followup = self
            .llm
            .chat(&user_payload, &system_prompt, &history)
            .await?;

        if followup.message.content.is_empty() {
            return Ok(TurnOutcome::Replied { followed_up: false });
        }

        let followup_json = serde_json::to_string_pretty(&followup)
            .context("failed to serialize follow-up response")?;
        self.store
            .append(
                guild_id,
                channel_id,
                bot_user_id,
                TurnRole::Assistant,
                &followup_json,
            )
            .await?;

        // The first reply already satisfied the user-visible contract, so a
        // failed follow-up send is logged and swallowed.
        if let Err(error) = responder.follow_up(&ticket, &followup.message.content).await {
            tracing::warn!(%error, channel_id = event.channel.id, "failed to send follow-up reply");
        }

        Ok(TurnOutcome::Replied { followed_up: true })
    }

    async fn fetch_history(
        &self,
        guild_id: Option<i64>,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let turns = self
            .store
            .recent_for_scope(guild_id, channel_id, limit)
            .await?;
        Ok(turns
            .into_iter()
            .map(|turn| HistoryEntry {
                role: turn.role,
                content: turn.content,
            })
            .collect())
    }
}

/// Remove the bot's own mention tokens (`<@id>` and `<@!id>`) from the text.
pub fn strip_bot_mentions(text: &str, bot_id: u64) -> String {
    text.replace(&format!("<@{bot_id}>"), "")
        .replace(&format!("<@!{bot_id}>"), "")
}
