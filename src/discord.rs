//! Discord gateway glue.
//!
//! Translates serenity events into gateway-agnostic snapshots, hands them to
//! the orchestrator on a spawned task, and sends replies back through the
//! HTTP API. Everything the orchestrator needs is copied out of the cache
//! before the task is spawned.

use crate::error::Result;
use crate::llm::ChatClient;
use crate::orchestrator::{MentionOrchestrator, ReplyTicket, Responder};
use crate::tools::SearchBackend;
use crate::{AuthorMeta, BotIdentity, ChannelMeta, GuildMeta, MentionEvent, ReferenceMeta};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Context, CreateAllowedMentions, CreateMessage, EventHandler,
    GatewayIntents, Http, Message, MessageId, Ready, UserId,
};
use std::sync::{Arc, OnceLock};

/// Hard limit Discord places on message content.
const MESSAGE_CONTENT_LIMIT: usize = 2000;

/// How much of a referenced message is carried into the user-turn payload.
const REFERENCE_PREVIEW_CHARS: usize = 500;

/// Gateway event handler delegating mention turns to the orchestrator.
pub struct Handler<L, S> {
    orchestrator: Arc<MentionOrchestrator<L, S>>,
    identity: OnceLock<BotIdentity>,
}

impl<L, S> Handler<L, S> {
    pub fn new(orchestrator: Arc<MentionOrchestrator<L, S>>) -> Self {
        Self {
            orchestrator,
            identity: OnceLock::new(),
        }
    }
}

#[async_trait]
impl<L, S> EventHandler for Handler<L, S>
where
    L: ChatClient + 'static,
    S: SearchBackend + 'static,
{
    async fn ready(&self, _ctx: Context, ready: Ready) {
        let identity = BotIdentity {
            user_id: ready.user.id.get(),
            display_name: ready.user.name.clone(),
        };
        tracing::info!(
            user = %identity.display_name,
            id = identity.user_id,
            "gateway session ready"
        );
        // Reconnects re-deliver ready; the first identity wins.
        let _ = self.identity.set(identity);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(identity) = self.identity.get() else {
            return;
        };

        let event = snapshot(&ctx, &msg, identity.user_id);
        if event.author.bot || !event.mentions_bot {
            return;
        }

        let responder = SerenityResponder {
            http: ctx.http.clone(),
            channel_id: msg.channel_id,
            message_id: msg.id,
        };
        let orchestrator = self.orchestrator.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            orchestrator
                .handle(Some(&identity), &event, &responder)
                .await;
        });
    }
}

/// Connect to the gateway and run until the connection ends.
pub async fn run<L, S>(token: &str, orchestrator: Arc<MentionOrchestrator<L, S>>) -> Result<()>
where
    L: ChatClient + 'static,
    S: SearchBackend + 'static,
{
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(Handler::new(orchestrator))
        .await?;
    client.start().await?;
    Ok(())
}

/// Copy everything the orchestrator needs out of the message and the cache.
///
/// Cache references are not held across awaits; this runs synchronously in
/// the event handler before the processing task is spawned.
fn snapshot(ctx: &Context, msg: &Message, bot_id: u64) -> MentionEvent {
    let guild = msg.guild_id.and_then(|guild_id| {
        ctx.cache.guild(guild_id).map(|guild| GuildMeta {
            id: guild.id.get(),
            name: guild.name.clone(),
            description: guild.description.clone(),
            owner_id: Some(guild.owner_id.get()),
            member_count: Some(guild.member_count),
        })
    });

    let channel = msg
        .guild_id
        .and_then(|guild_id| {
            ctx.cache.guild(guild_id).and_then(|guild| {
                guild.channels.get(&msg.channel_id).map(|channel| ChannelMeta {
                    id: msg.channel_id.get(),
                    kind: channel.kind.name().to_string(),
                    name: Some(channel.name.clone()),
                    topic: channel.topic.clone(),
                })
            })
        })
        .unwrap_or_else(|| ChannelMeta {
            id: msg.channel_id.get(),
            kind: if msg.guild_id.is_some() { "text" } else { "private" }.to_string(),
            name: None,
            topic: None,
        });

    let reference = match (&msg.referenced_message, &msg.message_reference) {
        (Some(referenced), _) => Some(ReferenceMeta {
            message_id: Some(referenced.id.get()),
            channel_id: Some(referenced.channel_id.get()),
            guild_id: referenced.guild_id.map(|id| id.get()),
            author_name: Some(referenced.author.name.clone()),
            content_preview: Some(preview(&referenced.content)),
        }),
        (None, Some(reference)) => Some(ReferenceMeta {
            message_id: reference.message_id.map(|id| id.get()),
            channel_id: Some(reference.channel_id.get()),
            guild_id: reference.guild_id.map(|id| id.get()),
            author_name: None,
            content_preview: None,
        }),
        (None, None) => None,
    };

    MentionEvent {
        message_id: msg.id.get(),
        created_at: chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(chrono::Utc::now),
        content: msg.content.clone(),
        mentions_bot: msg.mentions_user_id(UserId::new(bot_id)),
        author: AuthorMeta {
            id: msg.author.id.get(),
            name: msg.author.name.clone(),
            display_name: msg.author.global_name.clone(),
            bot: msg.author.bot,
        },
        channel,
        guild,
        reference,
    }
}

/// Sends replies for one originating message over the Discord HTTP API.
struct SerenityResponder {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
}

impl SerenityResponder {
    async fn send_reference_reply(&self, reply_to: MessageId, text: &str) -> anyhow::Result<u64> {
        let builder = CreateMessage::new()
            .content(truncate_message(text))
            .reference_message((self.channel_id, reply_to))
            .allowed_mentions(CreateAllowedMentions::new().replied_user(false));

        let sent = self.channel_id.send_message(&self.http, builder).await?;
        Ok(sent.id.get())
    }
}

impl Responder for SerenityResponder {
    async fn reply(&self, text: &str) -> anyhow::Result<ReplyTicket> {
        let message_id = self.send_reference_reply(self.message_id, text).await?;
        Ok(ReplyTicket { message_id })
    }

    async fn follow_up(&self, first: &ReplyTicket, text: &str) -> anyhow::Result<()> {
        self.send_reference_reply(MessageId::new(first.message_id), text)
            .await?;
        Ok(())
    }
}

/// Cut text to Discord's content limit on a character boundary.
fn truncate_message(text: &str) -> &str {
    if text.len() <= MESSAGE_CONTENT_LIMIT {
        return text;
    }
    let mut end = MESSAGE_CONTENT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn preview(text: &str) -> String {
    text.chars().take(REFERENCE_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through_untruncated() {
        assert_eq!(truncate_message("hello"), "hello");
        let exactly_limit = "a".repeat(MESSAGE_CONTENT_LIMIT);
        assert_eq!(truncate_message(&exactly_limit).len(), MESSAGE_CONTENT_LIMIT);
    }

    #[test]
    fn truncation_lands_on_a_char_boundary() {
        // 'é' is two bytes; the limit falls mid-character.
        let text = "é".repeat(MESSAGE_CONTENT_LIMIT);
        let cut = truncate_message(&text);
        assert!(cut.len() <= MESSAGE_CONTENT_LIMIT);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn reference_preview_is_char_limited() {
        let text = "x".repeat(REFERENCE_PREVIEW_CHARS + 100);
        assert_eq!(preview(&text).chars().count(), REFERENCE_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
