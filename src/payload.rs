//! JSON envelopes persisted for user turns and embedded in prompts.

use crate::{GuildMeta, MentionEvent};
use serde_json::{Value, json};

/// Build the server-info block for the system prompt.
///
/// Direct messages get a fixed `{"type": "DM", "guild": null}` shape so the
/// prompt always carries a server section.
pub fn build_server_info(guild: Option<&GuildMeta>) -> Value {
    match guild {
        None => json!({ "type": "DM", "guild": null }),
        Some(guild) => json!({
            "id": guild.id,
            "name": guild.name,
            "description": guild.description,
            "owner_id": guild.owner_id,
            "approx_member_count": guild.member_count,
        }),
    }
}

/// Build the persisted user-turn envelope: message, author, and channel
/// metadata around the cleaned text.
pub fn build_message_json(event: &MentionEvent, cleaned_content: &str) -> String {
    let reference = event.reference.as_ref().map(|r| {
        json!({
            "message_id": r.message_id,
            "channel_id": r.channel_id,
            "guild_id": r.guild_id,
            "author_name": r.author_name,
            "content_preview": r.content_preview,
        })
    });

    let payload = json!({
        "message": {
            "id": event.message_id,
            "created_at": event.created_at.to_rfc3339(),
            "content": cleaned_content,
            "reference": reference,
        },
        "author": {
            "id": event.author.id,
            "name": event.author.name,
            "display_name": event.author.display_name,
            "bot": event.author.bot,
        },
        "channel": {
            "id": event.channel.id,
            "type": event.channel.kind,
            "name": event.channel.name,
            "topic": event.channel.topic,
        },
    });

    serde_json::to_string_pretty(&payload).unwrap_or_default()
}
