//! Conversation turn persistence (SQLite).

use crate::error::Result;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sqlx::{Row as _, SqlitePool};

/// Provenance tag for a persisted turn. Determines how `content` is
/// interpreted downstream, so the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            "tool" => Some(TurnRole::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable persisted conversation record.
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: i64,
    pub guild_id: Option<i64>,
    pub channel_id: i64,
    pub user_id: Option<i64>,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only log of conversation turns keyed by channel/guild.
///
/// Writes propagate failures to the caller; there is no update or delete.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the messages table and its indexes.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER,
                channel_id INTEGER NOT NULL,
                user_id INTEGER,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create messages table")?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_messages_guild ON messages(guild_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to create messages index")?;
        }

        Ok(())
    }

    /// Write one immutable turn and return it with its assigned id.
    pub async fn append(
        &self,
        guild_id: Option<i64>,
        channel_id: i64,
        user_id: Option<i64>,
        role: TurnRole,
        content: &str,
    ) -> Result<Turn> {
        // Bind the timestamp from our clock rather than relying on the
        // column default; sub-second precision keeps ordering stable for
        // turns written within the same second.
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO messages (guild_id, channel_id, user_id, role, content, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(guild_id)
        .bind(channel_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("failed to persist conversation turn")?;

        Ok(Turn {
            id: result.last_insert_rowid(),
            guild_id,
            channel_id,
            user_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Load the most recent turns for a channel, oldest first.
    pub async fn recent_by_channel(&self, channel_id: i64, limit: i64) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, guild_id, channel_id, user_id, role, content, created_at \
             FROM messages \
             WHERE channel_id = ? \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?",
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to load channel history")?;

        Ok(rows_to_turns(rows))
    }

    /// Load the most recent turns across all channels of a guild, oldest first.
    pub async fn recent_by_guild(&self, guild_id: i64, limit: i64) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT id, guild_id, channel_id, user_id, role, content, created_at \
             FROM messages \
             WHERE guild_id = ? \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?",
        )
        .bind(guild_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to load guild history")?;

        Ok(rows_to_turns(rows))
    }

    /// History with guild precedence: scoped by guild whenever a guild id
    /// is available, by channel otherwise (the direct-message case).
    pub async fn recent_for_scope(
        &self,
        guild_id: Option<i64>,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<Turn>> {
        match guild_id {
            Some(gid) => self.recent_by_guild(gid, limit).await,
            None => self.recent_by_channel(channel_id, limit).await,
        }
    }
}

fn rows_to_turns(rows: Vec<sqlx::sqlite::SqliteRow>) -> Vec<Turn> {
    let mut turns: Vec<Turn> = rows
        .into_iter()
        .filter_map(|row| {
            let id: i64 = row.try_get("id").unwrap_or_default();
            let raw_role: String = row.try_get("role").unwrap_or_default();
            // Role decides how content is interpreted downstream, so a row
            // with an unrecognized role is dropped rather than relabeled.
            let Some(role) = TurnRole::parse(&raw_role) else {
                tracing::warn!(id, role = %raw_role, "skipping turn with unrecognized role");
                return None;
            };

            Some(Turn {
                id,
                guild_id: row.try_get("guild_id").ok(),
                channel_id: row.try_get("channel_id").unwrap_or_default(),
                user_id: row.try_get("user_id").ok(),
                role,
                content: row.try_get("content").unwrap_or_default(),
                created_at: row
                    .try_get("created_at")
                    .unwrap_or_else(|_| chrono::Utc::now()),
            })
        })
        .collect();

    // Reverse the descending query to chronological order
    turns.reverse();
    turns
}
