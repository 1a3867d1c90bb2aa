use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::{normalize_pair, Conversation, MemberState};
use crate::models::message::Message;

pub struct ConversationService;

impl ConversationService {
    /// Idempotent get-or-create for an unordered member pair. The normalized
    /// pair carries a unique index, so concurrent calls race safely into the
    /// same row; a repeat call merges any new marketplace metadata instead of
    /// creating a duplicate thread.
    pub async fn get_or_create(
        db: &Pool<Postgres>,
        user_a: Uuid,
        user_b: Uuid,
        related_demand_id: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> AppResult<Conversation> {
        let (low, high) = normalize_pair(user_a, user_b)?;
        let id = Uuid::new_v4();

        let mut tx = db.begin().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO conversations (id, member_low, member_high, related_demand_id, metadata)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (member_low, member_high) DO UPDATE
            SET related_demand_id = COALESCE(conversations.related_demand_id, EXCLUDED.related_demand_id),
                metadata = COALESCE(conversations.metadata, EXCLUDED.metadata)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(low)
        .bind(high)
        .bind(related_demand_id)
        .bind(metadata)
        .fetch_one(&mut *tx)
        .await?;
        let conversation = Conversation::from_row(&row)?;

        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id) \
             VALUES ($1, $2), ($1, $3) ON CONFLICT DO NOTHING",
        )
        .bind(conversation.id)
        .bind(low)
        .bind(high)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(conversation)
    }

    pub async fn fetch(db: &Pool<Postgres>, id: Uuid) -> AppResult<Conversation> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(Conversation::from_row(&row)?)
    }

    pub async fn is_member(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM conversation_members \
             WHERE conversation_id = $1 AND user_id = $2) AS is_member",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(row.get("is_member"))
    }

    pub async fn member_state(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<MemberState> {
        let row = sqlx::query(
            "SELECT archived, cleared_at FROM conversation_members \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        match row {
            Some(r) => Ok(MemberState {
                archived: r.get("archived"),
                cleared_at: r.get("cleared_at"),
            }),
            None => Ok(MemberState::default()),
        }
    }

    /// Refresh the denormalized last-message summary after an accepted write.
    /// Also resets `read_by` to the sender and un-archives the thread for
    /// the sender only. The sender's clear watermark is left untouched: the
    /// new message is newer than any watermark, so the thread reappears in
    /// their list without resurrecting cleared history.
    pub async fn update_summary(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        text: &str,
        sender_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations \
             SET last_message = $2, last_message_at = $3, last_message_sender_id = $4, \
                 read_by = ARRAY[$4]::uuid[] \
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(text)
        .bind(at)
        .bind(sender_id)
        .execute(db)
        .await?;

        sqlx::query(
            "UPDATE conversation_members SET archived = FALSE \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Idempotent set-add on the conversation-level read watermark.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations SET read_by = array_append(read_by, $2) \
             WHERE id = $1 AND NOT (read_by @> ARRAY[$2]::uuid[])",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn set_archived(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        archived: bool,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversation_members SET archived = $3 \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(archived)
        .execute(db)
        .await?;
        Ok(())
    }

    /// "Delete for me": records a per-member watermark. History at or before
    /// the watermark disappears from this member's view; later messages stay.
    pub async fn clear_for_user(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<DateTime<Utc>> {
        let row = sqlx::query(
            "UPDATE conversation_members SET cleared_at = now() \
             WHERE conversation_id = $1 AND user_id = $2 \
             RETURNING cleared_at",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;
        Ok(row.get("cleared_at"))
    }

    /// List a user's threads ordered by last activity. Threads the user
    /// cleared stay hidden until a newer message arrives.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
        archived: bool,
    ) -> AppResult<Vec<(Conversation, MemberState)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.*, cm.archived, cm.cleared_at
            FROM conversations c
            JOIN conversation_members cm ON cm.conversation_id = c.id
            WHERE cm.user_id = $1
              AND cm.archived = $2
              AND (cm.cleared_at IS NULL OR c.last_message_at > cm.cleared_at)
            ORDER BY c.last_message_at DESC NULLS LAST
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .bind(archived)
        .fetch_all(db)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let conversation = Conversation::from_row(&row)?;
            let state = MemberState {
                archived: row.get("archived"),
                cleared_at: row.get("cleared_at"),
            };
            out.push((conversation, state));
        }
        Ok(out)
    }

    /// Recompute the summary from the log tail, used after a hard delete and
    /// as the repair path when an append's summary write-behind failed.
    pub async fn recompute_summary(db: &Pool<Postgres>, conversation_id: Uuid) -> AppResult<()> {
        let tail = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(db)
        .await?;

        match tail {
            Some(row) => {
                let message = Message::from_row(&row)?;
                sqlx::query(
                    "UPDATE conversations \
                     SET last_message = $2, last_message_at = $3, last_message_sender_id = $4 \
                     WHERE id = $1",
                )
                .bind(conversation_id)
                .bind(message.summary_text())
                .bind(message.created_at)
                .bind(message.sender_id)
                .execute(db)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE conversations \
                     SET last_message = NULL, last_message_at = NULL, \
                         last_message_sender_id = NULL, read_by = '{}' \
                     WHERE id = $1",
                )
                .bind(conversation_id)
                .execute(db)
                .await?;
            }
        }
        Ok(())
    }
}
