use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::{edit_window_open, Message, MessageKind, ReplyTo};
use crate::services::conversation_service::ConversationService;

/// Outcome of a reaction toggle against the actor's existing reaction.
/// An actor holds at most one emoji per message: re-selecting the same emoji
/// clears it, anything else replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOp {
    Clear,
    Set,
}

pub fn reaction_toggle(existing: Option<&str>, requested: &str) -> ReactionOp {
    match existing {
        Some(current) if current == requested => ReactionOp::Clear,
        _ => ReactionOp::Set,
    }
}

pub struct MessageService;

impl MessageService {
    /// Append a message to the conversation log. The message write is the
    /// durable part; the summary update is write-behind, and a failure there
    /// is logged and repaired by the next tail recompute.
    pub async fn append(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        kind: MessageKind,
        content: &str,
        duration_seconds: Option<i32>,
        reply_to: Option<&ReplyTo>,
    ) -> AppResult<Message> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, kind, content, duration_seconds, read_by,
                 reply_to_message_id, reply_to_text, reply_to_sender_id, reply_to_sender_name)
            VALUES ($1, $2, $3, $4, $5, $6, ARRAY[$3]::uuid[], $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(kind.as_str())
        .bind(content)
        .bind(duration_seconds)
        .bind(reply_to.map(|r| r.message_id))
        .bind(reply_to.map(|r| r.text.as_str()))
        .bind(reply_to.map(|r| r.sender_id))
        .bind(reply_to.map(|r| r.sender_name.as_str()))
        .fetch_one(db)
        .await?;
        let message = Message::from_row(&row)?;

        if let Err(e) = ConversationService::update_summary(
            db,
            conversation_id,
            &message.summary_text(),
            sender_id,
            message.created_at,
        )
        .await
        {
            tracing::warn!(
                error = %e,
                %conversation_id,
                "summary update failed after append; will repair on next tail recompute"
            );
        }

        Ok(message)
    }

    /// Fetch a single message with its reactions loaded.
    pub async fn get(db: &Pool<Postgres>, message_id: Uuid) -> AppResult<Message> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        let mut message = Message::from_row(&row)?;

        let reactions = sqlx::query(
            "SELECT user_id, emoji FROM message_reactions WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_all(db)
        .await?;
        for r in reactions {
            let user_id: Uuid = r.get("user_id");
            let emoji: String = r.get("emoji");
            message.reactions.entry(emoji).or_default().push(user_id);
        }
        Ok(message)
    }

    /// Edit a text message: sender-only, text-only, inside the edit window.
    /// When the edited message is still the conversation's tail, the
    /// denormalized summary text is refreshed too.
    pub async fn edit(
        db: &Pool<Postgres>,
        message_id: Uuid,
        actor_id: Uuid,
        new_text: &str,
        window_minutes: i64,
    ) -> AppResult<Message> {
        let existing = Self::get(db, message_id).await?;
        if existing.sender_id != actor_id {
            return Err(AppError::Forbidden);
        }
        if existing.kind != MessageKind::Text {
            return Err(AppError::Unsupported(
                "only text messages can be edited".into(),
            ));
        }
        if !edit_window_open(existing.created_at, Utc::now(), window_minutes) {
            return Err(AppError::EditWindowExpired {
                max_edit_minutes: window_minutes,
            });
        }

        let row = sqlx::query(
            "UPDATE messages SET content = $2, edited_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(message_id)
        .bind(new_text)
        .fetch_one(db)
        .await?;
        let mut message = Message::from_row(&row)?;
        message.reactions = existing.reactions;

        // Refresh the summary only when no newer message exists.
        sqlx::query(
            "UPDATE conversations c SET last_message = $2 \
             WHERE c.id = $1 AND NOT EXISTS ( \
                 SELECT 1 FROM messages m \
                 WHERE m.conversation_id = c.id AND m.created_at > $3)",
        )
        .bind(message.conversation_id)
        .bind(message.summary_text())
        .bind(message.created_at)
        .execute(db)
        .await?;

        Ok(message)
    }

    /// Toggle the actor's reaction and return the message with the updated
    /// reaction map. Concurrent reactions from different actors touch
    /// different rows, so no coordination is needed.
    pub async fn set_reaction(
        db: &Pool<Postgres>,
        message_id: Uuid,
        actor_id: Uuid,
        emoji: &str,
    ) -> AppResult<Message> {
        // Existence check first so a missing message is NotFound, not a no-op.
        let exists = sqlx::query("SELECT 1 AS present FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound);
        }

        let current: Option<String> = sqlx::query(
            "SELECT emoji FROM message_reactions WHERE message_id = $1 AND user_id = $2",
        )
        .bind(message_id)
        .bind(actor_id)
        .fetch_optional(db)
        .await?
        .map(|r| r.get("emoji"));

        match reaction_toggle(current.as_deref(), emoji) {
            ReactionOp::Clear => {
                sqlx::query(
                    "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2",
                )
                .bind(message_id)
                .bind(actor_id)
                .execute(db)
                .await?;
            }
            ReactionOp::Set => {
                sqlx::query(
                    r#"
                    INSERT INTO message_reactions (message_id, user_id, emoji)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (message_id, user_id)
                    DO UPDATE SET emoji = EXCLUDED.emoji, created_at = now()
                    "#,
                )
                .bind(message_id)
                .bind(actor_id)
                .bind(emoji)
                .execute(db)
                .await?;
            }
        }

        Self::get(db, message_id).await
    }

    /// Idempotent batch read marker: adds the user to each message's
    /// `read_by` and to the conversation's read set. Scoped to the given
    /// conversation, which callers have already membership-checked; ids
    /// belonging to other conversations are ignored.
    pub async fn mark_read_by_user(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        message_ids: &[Uuid],
        user_id: Uuid,
    ) -> AppResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE messages SET read_by = array_append(read_by, $2) \
             WHERE id = ANY($1) AND conversation_id = $3 \
               AND NOT (read_by @> ARRAY[$2]::uuid[])",
        )
        .bind(message_ids)
        .bind(user_id)
        .bind(conversation_id)
        .execute(db)
        .await?;

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

    /// "Delete for me": per-viewer hide flag, no ordering effect, the other
    /// member's copy is untouched. Returns the owning conversation id.
    pub async fn soft_delete(
        db: &Pool<Postgres>,
        message_id: Uuid,
        actor_id: Uuid,
    ) -> AppResult<Uuid> {
        let row = sqlx::query("SELECT conversation_id FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        let conversation_id: Uuid = row.get("conversation_id");
        if !ConversationService::is_member(db, conversation_id, actor_id).await? {
            return Err(AppError::Forbidden);
        }

        sqlx::query(
            "UPDATE messages SET deleted_by = array_append(deleted_by, $2) \
             WHERE id = $1 AND NOT (deleted_by @> ARRAY[$2]::uuid[])",
        )
        .bind(message_id)
        .bind(actor_id)
        .execute(db)
        .await?;
        Ok(conversation_id)
    }

    /// Physical removal, sender-only. Recomputes the conversation summary
    /// from the remaining tail (or clears it). Returns the conversation id.
    pub async fn hard_delete(
        db: &Pool<Postgres>,
        message_id: Uuid,
        actor_id: Uuid,
    ) -> AppResult<Uuid> {
        let row = sqlx::query("SELECT conversation_id, sender_id FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        let conversation_id: Uuid = row.get("conversation_id");
        let sender_id: Uuid = row.get("sender_id");
        if sender_id != actor_id {
            return Err(AppError::Forbidden);
        }

        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(db)
            .await?;

        ConversationService::recompute_summary(db, conversation_id).await?;
        Ok(conversation_id)
    }

    /// Ordered log read, ascending by server timestamp, with an optional
    /// exclusive `since` bound so the same query serves both the initial
    /// full load and the polling delta path.
    pub async fn list(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        since: Option<chrono::DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages \
             WHERE conversation_id = $1 AND ($2::timestamptz IS NULL OR created_at > $2) \
             ORDER BY created_at ASC, id ASC \
             LIMIT 500",
        )
        .bind(conversation_id)
        .bind(since)
        .fetch_all(db)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(Message::from_row(row)?);
        }
        if messages.is_empty() {
            return Ok(messages);
        }

        // Batch-load reactions for the whole page.
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let reaction_rows = sqlx::query(
            "SELECT message_id, user_id, emoji FROM message_reactions WHERE message_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(db)
        .await?;

        let mut by_message: HashMap<Uuid, HashMap<String, Vec<Uuid>>> = HashMap::new();
        for r in reaction_rows {
            let message_id: Uuid = r.get("message_id");
            let user_id: Uuid = r.get("user_id");
            let emoji: String = r.get("emoji");
            by_message
                .entry(message_id)
                .or_default()
                .entry(emoji)
                .or_default()
                .push(user_id);
        }
        for message in &mut messages {
            if let Some(reactions) = by_message.remove(&message.id) {
                message.reactions = reactions;
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_emoji_toggles_off() {
        assert_eq!(reaction_toggle(Some("👍"), "👍"), ReactionOp::Clear);
    }

    #[test]
    fn different_emoji_replaces() {
        assert_eq!(reaction_toggle(Some("👍"), "❤️"), ReactionOp::Set);
    }

    #[test]
    fn first_reaction_sets() {
        assert_eq!(reaction_toggle(None, "👍"), ReactionOp::Set);
    }
}
