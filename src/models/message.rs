use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "audio" => Ok(MessageKind::Audio),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// Denormalized reply snapshot, frozen at send time. Editing or deleting the
/// original message never touches this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyTo {
    pub message_id: Uuid,
    pub text: String,
    pub sender_id: Uuid,
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    /// Text body, or the media URL for image/audio messages.
    pub content: String,
    pub duration_seconds: Option<i32>,
    pub read_by: Vec<Uuid>,
    pub deleted_by: Vec<Uuid>,
    /// emoji -> reactor ids. An actor appears under at most one emoji.
    pub reactions: HashMap<String, Vec<Uuid>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub reply_to: Option<ReplyTo>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let kind_raw: String = row.try_get("kind")?;
        let kind = MessageKind::parse(&kind_raw).map_err(|e| sqlx::Error::Decode(e.into()))?;

        let reply_to = match row.try_get::<Option<Uuid>, _>("reply_to_message_id")? {
            Some(message_id) => Some(ReplyTo {
                message_id,
                text: row
                    .try_get::<Option<String>, _>("reply_to_text")?
                    .unwrap_or_default(),
                sender_id: row
                    .try_get::<Option<Uuid>, _>("reply_to_sender_id")?
                    .ok_or_else(|| {
                        sqlx::Error::Decode("reply snapshot is missing its sender id".into())
                    })?,
                sender_name: row
                    .try_get::<Option<String>, _>("reply_to_sender_name")?
                    .unwrap_or_default(),
            }),
            None => None,
        };

        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            kind,
            content: row.try_get("content")?,
            duration_seconds: row.try_get("duration_seconds")?,
            read_by: row.try_get("read_by")?,
            deleted_by: row.try_get("deleted_by")?,
            reactions: HashMap::new(),
            edited_at: row.try_get("edited_at")?,
            reply_to,
            created_at: row.try_get("created_at")?,
        })
    }

    pub fn edited(&self) -> bool {
        self.edited_at.is_some()
    }

    /// Per-viewer visibility. A message is hidden when the viewer deleted it
    /// individually, or cleared the whole conversation at some instant T and
    /// the message is not newer than T.
    pub fn visible_to(&self, viewer: Uuid, cleared_at: Option<DateTime<Utc>>) -> bool {
        if self.deleted_by.contains(&viewer) {
            return false;
        }
        match cleared_at {
            Some(t) => self.created_at > t,
            None => true,
        }
    }

    /// Text used for the conversation's denormalized summary.
    pub fn summary_text(&self) -> String {
        match self.kind {
            MessageKind::Text => self.content.clone(),
            MessageKind::Image => "[image]".to_string(),
            MessageKind::Audio => "[voice message]".to_string(),
        }
    }
}

/// Edits are only allowed within a fixed window after the original send.
pub fn edit_window_open(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_minutes: i64,
) -> bool {
    now - created_at < Duration::minutes(window_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            kind: MessageKind::Text,
            content: "hello".into(),
            duration_seconds: None,
            read_by: vec![],
            deleted_by: vec![],
            reactions: HashMap::new(),
            edited_at: None,
            reply_to: None,
            created_at,
        }
    }

    #[test]
    fn soft_delete_hides_for_deleter_only() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut m = message_at(Utc::now());
        m.deleted_by.push(a);
        assert!(!m.visible_to(a, None));
        assert!(m.visible_to(b, None));
    }

    #[test]
    fn clear_watermark_hides_prior_history_only() {
        let viewer = Uuid::new_v4();
        let watermark = Utc::now();
        let before = message_at(watermark - Duration::seconds(10));
        let at = message_at(watermark);
        let after = message_at(watermark + Duration::seconds(10));
        assert!(!before.visible_to(viewer, Some(watermark)));
        assert!(!at.visible_to(viewer, Some(watermark)));
        assert!(after.visible_to(viewer, Some(watermark)));
    }

    #[test]
    fn edit_window_boundaries() {
        let created = Utc::now();
        assert!(edit_window_open(created, created + Duration::minutes(59), 60));
        assert!(!edit_window_open(created, created + Duration::minutes(61), 60));
        assert!(!edit_window_open(created, created + Duration::minutes(60), 60));
    }

    #[test]
    fn summary_text_per_kind() {
        let mut m = message_at(Utc::now());
        assert_eq!(m.summary_text(), "hello");
        m.kind = MessageKind::Image;
        assert_eq!(m.summary_text(), "[image]");
        m.kind = MessageKind::Audio;
        assert_eq!(m.summary_text(), "[voice message]");
    }
}
