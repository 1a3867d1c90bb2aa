use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::AppError;

/// A two-party thread. Membership is immutable after creation; everything a
/// single member can change about their own view (archive, clear) lives in
/// per-member state, never on the shared record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub members: [Uuid; 2],
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_sender_id: Option<Uuid>,
    /// Members who have seen the thread as of `last_message_at`.
    pub read_by: Vec<Uuid>,
    pub related_demand_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            members: [row.try_get("member_low")?, row.try_get("member_high")?],
            last_message: row.try_get("last_message")?,
            last_message_at: row.try_get("last_message_at")?,
            last_message_sender_id: row.try_get("last_message_sender_id")?,
            read_by: row.try_get("read_by")?,
            related_demand_id: row.try_get("related_demand_id")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.members {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

/// Per-member soft state attached to a conversation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MemberState {
    pub archived: bool,
    /// "Delete for me" watermark: messages at or before this instant are
    /// hidden from this member, later ones stay visible.
    pub cleared_at: Option<DateTime<Utc>>,
}

/// Stores the unordered member pair in a canonical order so the pair itself
/// can carry a unique index.
pub fn normalize_pair(a: Uuid, b: Uuid) -> Result<(Uuid, Uuid), AppError> {
    if a == b {
        return Err(AppError::BadRequest(
            "a conversation needs two distinct members".into(),
        ));
    }
    if a < b {
        Ok((a, b))
    } else {
        Ok((b, a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_order_insensitive() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(normalize_pair(a, b).unwrap(), normalize_pair(b, a).unwrap());
    }

    #[test]
    fn pair_rejects_self_conversation() {
        let a = Uuid::new_v4();
        assert!(matches!(
            normalize_pair(a, a),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn partner_resolution() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let conv = Conversation {
            id: Uuid::new_v4(),
            members: [a, b],
            last_message: None,
            last_message_at: None,
            last_message_sender_id: None,
            read_by: vec![],
            related_demand_id: None,
            metadata: None,
            created_at: Utc::now(),
        };
        assert_eq!(conv.partner_of(a), Some(b));
        assert_eq!(conv.partner_of(b), Some(a));
        assert_eq!(conv.partner_of(c), None);
    }
}
