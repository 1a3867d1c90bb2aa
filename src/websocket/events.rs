//! Server-push event vocabulary.
//!
//! Every event shares one top-level shape (`"type"` tag plus the variant's
//! own fields) and is serialized in exactly one place, `broadcast_event`.
//! Inserts preserve ascending `created_at` order; metadata changes (edits,
//! reactions, read markers) are patch-in-place updates and never reorder
//! the log on the consumer side.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::redis_client::RedisClient;
use crate::websocket::{pubsub, ConnectionRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsServerEvent {
    /// Initial full ordered log, sent once on subscription establishment.
    #[serde(rename = "message.snapshot")]
    MessageSnapshot {
        conversation_id: Uuid,
        messages: Vec<Message>,
    },

    #[serde(rename = "message.new")]
    MessageNew {
        conversation_id: Uuid,
        message: Message,
    },

    #[serde(rename = "message.edited")]
    MessageEdited {
        conversation_id: Uuid,
        message: Message,
    },

    /// Per-viewer hide ("delete for me"); only meaningful to the actor's
    /// other devices.
    #[serde(rename = "message.hidden")]
    MessageHidden {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    },

    /// Physical removal (sender-only hard delete).
    #[serde(rename = "message.deleted")]
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename = "reaction.set")]
    ReactionSet {
        conversation_id: Uuid,
        message: Message,
    },

    #[serde(rename = "read.marked")]
    ReadMarked {
        conversation_id: Uuid,
        user_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    #[serde(rename = "typing.started")]
    TypingStarted {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "typing.stopped")]
    TypingStopped {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    /// Denormalized summary changed (new tail, read watermark, recompute).
    #[serde(rename = "conversation.updated")]
    ConversationUpdated { conversation: Conversation },
}

/// Serialize once, push to local subscribers, relay to other instances.
pub async fn broadcast_event(
    registry: &ConnectionRegistry,
    redis: &RedisClient,
    conversation_id: Uuid,
    event: WsServerEvent,
) {
    let payload = match serde_json::to_string(&event) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, %conversation_id, "failed to serialize ws event");
            return;
        }
    };
    registry
        .broadcast(
            conversation_id,
            axum::extract::ws::Message::Text(payload.clone()),
        )
        .await;
    if let Err(e) = pubsub::publish(redis, conversation_id, &payload).await {
        tracing::warn!(error = %e, %conversation_id, "pubsub relay failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_dotted_type_tags() {
        let conversation_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let event = WsServerEvent::TypingStarted {
            conversation_id,
            user_id,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "typing.started");
        assert_eq!(value["conversation_id"], conversation_id.to_string());
    }

    #[test]
    fn read_marker_round_trips() {
        let event = WsServerEvent::ReadMarked {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            message_ids: vec![Uuid::new_v4()],
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: WsServerEvent = serde_json::from_str(&text).unwrap();
        match back {
            WsServerEvent::ReadMarked { message_ids, .. } => assert_eq!(message_ids.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
