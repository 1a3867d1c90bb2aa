use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::Message;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::notification_service::{self, Notification, NotificationKind};
use crate::state::AppState;
use crate::websocket::events::{broadcast_event, WsServerEvent};

#[derive(Deserialize)]
pub struct SetReactionRequest {
    pub emoji: String,
}

/// ZWJ sequences (family, skin-tone variants) run well past a single
/// codepoint; the cap only guards against arbitrary text in the column.
fn valid_emoji(emoji: &str) -> bool {
    !emoji.is_empty() && emoji.len() <= 64
}

/// PUT /messages/:id/reaction — toggle semantics: the same emoji again
/// clears the caller's reaction, a different one replaces it.
pub async fn set_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<SetReactionRequest>,
) -> Result<Json<Message>, AppError> {
    if !valid_emoji(&body.emoji) {
        return Err(AppError::BadRequest("invalid emoji".into()));
    }

    let existing = MessageService::get(&state.db, message_id).await?;
    if !ConversationService::is_member(&state.db, existing.conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }

    let message = MessageService::set_reaction(&state.db, message_id, user_id, &body.emoji).await?;
    let conversation_id = message.conversation_id;

    broadcast_event(
        &state.registry,
        &state.redis,
        conversation_id,
        WsServerEvent::ReactionSet {
            conversation_id,
            message: message.clone(),
        },
    )
    .await;

    // Only a newly placed reaction on someone else's message is worth an
    // alert; clearing your own is not.
    let reacted = message
        .reactions
        .get(&body.emoji)
        .map(|users| users.contains(&user_id))
        .unwrap_or(false);
    if reacted && message.sender_id != user_id {
        let title = state
            .directory
            .get_user_summary(user_id)
            .await
            .map(|s| s.display_name)
            .unwrap_or_else(|_| "New reaction".into());
        notification_service::dispatch(
            state.notifier.clone(),
            Notification {
                user_id: message.sender_id,
                kind: NotificationKind::Reaction,
                title,
                body: body.emoji.clone(),
                data: json!({
                    "conversation_id": conversation_id,
                    "message_id": message_id,
                }),
                deep_link: Some(format!("/conversations/{conversation_id}")),
            },
        );
    }

    Ok(Json(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_codepoint_emoji() {
        assert!(valid_emoji("👍"));
    }

    #[test]
    fn accepts_zwj_family_sequence() {
        // 25 bytes in UTF-8
        assert!(valid_emoji("👨‍👩‍👧‍👦"));
    }

    #[test]
    fn accepts_skin_tone_modifier() {
        assert!(valid_emoji("👍🏽"));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(!valid_emoji(""));
        assert!(!valid_emoji(&"x".repeat(65)));
    }
}
