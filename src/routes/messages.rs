use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::{Message, MessageKind, ReplyTo};
use crate::models::presence::PresenceStatus;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::notification_service::{self, Notification, NotificationKind};
use crate::services::presence_service::PresenceService;
use crate::services::typing_service::TypingService;
use crate::state::AppState;
use crate::websocket::events::{broadcast_event, WsServerEvent};

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub kind: MessageKind,
    /// Text body, or the already-uploaded media URL for image/audio.
    pub content: String,
    pub duration_seconds: Option<i32>,
    pub reply_to_message_id: Option<Uuid>,
}

/// POST /conversations/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let conversation = ConversationService::fetch(&state.db, conversation_id).await?;
    if !conversation.has_member(user_id) {
        return Err(AppError::Forbidden);
    }
    if body.content.trim().is_empty() {
        return Err(AppError::BadRequest("message content cannot be empty".into()));
    }
    if body.kind == MessageKind::Audio && body.duration_seconds.is_none() {
        return Err(AppError::BadRequest(
            "audio messages need duration_seconds".into(),
        ));
    }

    // Reply snapshots are frozen server-side at send time; later edits or
    // deletes of the original must not show through.
    let reply_to = match body.reply_to_message_id {
        Some(original_id) => {
            let original = MessageService::get(&state.db, original_id).await?;
            if original.conversation_id != conversation_id {
                return Err(AppError::BadRequest(
                    "reply target belongs to another conversation".into(),
                ));
            }
            let sender_name = state
                .directory
                .get_user_summary(original.sender_id)
                .await
                .map(|s| s.display_name)
                .unwrap_or_default();
            Some(ReplyTo {
                message_id: original.id,
                text: original.summary_text(),
                sender_id: original.sender_id,
                sender_name,
            })
        }
        None => None,
    };

    let message = MessageService::append(
        &state.db,
        conversation_id,
        user_id,
        body.kind,
        &body.content,
        body.duration_seconds,
        reply_to.as_ref(),
    )
    .await?;

    // Sending always ends the sender's composing state.
    if let Err(e) = TypingService::clear_typing(&state.redis, conversation_id, user_id).await {
        tracing::warn!(error = %e, %conversation_id, "clear_typing on send failed");
    }

    broadcast_event(
        &state.registry,
        &state.redis,
        conversation_id,
        WsServerEvent::MessageNew {
            conversation_id,
            message: message.clone(),
        },
    )
    .await;
    if let Ok(updated) = ConversationService::fetch(&state.db, conversation_id).await {
        broadcast_event(
            &state.registry,
            &state.redis,
            conversation_id,
            WsServerEvent::ConversationUpdated {
                conversation: updated,
            },
        )
        .await;
    }

    if let Some(partner_id) = conversation.partner_of(user_id) {
        // Alert only an inactive partner; if the presence read fails, err on
        // the side of delivering.
        let partner_status = PresenceService::get_status(
            &state.redis,
            partner_id,
            state.config.presence_online_seconds,
        )
        .await
        .unwrap_or(PresenceStatus {
            online: false,
            last_seen_at: None,
        });
        if notification_service::should_alert(&partner_status) {
            let title = state
                .directory
                .get_user_summary(user_id)
                .await
                .map(|s| s.display_name)
                .unwrap_or_else(|_| "New message".into());
            notification_service::dispatch(
                state.notifier.clone(),
                Notification {
                    user_id: partner_id,
                    kind: NotificationKind::Message,
                    title,
                    body: message.summary_text(),
                    data: json!({
                        "conversation_id": conversation_id,
                        "message_id": message.id,
                    }),
                    deep_link: Some(format!("/conversations/{conversation_id}")),
                },
            );
        }
    }

    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    /// Exclusive lower bound: the polling fallback passes the newest
    /// timestamp it has seen and receives the same delta a live subscriber
    /// would have been pushed.
    pub since: Option<DateTime<Utc>>,
}

/// GET /conversations/:id/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    let member_state =
        ConversationService::member_state(&state.db, conversation_id, user_id).await?;
    let messages = MessageService::list(&state.db, conversation_id, query.since)
        .await?
        .into_iter()
        .filter(|m| m.visible_to(user_id, member_state.cleared_at))
        .collect();
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

/// PUT /messages/:id
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<Message>, AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::BadRequest("message content cannot be empty".into()));
    }
    let message = MessageService::edit(
        &state.db,
        message_id,
        user_id,
        &body.text,
        state.config.edit_window_minutes,
    )
    .await?;

    let conversation_id = message.conversation_id;
    broadcast_event(
        &state.registry,
        &state.redis,
        conversation_id,
        WsServerEvent::MessageEdited {
            conversation_id,
            message: message.clone(),
        },
    )
    .await;
    if let Ok(updated) = ConversationService::fetch(&state.db, conversation_id).await {
        broadcast_event(
            &state.registry,
            &state.redis,
            conversation_id,
            WsServerEvent::ConversationUpdated {
                conversation: updated,
            },
        )
        .await;
    }
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct DeleteMessageQuery {
    /// "soft" (default) hides the message for the caller only; "hard"
    /// physically removes it and is restricted to the sender.
    pub mode: Option<String>,
}

/// DELETE /messages/:id
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<DeleteMessageQuery>,
) -> Result<StatusCode, AppError> {
    match query.mode.as_deref().unwrap_or("soft") {
        "soft" => {
            let conversation_id =
                MessageService::soft_delete(&state.db, message_id, user_id).await?;
            broadcast_event(
                &state.registry,
                &state.redis,
                conversation_id,
                WsServerEvent::MessageHidden {
                    conversation_id,
                    message_id,
                    user_id,
                },
            )
            .await;
        }
        "hard" => {
            let conversation_id =
                MessageService::hard_delete(&state.db, message_id, user_id).await?;
            broadcast_event(
                &state.registry,
                &state.redis,
                conversation_id,
                WsServerEvent::MessageDeleted {
                    conversation_id,
                    message_id,
                },
            )
            .await;
            if let Ok(updated) = ConversationService::fetch(&state.db, conversation_id).await {
                broadcast_event(
                    &state.registry,
                    &state.redis,
                    conversation_id,
                    WsServerEvent::ConversationUpdated {
                        conversation: updated,
                    },
                )
                .await;
            }
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "unknown delete mode: {other}"
            )));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub conversation_id: Uuid,
    pub message_ids: Vec<Uuid>,
}

/// POST /messages/read — idempotent batch read marker.
pub async fn mark_messages_read(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<MarkReadRequest>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, body.conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    MessageService::mark_read_by_user(&state.db, body.conversation_id, &body.message_ids, user_id)
        .await?;
    ConversationService::mark_read(&state.db, body.conversation_id, user_id).await?;
    broadcast_event(
        &state.registry,
        &state.redis,
        body.conversation_id,
        WsServerEvent::ReadMarked {
            conversation_id: body.conversation_id,
            user_id,
            message_ids: body.message_ids,
        },
    )
    .await;
    if let Ok(updated) = ConversationService::fetch(&state.db, body.conversation_id).await {
        broadcast_event(
            &state.registry,
            &state.redis,
            body.conversation_id,
            WsServerEvent::ConversationUpdated {
                conversation: updated,
            },
        )
        .await;
    }
    Ok(StatusCode::NO_CONTENT)
}
