use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::Conversation;
use crate::services::conversation_service::ConversationService;
use crate::services::typing_service::TypingService;
use crate::state::AppState;
use crate::websocket::events::{broadcast_event, WsServerEvent};

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub partner_id: Uuid,
    pub related_demand_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Conversation as one member sees it: the shared record plus that member's
/// own soft state and the live typing set.
#[derive(Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub archived: bool,
    pub unread: bool,
    pub typing: Vec<Uuid>,
}

async fn view_for(
    state: &AppState,
    conversation: Conversation,
    user_id: Uuid,
    with_typing: bool,
) -> Result<ConversationView, AppError> {
    let member_state =
        ConversationService::member_state(&state.db, conversation.id, user_id).await?;
    let typing = if with_typing {
        TypingService::typing_users(&state.redis, conversation.id, conversation.members)
            .await?
            .into_iter()
            .filter(|t| *t != user_id)
            .collect()
    } else {
        Vec::new()
    };
    let unread = conversation.last_message_at.is_some() && !conversation.read_by.contains(&user_id);
    Ok(ConversationView {
        conversation,
        archived: member_state.archived,
        unread,
        typing,
    })
}

/// POST /conversations — idempotent for the member pair.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Json<ConversationView>, AppError> {
    let conversation = ConversationService::get_or_create(
        &state.db,
        user_id,
        body.partner_id,
        body.related_demand_id.as_deref(),
        body.metadata.as_ref(),
    )
    .await?;
    let view = view_for(&state, conversation, user_id, true).await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct ListConversationsQuery {
    #[serde(default)]
    pub archived: bool,
}

/// GET /conversations — the caller's threads, most recent activity first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<Vec<ConversationView>>, AppError> {
    let rows = ConversationService::list_for_user(&state.db, user_id, query.archived).await?;
    let mut out = Vec::with_capacity(rows.len());
    for (conversation, member_state) in rows {
        let unread =
            conversation.last_message_at.is_some() && !conversation.read_by.contains(&user_id);
        out.push(ConversationView {
            conversation,
            archived: member_state.archived,
            unread,
            typing: Vec::new(),
        });
    }
    Ok(Json(out))
}

/// GET /conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<ConversationView>, AppError> {
    let conversation = ConversationService::fetch(&state.db, conversation_id).await?;
    if !conversation.has_member(user_id) {
        return Err(AppError::Forbidden);
    }
    let view = view_for(&state, conversation, user_id, true).await?;
    Ok(Json(view))
}

/// POST /conversations/:id/read
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    ConversationService::mark_read(&state.db, conversation_id, user_id).await?;
    let conversation = ConversationService::fetch(&state.db, conversation_id).await?;
    broadcast_event(
        &state.registry,
        &state.redis,
        conversation_id,
        WsServerEvent::ConversationUpdated { conversation },
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/:id/archive
pub async fn archive_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    ConversationService::set_archived(&state.db, conversation_id, user_id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /conversations/:id/archive
pub async fn unarchive_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    ConversationService::set_archived(&state.db, conversation_id, user_id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/:id/clear — "delete for me" watermark. Destructive
/// for the caller's own view only; the partner's view is untouched.
pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    ConversationService::clear_for_user(&state.db, conversation_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/:id/typing — debounced by the client per keystroke
/// burst; the Redis TTL is the staleness backstop.
pub async fn start_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    TypingService::set_typing(
        &state.redis,
        conversation_id,
        user_id,
        state.config.typing_ttl_seconds,
    )
    .await?;
    broadcast_event(
        &state.registry,
        &state.redis,
        conversation_id,
        WsServerEvent::TypingStarted {
            conversation_id,
            user_id,
        },
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /conversations/:id/typing
pub async fn stop_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ConversationService::is_member(&state.db, conversation_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    TypingService::clear_typing(&state.redis, conversation_id, user_id).await?;
    broadcast_event(
        &state.registry,
        &state.redis,
        conversation_id,
        WsServerEvent::TypingStopped {
            conversation_id,
            user_id,
        },
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}
