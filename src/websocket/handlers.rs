use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::Message;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::typing_service::TypingService;
use crate::state::AppState;
use crate::websocket::events::{broadcast_event, WsServerEvent};
use crate::websocket::message_types::WsClientEvent;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct WsParams {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

/// Identity comes from the same gateway-trusted header extension as the
/// HTTP routes; only the conversation is named in the query.
pub async fn ws_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let params = WsParams {
        conversation_id: query.conversation_id,
        user_id,
    };
    match ConversationService::is_member(&state.db, params.conversation_id, params.user_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                user_id = %params.user_id,
                conversation_id = %params.conversation_id,
                "ws rejected: not a member"
            );
            return StatusCode::FORBIDDEN.into_response();
        }
        Err(e) => {
            error!(error = %e, "ws rejected: membership check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(state, params, socket))
}

async fn handle_socket(state: AppState, params: WsParams, socket: WebSocket) {
    let conversation_id = params.conversation_id;
    let user_id = params.user_id;

    // Subscribe before the snapshot fetch: an insert landing in between is
    // caught by the live channel instead of being lost.
    let mut rx = state.registry.add_subscriber(conversation_id).await;

    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = send_initial_state(&state, &params, &mut sender).await {
        warn!(error = %e, %conversation_id, "failed to deliver initial snapshot");
        return;
    }

    loop {
        tokio::select! {
            broadcast = rx.recv() => {
                match broadcast {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(event) = serde_json::from_str::<WsClientEvent>(&text) {
                            handle_client_event(&state, &params, event).await;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Deterministic teardown: a disconnect must never leave the typing
    // indicator lit (the key TTL is only the backstop).
    if let Err(e) = TypingService::clear_typing(&state.redis, conversation_id, user_id).await {
        warn!(error = %e, %conversation_id, "failed to clear typing on disconnect");
    }
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
}

/// Initial delivery: the full ordered visible log, then the current typing
/// state, so a reconnecting client converges without extra round-trips.
async fn send_initial_state(
    state: &AppState,
    params: &WsParams,
    sender: &mut SplitSink<WebSocket, WsMessage>,
) -> AppResult<()> {
    let member_state =
        ConversationService::member_state(&state.db, params.conversation_id, params.user_id)
            .await?;
    let messages: Vec<Message> =
        MessageService::list(&state.db, params.conversation_id, None)
            .await?
            .into_iter()
            .filter(|m| m.visible_to(params.user_id, member_state.cleared_at))
            .collect();

    let snapshot = WsServerEvent::MessageSnapshot {
        conversation_id: params.conversation_id,
        messages,
    };
    let payload = serde_json::to_string(&snapshot).map_err(|_| AppError::Internal)?;
    sender
        .send(WsMessage::Text(payload))
        .await
        .map_err(|_| AppError::Internal)?;

    let conversation = ConversationService::fetch(&state.db, params.conversation_id).await?;
    let typers =
        TypingService::typing_users(&state.redis, params.conversation_id, conversation.members)
            .await?;
    for typer in typers {
        if typer == params.user_id {
            continue;
        }
        let event = WsServerEvent::TypingStarted {
            conversation_id: params.conversation_id,
            user_id: typer,
        };
        let payload = serde_json::to_string(&event).map_err(|_| AppError::Internal)?;
        sender
            .send(WsMessage::Text(payload))
            .await
            .map_err(|_| AppError::Internal)?;
    }
    Ok(())
}

async fn handle_client_event(state: &AppState, params: &WsParams, event: WsClientEvent) {
    let conversation_id = params.conversation_id;
    let user_id = params.user_id;
    match event {
        WsClientEvent::TypingStart => {
            if let Err(e) = TypingService::set_typing(
                &state.redis,
                conversation_id,
                user_id,
                state.config.typing_ttl_seconds,
            )
            .await
            {
                warn!(error = %e, %conversation_id, "set_typing failed");
                return;
            }
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
        }
        WsClientEvent::TypingStop => {
            if let Err(e) =
                TypingService::clear_typing(&state.redis, conversation_id, user_id).await
            {
                warn!(error = %e, %conversation_id, "clear_typing failed");
                return;
            }
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
        }
        WsClientEvent::ReadMark { message_ids } => {
            if let Err(e) =
                MessageService::mark_read_by_user(&state.db, conversation_id, &message_ids, user_id)
                    .await
            {
                warn!(error = %e, %conversation_id, "mark_read_by_user failed");
                return;
            }
            if let Err(e) = ConversationService::mark_read(&state.db, conversation_id, user_id).await
            {
                warn!(error = %e, %conversation_id, "conversation mark_read failed");
            }
            broadcast_event(
                &state.registry,
                &state.redis,
                conversation_id,
                WsServerEvent::ReadMarked {
                    conversation_id,
                    user_id,
                    message_ids,
                },
            )
            .await;
            if let Ok(conversation) = ConversationService::fetch(&state.db, conversation_id).await {
                broadcast_event(
                    &state.registry,
                    &state.redis,
                    conversation_id,
                    WsServerEvent::ConversationUpdated { conversation },
                )
                .await;
            }
        }
    }
}
