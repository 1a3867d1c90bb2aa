use axum::middleware;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;

use crate::middleware::auth::require_user;
use crate::state::AppState;

pub mod conversations;
pub mod messages;
pub mod presence;
pub mod reactions;
pub mod wsroute;

use conversations::{
    archive_conversation, clear_conversation, create_conversation, get_conversation,
    list_conversations, mark_conversation_read, start_typing, stop_typing,
    unarchive_conversation,
};
use messages::{delete_message, edit_message, get_messages, mark_messages_read, send_message};
use presence::{get_presence, heartbeat};
use reactions::set_reaction;
use wsroute::ws_handler;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router() -> Router<AppState> {
    let api = Router::new()
        .route(
            "/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/read", post(mark_conversation_read))
        .route(
            "/conversations/:id/archive",
            post(archive_conversation).delete(unarchive_conversation),
        )
        .route("/conversations/:id/clear", post(clear_conversation))
        .route(
            "/conversations/:id/messages",
            post(send_message).get(get_messages),
        )
        .route(
            "/conversations/:id/typing",
            post(start_typing).delete(stop_typing),
        )
        .route("/messages/read", post(mark_messages_read))
        .route("/messages/:id", put(edit_message).delete(delete_message))
        .route("/messages/:id/reaction", put(set_reaction))
        .route("/presence/heartbeat", post(heartbeat))
        .route("/presence/:user_id", get(get_presence))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn(require_user));

    Router::new().route("/health", get(health)).merge(api)
}
