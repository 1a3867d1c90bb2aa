use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::presence::PresenceStatus;
use crate::services::presence_service::PresenceService;
use crate::state::AppState;

/// POST /presence/heartbeat — called on app foreground and on a steady
/// low-frequency heartbeat, not per user action.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<StatusCode, AppError> {
    PresenceService::touch(&state.redis, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /presence/:user_id — deliberately a plain polled read rather than a
/// subscription, so its weaker consistency stays visible to callers.
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PresenceStatus>, AppError> {
    let status = PresenceService::get_status(
        &state.redis,
        user_id,
        state.config.presence_online_seconds,
    )
    .await?;
    Ok(Json(status))
}
