use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::presence::{derive_status, PresenceStatus};
use crate::redis_client::RedisClient;

/// Last-activity tracking. Writes happen on a low-frequency heartbeat, not
/// on every user action; there is no explicit offline write, and no TTL on
/// the key, so "last seen" survives long absences.
pub struct PresenceService;

impl PresenceService {
    fn key(user_id: Uuid) -> String {
        format!("presence:{user_id}")
    }

    pub async fn touch(redis: &RedisClient, user_id: Uuid) -> AppResult<()> {
        let mut conn = redis.conn();
        conn.set::<_, _, ()>(Self::key(user_id), Utc::now().to_rfc3339())
            .await?;
        Ok(())
    }

    /// Best-effort, eventually-consistent status. Callers that need to track
    /// a partner poll this on their own interval; it is never a delivery
    /// guarantee.
    pub async fn get_status(
        redis: &RedisClient,
        user_id: Uuid,
        threshold_seconds: i64,
    ) -> AppResult<PresenceStatus> {
        let mut conn = redis.conn();
        let raw: Option<String> = conn.get(Self::key(user_id)).await?;
        let last_seen_at = raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok(derive_status(last_seen_at, Utc::now(), threshold_seconds))
    }
}
