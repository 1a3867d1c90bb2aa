use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::AppResult;
use crate::redis_client::RedisClient;

/// Ephemeral "currently composing" flags, one Redis key per (conversation,
/// member). Every key carries a short TTL so a client that disconnects
/// mid-compose can never leave a stuck indicator; well-behaved clients still
/// clear eagerly on idle and on send.
pub struct TypingService;

impl TypingService {
    fn key(conversation_id: Uuid, user_id: Uuid) -> String {
        format!("typing:{conversation_id}:{user_id}")
    }

    pub async fn set_typing(
        redis: &RedisClient,
        conversation_id: Uuid,
        user_id: Uuid,
        ttl_seconds: u64,
    ) -> AppResult<()> {
        let mut conn = redis.conn();
        conn.set_ex::<_, _, ()>(Self::key(conversation_id, user_id), 1u8, ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn clear_typing(
        redis: &RedisClient,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let mut conn = redis.conn();
        conn.del::<_, ()>(Self::key(conversation_id, user_id)).await?;
        Ok(())
    }

    /// Which of the two members are composing right now.
    pub async fn typing_users(
        redis: &RedisClient,
        conversation_id: Uuid,
        members: [Uuid; 2],
    ) -> AppResult<Vec<Uuid>> {
        let mut conn = redis.conn();
        let keys: Vec<String> = members
            .iter()
            .map(|user_id| Self::key(conversation_id, *user_id))
            .collect();
        let flags: Vec<Option<u8>> = conn.mget(keys).await?;
        Ok(members
            .iter()
            .zip(flags)
            .filter_map(|(user_id, flag)| flag.map(|_| *user_id))
            .collect())
    }
}
