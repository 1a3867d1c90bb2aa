use axum::extract::ws::Message;
use futures_util::StreamExt;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::redis_client::RedisClient;
use crate::websocket::ConnectionRegistry;

fn channel_for_conversation(id: Uuid) -> String {
    format!("conversation:{id}")
}

pub async fn publish(
    redis: &RedisClient,
    conversation_id: Uuid,
    payload: &str,
) -> redis::RedisResult<()> {
    let mut conn = redis.conn();
    conn.publish::<_, _, ()>(channel_for_conversation(conversation_id), payload)
        .await
}

/// Relay events published by other service instances into this instance's
/// local registry. PubSub needs a dedicated connection, not the multiplexed
/// manager.
pub async fn start_psub_listener(
    client: redis::Client,
    registry: ConnectionRegistry,
) -> redis::RedisResult<()> {
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe("conversation:*").await?;
    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel: String = msg.get_channel_name().into();
        let payload: String = msg.get_payload()?;
        if let Some(rest) = channel.strip_prefix("conversation:") {
            if let Ok(conversation_id) = Uuid::parse_str(rest) {
                registry
                    .broadcast(conversation_id, Message::Text(payload.clone()))
                    .await;
            }
        }
    }
    Ok(())
}
