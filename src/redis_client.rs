use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};

/// Clone-able handle over a shared multiplexed Redis connection.
/// Pub/sub listeners need a dedicated connection and take a `Client`
/// directly (see `websocket::pubsub`).
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn from_url(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    pub fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}
