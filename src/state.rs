use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::config::Config;
use crate::redis_client::RedisClient;
use crate::services::notification_service::NotificationDispatcher;
use crate::services::user_directory::UserDirectory;
use crate::websocket::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub redis: RedisClient,
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub directory: Arc<dyn UserDirectory>,
}
