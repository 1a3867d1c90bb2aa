use std::sync::Arc;

use dm_service::{
    config::Config,
    db,
    error::AppError,
    logging, routes,
    redis_client::RedisClient,
    services::{notification_service, user_directory},
    state::AppState,
    websocket::{pubsub, ConnectionRegistry},
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&config.database_url).await?;

    // Embedded migrations, idempotent. A schema mismatch is fatal.
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::StartServer(format!("migrations: {e}")))?;

    let redis = RedisClient::from_url(&config.redis_url).await?;
    let registry = ConnectionRegistry::new();

    // The pub/sub relay needs its own connection, separate from the
    // multiplexed manager.
    let psub_client = redis::Client::open(config.redis_url.as_str())?;
    let relay_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = pubsub::start_psub_listener(psub_client, relay_registry).await {
            tracing::error!(error = %e, "pubsub relay terminated");
        }
    });

    let state = AppState {
        db: pool,
        redis,
        registry,
        notifier: notification_service::from_config(&config),
        directory: user_directory::from_config(&config),
        config: config.clone(),
    };

    let app = routes::build_router().with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "dm-service listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(format!("server: {e}")))?;

    Ok(())
}
