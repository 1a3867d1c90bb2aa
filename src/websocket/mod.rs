use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod message_types;
pub mod pubsub;

/// conversation_id -> live subscriber channels on this instance. Dead
/// senders are pruned on broadcast; cross-instance delivery goes through
/// the Redis relay in `pubsub`.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<UnboundedSender<Message>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_subscriber(&self, conversation_id: Uuid) -> UnboundedReceiver<Message> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        guard.entry(conversation_id).or_default().push(tx);
        rx
    }

    pub async fn broadcast(&self, conversation_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(list) = guard.get_mut(&conversation_id) {
            list.retain(|sender| sender.send(msg.clone()).is_ok());
            if list.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }
}
