use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::models::presence::PresenceStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Reaction,
    ApplicationCreated,
    ApplicationAccepted,
    ApplicationRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub deep_link: Option<String>,
}

/// Cross-channel alert fan-out. The transport behind this boundary (push,
/// email, in-app badge) is an external collaborator; this service only
/// hands events over.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), String>;
}

/// Alerts target inactive recipients only; an online partner already sees
/// the change through their live subscription.
pub fn should_alert(recipient: &PresenceStatus) -> bool {
    !recipient.online
}

/// Fire-and-forget dispatch: a delivery failure is logged and never rolls
/// back the state change that triggered it.
pub fn dispatch(dispatcher: Arc<dyn NotificationDispatcher>, notification: Notification) {
    tokio::spawn(async move {
        let user_id = notification.user_id;
        if let Err(e) = dispatcher.notify(notification).await {
            tracing::warn!(%user_id, error = %e, "notification dispatch failed");
        }
    });
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await
            .map_err(|e| format!("webhook send: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("webhook returned {}", response.status()));
        }
        Ok(())
    }
}

pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        tracing::debug!(user_id = %notification.user_id, kind = ?notification.kind,
            "notification dropped (no dispatcher configured)");
        Ok(())
    }
}

pub fn from_config(config: &Config) -> Arc<dyn NotificationDispatcher> {
    match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookDispatcher::new(url.clone())),
        None => Arc::new(NoopDispatcher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn offline_recipient_gets_alerted() {
        let status = PresenceStatus {
            online: false,
            last_seen_at: Some(Utc::now() - chrono::Duration::hours(2)),
        };
        assert!(should_alert(&status));
    }

    #[test]
    fn online_recipient_is_skipped() {
        let status = PresenceStatus {
            online: true,
            last_seen_at: Some(Utc::now()),
        };
        assert!(!should_alert(&status));
    }

    #[test]
    fn never_seen_recipient_gets_alerted() {
        let status = PresenceStatus {
            online: false,
            last_seen_at: None,
        };
        assert!(should_alert(&status));
    }

    struct Recorder(tokio::sync::mpsc::UnboundedSender<Uuid>);

    #[async_trait]
    impl NotificationDispatcher for Recorder {
        async fn notify(&self, notification: Notification) -> Result<(), String> {
            self.0
                .send(notification.user_id)
                .map_err(|e| e.to_string())
        }
    }

    #[tokio::test]
    async fn dispatch_hands_off_in_background() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let recipient = Uuid::new_v4();
        dispatch(
            Arc::new(Recorder(tx)),
            Notification {
                user_id: recipient,
                kind: NotificationKind::Message,
                title: "alice".into(),
                body: "hello".into(),
                data: serde_json::json!({}),
                deep_link: None,
            },
        );
        assert_eq!(rx.recv().await, Some(recipient));
    }
}
