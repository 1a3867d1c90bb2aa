use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub display_name: String,
    pub photo_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Read-only view onto the external user directory. Used to resolve the
/// partner's display identity for reply snapshots and notification titles;
/// never joined against in SQL.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_summary(&self, user_id: Uuid) -> Result<UserSummary, String>;
}

pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user_summary(&self, user_id: Uuid) -> Result<UserSummary, String> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("directory request: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("directory returned {}", response.status()));
        }
        response
            .json::<UserSummary>()
            .await
            .map_err(|e| format!("directory decode: {e}"))
    }
}

/// Used when no directory is configured (tests, single-service deployments):
/// derives a stable placeholder name from the id.
pub struct FallbackDirectory;

#[async_trait]
impl UserDirectory for FallbackDirectory {
    async fn get_user_summary(&self, user_id: Uuid) -> Result<UserSummary, String> {
        let short = user_id.simple().to_string();
        Ok(UserSummary {
            display_name: format!("user-{}", &short[..8]),
            photo_url: None,
            last_seen_at: None,
        })
    }
}

pub fn from_config(config: &Config) -> Arc<dyn UserDirectory> {
    match &config.user_directory_url {
        Some(url) => Arc::new(HttpUserDirectory::new(url.clone())),
        None => Arc::new(FallbackDirectory),
    }
}
