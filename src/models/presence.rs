use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Derived online/offline status. There is no explicit "went offline"
/// write anywhere; staleness of the last heartbeat is the signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PresenceStatus {
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

pub fn derive_status(
    last_seen_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold_seconds: i64,
) -> PresenceStatus {
    let online = last_seen_at
        .map(|seen| now - seen < Duration::seconds(threshold_seconds))
        .unwrap_or(false);
    PresenceStatus {
        online,
        last_seen_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heartbeat_is_online() {
        let now = Utc::now();
        let status = derive_status(Some(now - Duration::seconds(30)), now, 60);
        assert!(status.online);
    }

    #[test]
    fn stale_heartbeat_is_offline() {
        let now = Utc::now();
        let status = derive_status(Some(now - Duration::seconds(61)), now, 60);
        assert!(!status.online);
        assert!(status.last_seen_at.is_some());
    }

    #[test]
    fn never_seen_is_offline() {
        let status = derive_status(None, Utc::now(), 60);
        assert!(!status.online);
        assert!(status.last_seen_at.is_none());
    }
}
