//! Policy change notification

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{AuthzError, Result};

/// Policy change announced to a [`Watcher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyChange {
    /// The whole policy was written through the adapter
    SavePolicy,
    /// Rows were added
    AddPolicies {
        sec: String,
        ptype: String,
        rules: Vec<Vec<String>>,
    },
    /// Rows were removed
    RemovePolicies {
        sec: String,
        ptype: String,
        rules: Vec<Vec<String>>,
    },
    /// Rows matching a field filter were removed
    RemoveFilteredPolicy {
        sec: String,
        ptype: String,
        field_index: usize,
        field_values: Vec<String>,
    },
}

/// Notification hook invoked after the policy changes
///
/// Failures are reported to the caller's log only; they never turn a
/// successful policy change into an error.
pub trait Watcher: Send + Sync {
    fn update(&self, change: &PolicyChange) -> Result<()>;
}

/// Watcher publishing every change on a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastWatcher {
    sender: broadcast::Sender<PolicyChange>,
}

impl BroadcastWatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive subsequent changes
    pub fn subscribe(&self) -> broadcast::Receiver<PolicyChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastWatcher {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Watcher for BroadcastWatcher {
    fn update(&self, change: &PolicyChange) -> Result<()> {
        if self.sender.receiver_count() == 0 {
            debug!(?change, "No watcher subscribers");
            return Ok(());
        }
        self.sender
            .send(change.clone())
            .map(|_| ())
            .map_err(|e| AuthzError::Watcher(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_changes() {
        let watcher = BroadcastWatcher::new(8);
        let mut rx1 = watcher.subscribe();
        let mut rx2 = watcher.subscribe();
        assert_eq!(watcher.subscriber_count(), 2);

        watcher.update(&PolicyChange::SavePolicy).unwrap();

        assert_eq!(rx1.recv().await.unwrap(), PolicyChange::SavePolicy);
        assert_eq!(rx2.recv().await.unwrap(), PolicyChange::SavePolicy);
    }

    #[test]
    fn test_update_without_subscribers() {
        let watcher = BroadcastWatcher::default();
        assert!(watcher.update(&PolicyChange::SavePolicy).is_ok());
    }

    #[test]
    fn test_change_serialization() {
        let change = PolicyChange::AddPolicies {
            sec: "p".to_string(),
            ptype: "p".to_string(),
            rules: vec![vec!["alice".to_string(), "data1".to_string()]],
        };
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"type\":\"add_policies\""));
        let back: PolicyChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }
}
