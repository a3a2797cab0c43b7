//! User-visible sync notifications.

use crate::sync::SyncOutcome;

/// Summary shown to the user after a background sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotification {
    pub title: String,
    pub body: String,
    pub is_error: bool,
}

impl SyncNotification {
    /// Notification for a sync run, if the run is worth telling the user about
    ///
    /// Nothing is shown when there was nothing to sync or no network.
    #[must_use]
    pub fn from_outcome(outcome: &SyncOutcome) -> Option<Self> {
        match outcome {
            SyncOutcome::Success(0) | SyncOutcome::NoNetwork => None,
            SyncOutcome::Success(count) => Some(Self {
                title: "Incidents synced".to_string(),
                body: if *count == 1 {
                    "1 incident synced".to_string()
                } else {
                    format!("{count} incidents synced")
                },
                is_error: false,
            }),
            SyncOutcome::Error(message) => Some(Self {
                title: "Sync failed".to_string(),
                body: message.clone(),
                is_error: true,
            }),
        }
    }
}

/// Delivers sync notifications to the user
pub trait SyncNotifier: Send + Sync {
    fn notify(&self, notification: &SyncNotification);
}
