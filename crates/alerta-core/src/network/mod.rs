//! Network reachability.
//!
//! Connectivity is published through a `tokio::sync::watch` channel. Callers
//! observe transitions with an explicit [`ConnectivitySubscription`] handle
//! instead of registering callbacks.

mod probe;

use std::sync::Arc;

use tokio::sync::watch;

pub use probe::{ProbeHandle, ReachabilityProbe};

/// Source of connectivity information for the sync core
pub trait NetworkMonitor: Send + Sync {
    /// Whether the network is usable right now
    fn is_connected(&self) -> bool;

    /// Start observing connectivity transitions
    fn subscribe(&self) -> ConnectivitySubscription;
}

/// Shared connectivity state, cheap to clone
#[derive(Clone, Debug)]
pub struct ConnectivityWatch {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityWatch {
    #[must_use]
    pub fn new(connected: bool) -> Self {
        let (sender, _) = watch::channel(connected);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish the current connectivity; subscribers are only woken on change
    pub fn set_connected(&self, connected: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            tracing::debug!("Connectivity changed: connected={}", connected);
        }
    }
}

impl Default for ConnectivityWatch {
    fn default() -> Self {
        Self::new(false)
    }
}

impl NetworkMonitor for ConnectivityWatch {
    fn is_connected(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> ConnectivitySubscription {
        ConnectivitySubscription {
            receiver: Some(self.sender.subscribe()),
        }
    }
}

/// Handle for observing connectivity transitions
///
/// Dropping the handle or calling [`cancel`](Self::cancel) ends the
/// subscription.
#[derive(Debug)]
pub struct ConnectivitySubscription {
    receiver: Option<watch::Receiver<bool>>,
}

impl ConnectivitySubscription {
    /// Last published connectivity, `false` once cancelled
    #[must_use]
    pub fn current(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Wait for the next transition
    ///
    /// Returns `None` when the subscription was cancelled or the source is gone.
    pub async fn changed(&mut self) -> Option<bool> {
        let receiver = self.receiver.as_mut()?;
        if receiver.changed().await.is_err() {
            self.receiver = None;
            return None;
        }
        let connected = *receiver.borrow_and_update();
        Some(connected)
    }

    /// Resolve once connected; returns false if the subscription ends first
    pub async fn wait_until_online(&mut self) -> bool {
        let Some(receiver) = self.receiver.as_mut() else {
            return false;
        };
        let result = receiver.wait_for(|connected| *connected).await.is_ok();
        if !result {
            self.receiver = None;
        }
        result
    }

    /// Stop observing
    pub fn cancel(&mut self) {
        self.receiver = None;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}
