//! Incident sync status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of an incident in the sync state machine.
///
/// `PendingSync -> Syncing -> Synced`, or `Syncing -> SyncError`, and a
/// retried `SyncError` goes back to `PendingSync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Stored locally, waiting to be pushed
    PendingSync,
    /// A push is in flight
    Syncing,
    /// Accepted by the server
    Synced,
    /// Last push failed
    SyncError,
}

impl SyncStatus {
    /// All statuses, in state-machine order
    pub const ALL: [Self; 4] = [
        Self::PendingSync,
        Self::Syncing,
        Self::Synced,
        Self::SyncError,
    ];

    /// Column value stored in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingSync => "PENDING_SYNC",
            Self::Syncing => "SYNCING",
            Self::Synced => "SYNCED",
            Self::SyncError => "SYNC_ERROR",
        }
    }

    /// Whether the sync manager should pick this record up
    #[must_use]
    pub const fn needs_sync(self) -> bool {
        matches!(self, Self::PendingSync | Self::SyncError)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING_SYNC" => Ok(Self::PendingSync),
            "SYNCING" => Ok(Self::Syncing),
            "SYNCED" => Ok(Self::Synced),
            "SYNC_ERROR" => Ok(Self::SyncError),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}
