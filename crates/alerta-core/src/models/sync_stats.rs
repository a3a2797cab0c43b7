//! Per-status incident counts

use serde::{Deserialize, Serialize};

use super::SyncStatus;

/// Number of local incidents in each sync status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub pending: usize,
    pub syncing: usize,
    pub synced: usize,
    pub error: usize,
}

impl SyncStats {
    /// Add `count` records of the given status
    pub fn add(&mut self, status: SyncStatus, count: usize) {
        match status {
            SyncStatus::PendingSync => self.pending += count,
            SyncStatus::Syncing => self.syncing += count,
            SyncStatus::Synced => self.synced += count,
            SyncStatus::SyncError => self.error += count,
        }
    }

    /// Count for one status
    #[must_use]
    pub const fn get(&self, status: SyncStatus) -> usize {
        match status {
            SyncStatus::PendingSync => self.pending,
            SyncStatus::Syncing => self.syncing,
            SyncStatus::Synced => self.synced,
            SyncStatus::SyncError => self.error,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.syncing + self.synced + self.error
    }
}
