//! Offline-first incident sync.
//!
//! [`SyncManager`] owns per-incident retry bookkeeping; [`SyncScheduler`]
//! decides when a sync run happens.

mod manager;
mod scheduler;

pub use manager::SyncManager;
pub use scheduler::{
    BackoffPolicy, BatteryMonitor, ExistingJobPolicy, ExternalPower, JobConstraints, JobStatus,
    SyncScheduler, IMMEDIATE_SYNC_JOB, PERIODIC_SYNC_JOB, SYNC_JOB_TAG,
};

/// Failed pushes allowed before an incident stops being retried automatically
pub const MAX_RETRY_COUNT: u32 = 3;

/// Result of a sync operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Number of incidents that synced
    Success(usize),
    /// Why the operation failed
    Error(String),
    /// No connectivity; nothing was attempted
    NoNetwork,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(count) => write!(f, "synced {count} incident(s)"),
            Self::Error(message) => write!(f, "sync failed: {message}"),
            Self::NoNetwork => f.write_str("no network connection"),
        }
    }
}
