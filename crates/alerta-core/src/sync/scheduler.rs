//! Background sync jobs.
//!
//! Jobs are tokio tasks registered under a unique name. The scheduler only
//! decides *when* a sync run happens and backs off when a whole run fails;
//! which incidents may still be retried is decided by the
//! [`SyncManager`](super::SyncManager) retry counter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{SyncManager, SyncOutcome};
use crate::notify::{SyncNotification, SyncNotifier};

/// Unique name of the recurring sync job
pub const PERIODIC_SYNC_JOB: &str = "periodic_sync";
/// Unique name of the one-shot sync job
pub const IMMEDIATE_SYNC_JOB: &str = "immediate_sync";
/// Tag shared by all sync jobs, used for bulk cancellation
pub const SYNC_JOB_TAG: &str = "sync_incidents";

const BATTERY_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// What to do when a job with the same name is already scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingJobPolicy {
    /// Leave the running job alone and drop the new request
    Keep,
    /// Cancel the running job and start the new one
    Replace,
}

/// Result a job body reports to the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    /// Run again after a backoff delay
    Retry,
}

/// Conditions that must hold before a job body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConstraints {
    pub requires_network: bool,
    pub requires_battery_not_low: bool,
}

impl JobConstraints {
    /// Network connected and battery not low
    pub const SYNC: Self = Self {
        requires_network: true,
        requires_battery_not_low: true,
    };

    pub const NONE: Self = Self {
        requires_network: false,
        requires_battery_not_low: false,
    };
}

impl Default for JobConstraints {
    fn default() -> Self {
        Self::SYNC
    }
}

/// Exponential backoff between failed runs of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first failed run before the job gives up
    pub max_retries: u32,
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`, capped
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60 * 60),
            max_retries: 5,
        }
    }
}

/// Reports whether the device battery is low
pub trait BatteryMonitor: Send + Sync {
    fn is_battery_low(&self) -> bool;
}

/// Battery monitor for machines on mains power
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalPower;

impl BatteryMonitor for ExternalPower {
    fn is_battery_low(&self) -> bool {
        false
    }
}

struct ScheduledJob {
    tag: &'static str,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
struct JobRunner {
    manager: SyncManager,
    notifier: Arc<dyn SyncNotifier>,
    battery: Arc<dyn BatteryMonitor>,
    constraints: JobConstraints,
    backoff: BackoffPolicy,
    battery_poll_interval: Duration,
}

impl JobRunner {
    async fn run_sync_job(&self) -> JobStatus {
        if let Err(error) = self.manager.reset_syncing_incidents().await {
            tracing::warn!("Could not reset interrupted syncs: {}", error);
            return JobStatus::Retry;
        }

        let outcome = self.manager.sync_pending_incidents().await;
        if let Some(notification) = SyncNotification::from_outcome(&outcome) {
            self.notifier.notify(&notification);
        }

        match outcome {
            SyncOutcome::Success(_) => JobStatus::Success,
            SyncOutcome::Error(_) | SyncOutcome::NoNetwork => JobStatus::Retry,
        }
    }

    /// Returns false when connectivity can no longer be observed
    async fn wait_for_constraints(&self) -> bool {
        if self.constraints.requires_network && !self.manager.is_online() {
            tracing::debug!("Sync job waiting for network");
            let mut subscription = self.manager.network().subscribe();
            if !subscription.wait_until_online().await {
                return false;
            }
        }

        if self.constraints.requires_battery_not_low {
            while self.battery.is_battery_low() {
                tracing::debug!("Sync job waiting for battery to recover");
                tokio::time::sleep(self.battery_poll_interval).await;
            }
        }

        true
    }

    async fn run_when_ready(&self) -> JobStatus {
        let mut retries = 0;
        loop {
            if !self.wait_for_constraints().await {
                tracing::warn!("Connectivity source closed; abandoning sync job");
                return JobStatus::Retry;
            }

            match self.run_sync_job().await {
                JobStatus::Success => return JobStatus::Success,
                JobStatus::Retry if retries >= self.backoff.max_retries => {
                    tracing::warn!("Sync job gave up after {} retries", retries);
                    return JobStatus::Retry;
                }
                JobStatus::Retry => {
                    retries += 1;
                    let delay = self.backoff.delay_for(retries);
                    tracing::info!(
                        "Sync job will retry in {:?} (retry {}/{})",
                        delay,
                        retries,
                        self.backoff.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Schedules periodic and on-demand incident sync
pub struct SyncScheduler {
    runner: JobRunner,
    jobs: Arc<Mutex<HashMap<&'static str, ScheduledJob>>>,
}

impl SyncScheduler {
    pub fn new(manager: SyncManager, notifier: Arc<dyn SyncNotifier>) -> Self {
        Self {
            runner: JobRunner {
                manager,
                notifier,
                battery: Arc::new(ExternalPower),
                constraints: JobConstraints::SYNC,
                backoff: BackoffPolicy::default(),
                battery_poll_interval: BATTERY_POLL_INTERVAL,
            },
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_battery_monitor(mut self, battery: Arc<dyn BatteryMonitor>) -> Self {
        self.runner.battery = battery;
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: JobConstraints) -> Self {
        self.runner.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.runner.backoff = backoff;
        self
    }

    /// Register the recurring sync job.
    ///
    /// Returns false when the job is already scheduled; the existing schedule
    /// is kept.
    pub fn start_periodic_sync(&self, interval: Duration) -> bool {
        let runner = self.runner.clone();
        let scheduled = self.enqueue_unique(PERIODIC_SYNC_JOB, ExistingJobPolicy::Keep, async move {
            loop {
                runner.run_when_ready().await;
                tokio::time::sleep(interval).await;
            }
        });
        if scheduled {
            tracing::info!("Periodic incident sync scheduled every {:?}", interval);
        }
        scheduled
    }

    /// Run a sync as soon as constraints allow, replacing a pending one-shot run.
    pub fn sync_now(&self) {
        let runner = self.runner.clone();
        self.enqueue_unique(IMMEDIATE_SYNC_JOB, ExistingJobPolicy::Replace, async move {
            runner.run_when_ready().await;
        });
    }

    /// Cancel every sync job. Returns how many were still running.
    pub fn cancel_all_sync(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let names = jobs
            .iter()
            .filter(|(_, job)| job.tag == SYNC_JOB_TAG)
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();

        let mut cancelled = 0;
        for name in names {
            if let Some(job) = jobs.remove(name) {
                if !job.handle.is_finished() {
                    cancelled += 1;
                }
                job.handle.abort();
            }
        }

        tracing::info!("Cancelled {cancelled} sync job(s)");
        cancelled
    }

    /// Whether a job with this name is scheduled and not finished
    pub fn is_scheduled(&self, name: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.get(name).is_some_and(|job| !job.handle.is_finished())
    }

    /// Run the job body once in the caller's task, without constraints or backoff.
    pub async fn run_sync_job(&self) -> JobStatus {
        self.runner.run_sync_job().await
    }

    fn enqueue_unique<F>(&self, name: &'static str, policy: ExistingJobPolicy, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = jobs.get(name) {
            if !existing.handle.is_finished() {
                match policy {
                    ExistingJobPolicy::Keep => {
                        tracing::debug!("Job '{}' already scheduled, keeping it", name);
                        return false;
                    }
                    ExistingJobPolicy::Replace => {
                        tracing::debug!("Replacing scheduled job '{}'", name);
                        existing.handle.abort();
                    }
                }
            }
        }

        jobs.insert(
            name,
            ScheduledJob {
                tag: SYNC_JOB_TAG,
                handle: tokio::spawn(job),
            },
        );
        true
    }
}
