//! Pushes locally stored incidents to the remote API.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::{IncidentId, SyncStats, SyncStatus};
use crate::network::NetworkMonitor;
use crate::remote::{IncidentApi, IncidentPayload};
use crate::services::IncidentStore;

use super::{SyncOutcome, MAX_RETRY_COUNT};

/// Drives incidents through `PENDING_SYNC -> SYNCING -> SYNCED | SYNC_ERROR`.
///
/// Incidents are synced one at a time. Errors never escape: every failure is
/// persisted on the record (where there is one) and returned as
/// [`SyncOutcome::Error`].
///
/// Clones share one sync lock. Pushes, the `SYNCING` reset and retries all
/// run under it, so a reset never re-queues a record whose push is in flight.
#[derive(Clone)]
pub struct SyncManager {
    store: IncidentStore,
    api: Arc<dyn IncidentApi>,
    network: Arc<dyn NetworkMonitor>,
    sync_lock: Arc<Mutex<()>>,
}

impl SyncManager {
    pub fn new(
        store: IncidentStore,
        api: Arc<dyn IncidentApi>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Self {
        Self {
            store,
            api,
            network,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    pub const fn store(&self) -> &IncidentStore {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn IncidentApi> {
        &self.api
    }

    pub fn network(&self) -> &Arc<dyn NetworkMonitor> {
        &self.network
    }

    pub fn is_online(&self) -> bool {
        self.network.is_connected()
    }

    /// Push every `PENDING_SYNC` and `SYNC_ERROR` incident.
    ///
    /// Returns `NoNetwork` without touching anything when offline, otherwise
    /// `Success` with the number of incidents that synced. Individual failures
    /// do not stop the run and are only visible on the records themselves.
    pub async fn sync_pending_incidents(&self) -> SyncOutcome {
        let _guard = self.sync_lock.lock().await;
        self.sync_pending_locked().await
    }

    async fn sync_pending_locked(&self) -> SyncOutcome {
        if !self.network.is_connected() {
            tracing::debug!("Skipping incident sync: no network");
            return SyncOutcome::NoNetwork;
        }

        let statuses = SyncStatus::ALL
            .into_iter()
            .filter(|status| status.needs_sync())
            .collect::<Vec<_>>();
        let candidates = match self.store.list_by_statuses(&statuses).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::error!("Failed to load pending incidents: {}", error);
                return SyncOutcome::Error(error.to_string());
            }
        };

        if candidates.is_empty() {
            tracing::debug!("No incidents waiting for sync");
            return SyncOutcome::Success(0);
        }

        let total = candidates.len();
        let mut synced = 0;
        for incident in candidates {
            if self.sync_single_locked(&incident.id).await.is_success() {
                synced += 1;
            }
        }

        tracing::info!("Incident sync finished: {synced}/{total} synced");
        SyncOutcome::Success(synced)
    }

    /// Push one incident.
    ///
    /// Already-synced incidents succeed without a request. Incidents that used
    /// up their retries fail without a request and without being modified.
    pub async fn sync_single_incident(&self, id: &IncidentId) -> SyncOutcome {
        let _guard = self.sync_lock.lock().await;
        self.sync_single_locked(id).await
    }

    async fn sync_single_locked(&self, id: &IncidentId) -> SyncOutcome {
        let incident = match self.store.get(id).await {
            Ok(Some(incident)) => incident,
            Ok(None) => return SyncOutcome::Error(format!("Incident not found: {id}")),
            Err(error) => return SyncOutcome::Error(error.to_string()),
        };

        if incident.sync_status == SyncStatus::Synced {
            return SyncOutcome::Success(1);
        }

        if incident.retry_count >= MAX_RETRY_COUNT {
            tracing::debug!(
                "Incident {} reached the retry limit ({}), skipping",
                id,
                MAX_RETRY_COUNT
            );
            return SyncOutcome::Error(format!(
                "Incident {id} exceeded {MAX_RETRY_COUNT} sync attempts"
            ));
        }

        if let Err(error) = self
            .store
            .update_status(id, SyncStatus::Syncing, None)
            .await
        {
            return self.fail(id, error.to_string()).await;
        }

        let payload = IncidentPayload::from(&incident);
        let server_id = match self.api.create_incident(&payload).await {
            Ok(remote) => match remote.server_id() {
                Some(server_id) => server_id,
                None => {
                    return self
                        .fail(id, "Server response did not include an incident id".into())
                        .await
                }
            },
            Err(error) => return self.fail(id, error.to_string()).await,
        };

        match self.store.mark_synced(id, &server_id).await {
            Ok(()) => {
                tracing::debug!("Incident {} synced as {}", id, server_id);
                SyncOutcome::Success(1)
            }
            Err(error) => self.fail(id, error.to_string()).await,
        }
    }

    async fn fail(&self, id: &IncidentId, message: String) -> SyncOutcome {
        tracing::warn!("Incident {} failed to sync: {}", id, message);
        if let Err(error) = self.store.record_sync_failure(id, &message).await {
            tracing::error!("Could not record sync failure for {}: {}", id, error);
        }
        SyncOutcome::Error(message)
    }

    /// Counts per status.
    pub async fn get_sync_stats(&self) -> crate::Result<SyncStats> {
        self.store.stats().await
    }

    /// Put incidents left in `SYNCING` by an interrupted run back in the queue.
    ///
    /// Waits for any push in flight to finish first.
    pub async fn reset_syncing_incidents(&self) -> crate::Result<usize> {
        let _guard = self.sync_lock.lock().await;
        let reset = self.store.reset_syncing().await?;
        if reset > 0 {
            tracing::info!("Reset {reset} interrupted incident sync(s) to pending");
        }
        Ok(reset)
    }

    /// Re-queue failed incidents that still have retries left, then sync.
    pub async fn retry_sync_errors(&self) -> SyncOutcome {
        let _guard = self.sync_lock.lock().await;
        let failed = match self
            .store
            .list_by_statuses(&[SyncStatus::SyncError])
            .await
        {
            Ok(failed) => failed,
            Err(error) => return SyncOutcome::Error(error.to_string()),
        };

        for incident in failed
            .iter()
            .filter(|incident| incident.retry_count < MAX_RETRY_COUNT)
        {
            if let Err(error) = self
                .store
                .update_status(&incident.id, SyncStatus::PendingSync, None)
                .await
            {
                tracing::warn!("Could not re-queue incident {}: {}", incident.id, error);
            }
        }

        self.sync_pending_locked().await
    }

    /// Manually sync one incident, clearing a previous failure first.
    ///
    /// A failed incident gets a fresh retry budget, so this also works on
    /// incidents that exhausted their automatic retries.
    pub async fn force_sync_incident(&self, id: &IncidentId) -> SyncOutcome {
        let _guard = self.sync_lock.lock().await;
        match self.store.get(id).await {
            Ok(Some(incident)) if incident.sync_status == SyncStatus::SyncError => {
                if let Err(error) = self.store.reset_for_retry(id).await {
                    return SyncOutcome::Error(error.to_string());
                }
            }
            Ok(_) => {}
            Err(error) => return SyncOutcome::Error(error.to_string()),
        }

        self.sync_single_locked(id).await
    }
}
