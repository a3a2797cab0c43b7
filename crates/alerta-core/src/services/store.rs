//! Shared incident store used by the sync core and the facade.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, IncidentRepository, LibSqlIncidentRepository};
use crate::models::{Incident, IncidentId, SyncStats, SyncStatus};
use crate::{Error, Result};

/// Thread-safe local store for incidents.
///
/// Every operation takes the same async mutex, so writes to a record are
/// serialized. Multi-step sequences (mark syncing, call the server, mark
/// synced) are not wrapped in one lock.
#[derive(Clone)]
pub struct IncidentStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl IncidentStore {
    /// Open a store backed by a file, creating parent directories as needed.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Opened incident store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Insert or replace one incident.
    pub async fn save(&self, incident: &Incident) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.upsert(incident).await
    }

    /// Fetch by local id.
    pub async fn get(&self, id: &IncidentId) -> Result<Option<Incident>> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.get(id).await
    }

    /// Fetch by server id.
    pub async fn get_by_server_id(&self, server_id: &str) -> Result<Option<Incident>> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.get_by_server_id(server_id).await
    }

    /// All incidents, newest first.
    pub async fn list_all(&self) -> Result<Vec<Incident>> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.list().await
    }

    /// Incidents in any of the given statuses.
    pub async fn list_by_statuses(&self, statuses: &[SyncStatus]) -> Result<Vec<Incident>> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.list_by_statuses(statuses).await
    }

    /// Incidents in a district.
    pub async fn list_by_district(&self, district: &str) -> Result<Vec<Incident>> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.list_by_district(district).await
    }

    /// Set status and error message.
    pub async fn update_status(
        &self,
        id: &IncidentId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        found_or_not_found(repo.update_status(id, status, error).await?, id)
    }

    /// Store the server id and mark the incident `SYNCED`.
    pub async fn mark_synced(&self, id: &IncidentId, server_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        found_or_not_found(repo.mark_synced(id, server_id).await?, id)
    }

    /// Bump the retry counter.
    pub async fn increment_retry_count(&self, id: &IncidentId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        found_or_not_found(repo.increment_retry_count(id).await?, id)
    }

    /// Count one failed attempt and move the incident to `SYNC_ERROR`, in one transaction.
    pub async fn record_sync_failure(&self, id: &IncidentId, message: &str) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;

        let repo = LibSqlIncidentRepository::new(conn);
        let result = async {
            let found = repo.increment_retry_count(id).await?;
            if found {
                repo.update_status(id, SyncStatus::SyncError, Some(message))
                    .await?;
            }
            Ok::<_, Error>(found)
        }
        .await;

        match result {
            Ok(found) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                found_or_not_found(found, id)
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    /// Queue an incident again with a fresh retry budget.
    pub async fn reset_for_retry(&self, id: &IncidentId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        found_or_not_found(repo.reset_for_retry(id).await?, id)
    }

    /// Move every `SYNCING` incident back to `PENDING_SYNC`.
    pub async fn reset_syncing(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.move_status(SyncStatus::Syncing, SyncStatus::PendingSync)
            .await
    }

    /// Number of incidents in a status.
    pub async fn count_by_status(&self, status: SyncStatus) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.count_by_status(status).await
    }

    /// Counts for every status.
    pub async fn stats(&self) -> Result<SyncStats> {
        let db = self.db.lock().await;
        let repo = LibSqlIncidentRepository::new(db.connection());
        repo.stats().await
    }
}

fn found_or_not_found(found: bool, id: &IncidentId) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(Error::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewIncident;

    fn incident(title: &str) -> Incident {
        Incident::from_draft(NewIncident {
            title: title.to_string(),
            incident_type: "vandalism".to_string(),
            district: "Barranco".to_string(),
            ..NewIncident::default()
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_save_and_list_roundtrip() {
        let store = IncidentStore::open_in_memory().await.unwrap();

        store.save(&incident("graffiti")).await.unwrap();
        let incidents = store.list_all().await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].title, "graffiti");
        assert!(store.path().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_sync_failure_counts_and_marks_error() {
        let store = IncidentStore::open_in_memory().await.unwrap();
        let record = incident("broken light");
        store.save(&record).await.unwrap();

        store
            .record_sync_failure(&record.id, "connection reset")
            .await
            .unwrap();

        let fetched = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 1);
        assert_eq!(fetched.sync_status, SyncStatus::SyncError);
        assert_eq!(fetched.sync_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn updates_on_unknown_id_are_not_found() {
        let store = IncidentStore::open_in_memory().await.unwrap();
        let missing = IncidentId::new();

        assert!(matches!(
            store.mark_synced(&missing, "srv").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.record_sync_failure(&missing, "x").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.increment_retry_count(&missing).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("alerta.db");

        let store = IncidentStore::open_path(&db_path).await.unwrap();
        store.save(&incident("pothole")).await.unwrap();
        assert_eq!(store.path(), Some(db_path.as_path()));
        drop(store);

        let reopened = IncidentStore::open_path(&db_path).await.unwrap();
        assert_eq!(reopened.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_syncing_only_touches_syncing_records() {
        let store = IncidentStore::open_in_memory().await.unwrap();
        let stuck = incident("stuck");
        let failed = incident("failed");
        let synced = incident("synced");
        for record in [&stuck, &failed, &synced] {
            store.save(record).await.unwrap();
        }
        store
            .update_status(&stuck.id, SyncStatus::Syncing, None)
            .await
            .unwrap();
        store.record_sync_failure(&failed.id, "500").await.unwrap();
        store.mark_synced(&synced.id, "srv-1").await.unwrap();

        assert_eq!(store.reset_syncing().await.unwrap(), 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.synced, 1);
        assert_eq!(stats.syncing, 0);
        assert_eq!(store.count_by_status(SyncStatus::SyncError).await.unwrap(), 1);
    }
}
