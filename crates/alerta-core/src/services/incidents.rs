//! Offline-first incident access for client apps.

use std::sync::Arc;

use crate::models::{Incident, IncidentId, NewIncident};
use crate::remote::IncidentApi;
use crate::sync::{SyncManager, SyncOutcome};
use crate::Result;

use super::IncidentStore;

/// Reads and writes go to the local store first; the server is consulted
/// only when the device is online, and never makes a call fail.
#[derive(Clone)]
pub struct IncidentService {
    sync: SyncManager,
}

impl IncidentService {
    pub const fn new(sync: SyncManager) -> Self {
        Self { sync }
    }

    pub const fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    fn store(&self) -> &IncidentStore {
        self.sync.store()
    }

    fn api(&self) -> &Arc<dyn IncidentApi> {
        self.sync.api()
    }

    /// Store a new report and, when online, try to push it right away.
    ///
    /// The returned record is the synced one when the push succeeded and the
    /// local one otherwise (still `PENDING_SYNC`, or `SYNC_ERROR` after a
    /// failed attempt).
    pub async fn create_incident(&self, draft: NewIncident) -> Result<Incident> {
        draft.validate()?;

        let incident = Incident::from_draft(draft);
        self.store().save(&incident).await?;
        tracing::info!("Reported incident {}", incident.id);

        if self.sync.is_online() {
            match self.sync.sync_single_incident(&incident.id).await {
                SyncOutcome::Success(_) => {}
                outcome => tracing::debug!(
                    "Immediate sync of incident {} did not complete: {}",
                    incident.id,
                    outcome
                ),
            }
        }

        Ok(self
            .store()
            .get(&incident.id)
            .await?
            .unwrap_or(incident))
    }

    /// All incidents, newest first, refreshed from the server when possible.
    pub async fn get_all_incidents(&self) -> Result<Vec<Incident>> {
        let local = self.store().list_all().await?;
        if !self.sync.is_online() {
            return Ok(local);
        }

        match self.refresh_from_remote().await {
            Ok(refreshed) => Ok(refreshed),
            Err(error) => {
                tracing::warn!("Could not refresh incidents from server: {}", error);
                Ok(local)
            }
        }
    }

    /// Look an incident up by server id, then by local id, then on the server.
    ///
    /// An incident found only on the server is cached locally as `SYNCED`.
    pub async fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        if let Some(incident) = self.store().get_by_server_id(id).await? {
            return Ok(Some(incident));
        }

        if let Ok(local_id) = id.parse::<IncidentId>() {
            if let Some(incident) = self.store().get(&local_id).await? {
                return Ok(Some(incident));
            }
        }

        if !self.sync.is_online() {
            return Ok(None);
        }

        let remote = match self.api().get_incident(id).await {
            Ok(Some(remote)) => remote,
            Ok(None) => return Ok(None),
            Err(error) => {
                tracing::warn!("Could not fetch incident {} from server: {}", id, error);
                return Ok(None);
            }
        };

        let mut incident = remote.to_local();
        if incident.server_id.is_none() {
            incident.server_id = Some(id.to_string());
        }
        self.store().save(&incident).await?;
        tracing::debug!("Cached server incident {} as {}", id, incident.id);
        Ok(Some(incident))
    }

    /// Incidents reported in a district (case-insensitive), newest first.
    pub async fn list_by_district(&self, district: &str) -> Result<Vec<Incident>> {
        self.store().list_by_district(district.trim()).await
    }

    async fn refresh_from_remote(&self) -> Result<Vec<Incident>> {
        let remote = self.api().list_incidents().await?;

        let mut updated = 0;
        let mut inserted = 0;
        for item in remote {
            let Some(server_id) = item.server_id() else {
                tracing::debug!("Ignoring server incident without an id");
                continue;
            };

            if let Some(mut existing) = self.store().get_by_server_id(&server_id).await? {
                item.apply_to(&mut existing);
                self.store().save(&existing).await?;
                updated += 1;
            } else {
                self.store().save(&item.to_local()).await?;
                inserted += 1;
            }
        }

        tracing::debug!(
            "Merged server incidents: {} updated, {} new",
            updated,
            inserted
        );
        self.store().list_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use crate::network::ConnectivityWatch;
    use crate::remote::{IncidentPayload, RemoteError, RemoteIncident, RemoteResult};
    use crate::Error;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        remote: Vec<RemoteIncident>,
        unavailable: bool,
        creates: AtomicUsize,
        lists: AtomicUsize,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl IncidentApi for FakeApi {
        async fn create_incident(&self, payload: &IncidentPayload) -> RemoteResult<RemoteIncident> {
            let call = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
            if self.unavailable {
                return Err(RemoteError::Api("503 Service Unavailable".to_string()));
            }
            Ok(RemoteIncident {
                id: Some(format!("srv-new-{call}")),
                title: payload.title.clone(),
                ..RemoteIncident::default()
            })
        }

        async fn list_incidents(&self) -> RemoteResult<Vec<RemoteIncident>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(RemoteError::Api("503 Service Unavailable".to_string()));
            }
            Ok(self.remote.clone())
        }

        async fn get_incident(&self, server_id: &str) -> RemoteResult<Option<RemoteIncident>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(RemoteError::Api("503 Service Unavailable".to_string()));
            }
            Ok(self
                .remote
                .iter()
                .find(|item| item.id.as_deref() == Some(server_id))
                .cloned())
        }
    }

    async fn service(api: FakeApi, online: bool) -> (IncidentService, Arc<FakeApi>) {
        let store = IncidentStore::open_in_memory().await.unwrap();
        let api = Arc::new(api);
        let network = Arc::new(ConnectivityWatch::new(online));
        let manager = SyncManager::new(store, api.clone(), network);
        (IncidentService::new(manager), api)
    }

    fn draft(title: &str, district: &str) -> NewIncident {
        NewIncident {
            title: title.to_string(),
            incident_type: "robbery".to_string(),
            district: district.to_string(),
            geolocation: "-12.0464,-77.0428".to_string(),
            ..NewIncident::default()
        }
    }

    fn remote(id: &str, title: &str) -> RemoteIncident {
        RemoteIncident {
            id: Some(id.to_string()),
            title: title.to_string(),
            incident_type: "robbery".to_string(),
            district: "Miraflores".to_string(),
            created_at: Some(1_700_000_000_000),
            ..RemoteIncident::default()
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn create_offline_is_pending_without_server_id() {
        let (service, api) = service(FakeApi::default(), false).await;

        let incident = service
            .create_incident(draft("Robo de celular", "Lince"))
            .await
            .unwrap();

        assert_eq!(incident.sync_status, SyncStatus::PendingSync);
        assert_eq!(incident.server_id, None);
        assert_eq!(api.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn create_online_returns_synced_record() {
        let (service, api) = service(FakeApi::default(), true).await;

        let incident = service
            .create_incident(draft("Robo de celular", "Lince"))
            .await
            .unwrap();

        assert_eq!(incident.sync_status, SyncStatus::Synced);
        assert_eq!(incident.server_id.as_deref(), Some("srv-new-1"));
        assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn create_online_failure_returns_local_record() {
        let api = FakeApi {
            unavailable: true,
            ..FakeApi::default()
        };
        let (service, _) = service(api, true).await;

        let incident = service
            .create_incident(draft("Asalto", "Surco"))
            .await
            .unwrap();

        assert_eq!(incident.sync_status, SyncStatus::SyncError);
        assert_eq!(incident.retry_count, 1);
        assert_eq!(incident.server_id, None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn create_rejects_invalid_draft() {
        let (service, _) = service(FakeApi::default(), false).await;

        let result = service.create_incident(draft("  ", "Lince")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(service.store().list_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_all_merges_known_and_new_server_records() {
        let api = FakeApi {
            remote: vec![
                remote("srv-1", "Updated on server"),
                remote("srv-2", "Reported elsewhere"),
                RemoteIncident {
                    id: None,
                    title: "no id".to_string(),
                    ..RemoteIncident::default()
                },
            ],
            ..FakeApi::default()
        };
        let (service, _) = service(api, true).await;

        let mut known = Incident::from_draft(draft("Original", "Miraflores"));
        known.server_id = Some("srv-1".to_string());
        known.sync_status = SyncStatus::Synced;
        known.retry_count = 2;
        service.store().save(&known).await.unwrap();

        let pending = Incident::from_draft(draft("Local only", "Lince"));
        service.store().save(&pending).await.unwrap();

        let all = service.get_all_incidents().await.unwrap();
        assert_eq!(all.len(), 3);

        let merged = all.iter().find(|i| i.id == known.id).unwrap();
        assert_eq!(merged.title, "Updated on server");
        assert_eq!(merged.retry_count, 2);

        let new = all
            .iter()
            .find(|i| i.server_id.as_deref() == Some("srv-2"))
            .unwrap();
        assert_eq!(new.sync_status, SyncStatus::Synced);
        assert_eq!(new.title, "Reported elsewhere");

        let untouched = all.iter().find(|i| i.id == pending.id).unwrap();
        assert_eq!(untouched.sync_status, SyncStatus::PendingSync);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_all_falls_back_to_local_on_remote_error() {
        let api = FakeApi {
            unavailable: true,
            ..FakeApi::default()
        };
        let (service, api) = service(api, true).await;
        let local = Incident::from_draft(draft("Local only", "Lince"));
        service.store().save(&local).await.unwrap();

        let all = service.get_all_incidents().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, local.id);
        assert_eq!(api.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_all_offline_skips_server() {
        let (service, api) = service(FakeApi::default(), false).await;

        assert!(service.get_all_incidents().await.unwrap().is_empty());
        assert_eq!(api.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_incident_prefers_server_id_then_local_id() {
        let (service, api) = service(FakeApi::default(), true).await;

        let mut synced = Incident::from_draft(draft("Synced", "Lince"));
        synced.server_id = Some("srv-9".to_string());
        synced.sync_status = SyncStatus::Synced;
        service.store().save(&synced).await.unwrap();
        let local = Incident::from_draft(draft("Local", "Lince"));
        service.store().save(&local).await.unwrap();

        let by_server = service.get_incident("srv-9").await.unwrap().unwrap();
        assert_eq!(by_server.id, synced.id);

        let by_local = service
            .get_incident(&local.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_local.id, local.id);
        assert_eq!(api.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_incident_fetches_and_caches_server_record() {
        let api = FakeApi {
            remote: vec![remote("srv-5", "Only on server")],
            ..FakeApi::default()
        };
        let (service, api) = service(api, true).await;

        let fetched = service.get_incident("srv-5").await.unwrap().unwrap();
        assert_eq!(fetched.title, "Only on server");
        assert_eq!(fetched.sync_status, SyncStatus::Synced);

        let cached = service.get_incident("srv-5").await.unwrap().unwrap();
        assert_eq!(cached.id, fetched.id);
        assert_eq!(api.lookups.load(Ordering::SeqCst), 1);

        assert_eq!(service.get_incident("srv-404").await.unwrap(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_incident_offline_misses_without_network_call() {
        let (service, api) = service(FakeApi::default(), false).await;

        assert_eq!(service.get_incident("srv-1").await.unwrap(), None);
        assert_eq!(api.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn list_by_district_filters_locally() {
        let (service, _) = service(FakeApi::default(), false).await;
        service
            .create_incident(draft("One", "Miraflores"))
            .await
            .unwrap();
        service.create_incident(draft("Two", "Lince")).await.unwrap();

        let found = service.list_by_district(" miraflores ").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "One");
    }
}
