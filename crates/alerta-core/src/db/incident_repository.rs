//! Incident repository implementation

use crate::error::{Error, Result};
use crate::models::{Incident, IncidentId, SyncStats, SyncStatus};
use crate::util::now_millis;
use libsql::{params, Connection, Row, Value};

const INCIDENT_COLUMNS: &str = "local_id, server_id, title, description, incident_type, location,
     geolocation, evidence, district, author_id, sync_status, created_at, updated_at,
     retry_count, last_sync_attempt, sync_error";

/// Trait for incident storage operations (async)
#[allow(async_fn_in_trait)]
pub trait IncidentRepository {
    /// Insert a record, replacing any row with the same local id
    async fn upsert(&self, incident: &Incident) -> Result<()>;

    /// Get an incident by local id
    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>>;

    /// Get an incident by the id the server assigned
    async fn get_by_server_id(&self, server_id: &str) -> Result<Option<Incident>>;

    /// List all incidents, newest first
    async fn list(&self) -> Result<Vec<Incident>>;

    /// List incidents whose status is one of `statuses`
    async fn list_by_statuses(&self, statuses: &[SyncStatus]) -> Result<Vec<Incident>>;

    /// List incidents reported in a district (case-insensitive)
    async fn list_by_district(&self, district: &str) -> Result<Vec<Incident>>;

    /// Set the sync status and error message; returns false when the id is unknown
    async fn update_status(
        &self,
        id: &IncidentId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<bool>;

    /// Record the server id and mark the incident synced in one statement
    async fn mark_synced(&self, id: &IncidentId, server_id: &str) -> Result<bool>;

    /// Bump the retry counter and the last attempt timestamp
    async fn increment_retry_count(&self, id: &IncidentId) -> Result<bool>;

    /// Put an incident back in the queue with a fresh retry budget
    async fn reset_for_retry(&self, id: &IncidentId) -> Result<bool>;

    /// Move every record in `from` to `to`, returning how many changed
    async fn move_status(&self, from: SyncStatus, to: SyncStatus) -> Result<usize>;

    /// Count incidents with the given status
    async fn count_by_status(&self, status: SyncStatus) -> Result<usize>;

    /// Count incidents for every status
    async fn stats(&self) -> Result<SyncStats>;
}

/// libSQL implementation of `IncidentRepository`
pub struct LibSqlIncidentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlIncidentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_incidents(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Incident>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(Self::parse_incident(&row)?);
        }
        Ok(incidents)
    }

    /// Parse an incident from a database row
    fn parse_incident(row: &Row) -> Result<Incident> {
        let local_id: String = row.get(0)?;
        let evidence_json: String = row.get(7)?;
        let status: String = row.get(10)?;
        let retry_count: i64 = row.get(13)?;

        Ok(Incident {
            id: local_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid incident id '{local_id}'")))?,
            server_id: optional_text(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            incident_type: row.get(4)?,
            location: row.get(5)?,
            geolocation: row.get(6)?,
            evidence: serde_json::from_str(&evidence_json)?,
            district: row.get(8)?,
            author_id: row.get(9)?,
            sync_status: status.parse().map_err(Error::Database)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_sync_attempt: optional_integer(row, 14)?,
            sync_error: optional_text(row, 15)?,
        })
    }
}

impl IncidentRepository for LibSqlIncidentRepository<'_> {
    async fn upsert(&self, incident: &Incident) -> Result<()> {
        let evidence = serde_json::to_string(&incident.evidence)?;

        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO incidents ({INCIDENT_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    incident.id.as_str(),
                    text_value(incident.server_id.as_deref()),
                    incident.title.clone(),
                    incident.description.clone(),
                    incident.incident_type.clone(),
                    incident.location.clone(),
                    incident.geolocation.clone(),
                    evidence,
                    incident.district.clone(),
                    incident.author_id.clone(),
                    incident.sync_status.as_str(),
                    incident.created_at,
                    incident.updated_at,
                    i64::from(incident.retry_count),
                    incident
                        .last_sync_attempt
                        .map_or(Value::Null, Value::Integer),
                    text_value(incident.sync_error.as_deref()),
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &IncidentId) -> Result<Option<Incident>> {
        let incidents = self
            .query_incidents(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE local_id = ?"),
                params![id.as_str()],
            )
            .await?;
        Ok(incidents.into_iter().next())
    }

    async fn get_by_server_id(&self, server_id: &str) -> Result<Option<Incident>> {
        let incidents = self
            .query_incidents(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE server_id = ?"),
                params![server_id],
            )
            .await?;
        Ok(incidents.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<Incident>> {
        self.query_incidents(
            &format!("SELECT {INCIDENT_COLUMNS} FROM incidents ORDER BY created_at DESC"),
            (),
        )
        .await
    }

    async fn list_by_statuses(&self, statuses: &[SyncStatus]) -> Result<Vec<Incident>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let status_list = serde_json::to_string(
            &statuses
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>(),
        )?;

        self.query_incidents(
            &format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents
                 WHERE sync_status IN (SELECT value FROM json_each(?))
                 ORDER BY created_at ASC"
            ),
            params![status_list],
        )
        .await
    }

    async fn list_by_district(&self, district: &str) -> Result<Vec<Incident>> {
        self.query_incidents(
            &format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents
                 WHERE district = ? COLLATE NOCASE
                 ORDER BY created_at DESC"
            ),
            params![district.trim()],
        )
        .await
    }

    async fn update_status(
        &self,
        id: &IncidentId,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let now = now_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE incidents SET sync_status = ?, sync_error = ?, updated_at = ? WHERE local_id = ?",
                params![status.as_str(), text_value(error), now, id.as_str()],
            )
            .await?;

        Ok(rows > 0)
    }

    async fn mark_synced(&self, id: &IncidentId, server_id: &str) -> Result<bool> {
        let now = now_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE incidents
                 SET server_id = ?, sync_status = ?, sync_error = NULL, updated_at = ?
                 WHERE local_id = ?",
                params![server_id, SyncStatus::Synced.as_str(), now, id.as_str()],
            )
            .await?;

        Ok(rows > 0)
    }

    async fn increment_retry_count(&self, id: &IncidentId) -> Result<bool> {
        let now = now_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE incidents
                 SET retry_count = retry_count + 1, last_sync_attempt = ?
                 WHERE local_id = ?",
                params![now, id.as_str()],
            )
            .await?;

        Ok(rows > 0)
    }

    async fn reset_for_retry(&self, id: &IncidentId) -> Result<bool> {
        let now = now_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE incidents
                 SET sync_status = ?, retry_count = 0, sync_error = NULL, updated_at = ?
                 WHERE local_id = ?",
                params![SyncStatus::PendingSync.as_str(), now, id.as_str()],
            )
            .await?;

        Ok(rows > 0)
    }

    async fn move_status(&self, from: SyncStatus, to: SyncStatus) -> Result<usize> {
        let now = now_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE incidents SET sync_status = ?, updated_at = ? WHERE sync_status = ?",
                params![to.as_str(), now, from.as_str()],
            )
            .await?;

        Ok(usize::try_from(rows).unwrap_or(usize::MAX))
    }

    async fn count_by_status(&self, status: SyncStatus) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM incidents WHERE sync_status = ?",
                params![status.as_str()],
            )
            .await?;

        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };

        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn stats(&self) -> Result<SyncStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT sync_status, COUNT(*) FROM incidents GROUP BY sync_status",
                (),
            )
            .await?;

        let mut stats = SyncStats::default();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match status.parse::<SyncStatus>() {
                Ok(status) => stats.add(status, usize::try_from(count).unwrap_or_default()),
                Err(error) => tracing::warn!("Skipping unknown status in stats: {}", error),
            }
        }

        Ok(stats)
    }
}

fn text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "Expected text in column {idx}, found {other:?}"
        ))),
    }
}

fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "Expected integer in column {idx}, found {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NewIncident;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn incident(title: &str) -> Incident {
        Incident::from_draft(NewIncident {
            title: title.to_string(),
            description: "Reported from the corner store".to_string(),
            incident_type: "robbery".to_string(),
            location: "Jr. Junin 300".to_string(),
            geolocation: "-12.05,-77.03".to_string(),
            evidence: vec![
                "content://media/photo/1".to_string(),
                "content://media/photo/2".to_string(),
            ],
            district: "Cercado".to_string(),
            author_id: "user-1".to_string(),
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_get_roundtrip() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        let original = incident("Phone snatched");
        repo.upsert(&original).await.unwrap();

        let fetched = repo.get(&original.id).await.unwrap().unwrap();
        assert_eq!(fetched, original);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_replaces_existing_row() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        let mut record = incident("Original");
        repo.upsert(&record).await.unwrap();
        record.title = "Edited".to_string();
        repo.upsert(&record).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Edited");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_returns_none() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        assert!(repo.get(&IncidentId::new()).await.unwrap().is_none());
        assert!(repo.get_by_server_id("srv-x").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_sets_server_id_and_status() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        let record = incident("Fight");
        repo.upsert(&record).await.unwrap();
        repo.update_status(&record.id, SyncStatus::SyncError, Some("timeout"))
            .await
            .unwrap();
        assert!(repo.mark_synced(&record.id, "srv-1").await.unwrap());

        let fetched = repo.get_by_server_id("srv-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
        assert_eq!(fetched.sync_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_statuses_filters() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        let pending = incident("pending");
        let failed = incident("failed");
        let synced = incident("synced");
        for record in [&pending, &failed, &synced] {
            repo.upsert(record).await.unwrap();
        }
        repo.update_status(&failed.id, SyncStatus::SyncError, Some("boom"))
            .await
            .unwrap();
        repo.mark_synced(&synced.id, "srv-2").await.unwrap();

        let selected = repo
            .list_by_statuses(&[SyncStatus::PendingSync, SyncStatus::SyncError])
            .await
            .unwrap();
        let mut titles = selected
            .iter()
            .map(|record| record.title.as_str())
            .collect::<Vec<_>>();
        titles.sort_unstable();
        assert_eq!(titles, vec!["failed", "pending"]);

        assert!(repo.list_by_statuses(&[]).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_increment_retry_count_and_reset() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        let record = incident("retry me");
        repo.upsert(&record).await.unwrap();
        repo.increment_retry_count(&record.id).await.unwrap();
        repo.increment_retry_count(&record.id).await.unwrap();
        repo.update_status(&record.id, SyncStatus::SyncError, Some("503"))
            .await
            .unwrap();

        let fetched = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 2);
        assert!(fetched.last_sync_attempt.is_some());
        assert_eq!(fetched.sync_error.as_deref(), Some("503"));

        repo.reset_for_retry(&record.id).await.unwrap();
        let fetched = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 0);
        assert_eq!(fetched.sync_status, SyncStatus::PendingSync);
        assert_eq!(fetched.sync_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_status_and_counts() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        let stuck = incident("stuck");
        let other = incident("other");
        repo.upsert(&stuck).await.unwrap();
        repo.upsert(&other).await.unwrap();
        repo.update_status(&stuck.id, SyncStatus::Syncing, None)
            .await
            .unwrap();

        assert_eq!(repo.count_by_status(SyncStatus::Syncing).await.unwrap(), 1);
        let moved = repo
            .move_status(SyncStatus::Syncing, SyncStatus::PendingSync)
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.syncing, 0);
        assert_eq!(stats.total(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_district_ignores_case() {
        let db = setup().await;
        let repo = LibSqlIncidentRepository::new(db.connection());

        repo.upsert(&incident("one")).await.unwrap();
        let mut elsewhere = incident("two");
        elsewhere.district = "Miraflores".to_string();
        repo.upsert(&elsewhere).await.unwrap();

        let found = repo.list_by_district("cercado").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "one");
    }
}
