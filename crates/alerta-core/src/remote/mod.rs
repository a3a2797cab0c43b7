//! Remote incident API.
//!
//! The sync manager only talks to the server through [`IncidentApi`], so the
//! HTTP client can be swapped for an in-memory fake in tests.

mod http;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Incident, IncidentId, SyncStatus};
use crate::util::{normalize_text_option, now_millis};

pub use http::HttpIncidentApi;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Incident API is not configured")]
    NotConfigured,
    #[error("Invalid incident API configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Incident API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Incident API error: {0}")]
    Api(String),
    #[error("Invalid incident payload: {0}")]
    InvalidPayload(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Incident endpoints consumed by the sync core
#[async_trait]
pub trait IncidentApi: Send + Sync {
    /// `POST /incidents`
    async fn create_incident(&self, payload: &IncidentPayload) -> RemoteResult<RemoteIncident>;

    /// `GET /incidents`
    async fn list_incidents(&self) -> RemoteResult<Vec<RemoteIncident>>;

    /// `GET /incidents/{id}`; `Ok(None)` when the server does not know the id
    async fn get_incident(&self, server_id: &str) -> RemoteResult<Option<RemoteIncident>>;
}

/// Request body for creating an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPayload {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub location: String,
    pub geolocation: String,
    pub evidence: Vec<String>,
    pub district: String,
    pub author_id: String,
    pub created_at: i64,
}

impl From<&Incident> for IncidentPayload {
    fn from(incident: &Incident) -> Self {
        Self {
            title: incident.title.clone(),
            description: incident.description.clone(),
            incident_type: incident.incident_type.clone(),
            location: incident.location.clone(),
            geolocation: incident.geolocation.clone(),
            evidence: incident.evidence.clone(),
            district: incident.district.clone(),
            author_id: incident.author_id.clone(),
            created_at: incident.created_at,
        }
    }
}

/// Incident as returned by the server
///
/// Decoding is lenient: `id` or Mongo-style `_id` may be a string or a
/// number, null or missing text decodes as empty, and timestamps may be epoch
/// milliseconds or RFC 3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireIncident")]
pub struct RemoteIncident {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub location: String,
    pub geolocation: String,
    pub evidence: Vec<String>,
    pub district: String,
    pub author_id: String,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

/// Raw server shape before normalization
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireIncident {
    id: Value,
    #[serde(rename = "_id")]
    mongo_id: Value,
    title: Value,
    description: Value,
    #[serde(rename = "type")]
    incident_type: Value,
    location: Value,
    geolocation: Value,
    evidence: Value,
    district: Value,
    author_id: Value,
    created_at: Value,
    updated_at: Value,
}

impl From<WireIncident> for RemoteIncident {
    fn from(wire: WireIncident) -> Self {
        Self {
            id: wire_id(&wire.id).or_else(|| wire_id(&wire.mongo_id)),
            title: wire_text(&wire.title),
            description: wire_text(&wire.description),
            incident_type: wire_text(&wire.incident_type),
            location: wire_text(&wire.location),
            geolocation: wire_geolocation(&wire.geolocation),
            evidence: wire_evidence(&wire.evidence),
            district: wire_text(&wire.district),
            author_id: wire_id(&wire.author_id).unwrap_or_default(),
            created_at: wire_timestamp(&wire.created_at),
            updated_at: wire_timestamp(&wire.updated_at),
        }
    }
}

fn wire_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

/// Ids arrive as strings, numbers, or populated `{ "_id": .. }` documents.
fn wire_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(document) => document
            .get("_id")
            .or_else(|| document.get("id"))
            .and_then(wire_id),
        other => normalize_text_option(Some(wire_text(other))),
    }
}

fn wire_geolocation(value: &Value) -> String {
    let Value::Object(point) = value else {
        return wire_text(value);
    };
    let coordinate = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|key| point.get(*key).and_then(Value::as_f64))
    };
    match (
        coordinate(["lat", "latitude"]),
        coordinate(["lng", "longitude"]),
    ) {
        (Some(latitude), Some(longitude)) => format!("{latitude},{longitude}"),
        _ => String::new(),
    }
}

fn wire_evidence(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| normalize_text_option(Some(wire_text(item))))
            .collect(),
        other => normalize_text_option(Some(wire_text(other)))
            .into_iter()
            .collect(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn wire_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|millis| millis as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|datetime| datetime.timestamp_millis())
            })
        }
        _ => None,
    }
}

impl RemoteIncident {
    /// Server-assigned id, ignoring blank values
    #[must_use]
    pub fn server_id(&self) -> Option<String> {
        normalize_text_option(self.id.clone())
    }

    /// Copy the server's content fields onto a local record.
    ///
    /// Sync bookkeeping (retry count, last attempt, error) is left alone.
    pub fn apply_to(&self, incident: &mut Incident) {
        if let Some(server_id) = self.server_id() {
            incident.server_id = Some(server_id);
        }
        incident.title.clone_from(&self.title);
        incident.description.clone_from(&self.description);
        incident.incident_type.clone_from(&self.incident_type);
        incident.location.clone_from(&self.location);
        incident.geolocation.clone_from(&self.geolocation);
        incident.evidence.clone_from(&self.evidence);
        incident.district.clone_from(&self.district);
        incident.author_id.clone_from(&self.author_id);
        incident.sync_status = SyncStatus::Synced;
        if let Some(updated_at) = self.updated_at {
            incident.updated_at = updated_at;
        }
    }

    /// Build a new local record for an incident first seen on the server
    #[must_use]
    pub fn to_local(&self) -> Incident {
        let now = now_millis();
        let created_at = self.created_at.unwrap_or(now);
        let mut incident = Incident {
            id: IncidentId::new(),
            server_id: None,
            title: String::new(),
            description: String::new(),
            incident_type: String::new(),
            location: String::new(),
            geolocation: String::new(),
            evidence: Vec::new(),
            district: String::new(),
            author_id: String::new(),
            sync_status: SyncStatus::Synced,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            retry_count: 0,
            last_sync_attempt: None,
            sync_error: None,
        };
        self.apply_to(&mut incident);
        incident
    }
}

/// Stand-in used when no API base URL is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredIncidentApi;

#[async_trait]
impl IncidentApi for UnconfiguredIncidentApi {
    async fn create_incident(&self, _payload: &IncidentPayload) -> RemoteResult<RemoteIncident> {
        Err(RemoteError::NotConfigured)
    }

    async fn list_incidents(&self) -> RemoteResult<Vec<RemoteIncident>> {
        Err(RemoteError::NotConfigured)
    }

    async fn get_incident(&self, _server_id: &str) -> RemoteResult<Option<RemoteIncident>> {
        Err(RemoteError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewIncident;

    #[test]
    fn payload_uses_wire_field_names() {
        let incident = Incident::from_draft(NewIncident {
            title: "Choque".to_string(),
            incident_type: "accident".to_string(),
            author_id: "user-7".to_string(),
            ..NewIncident::default()
        });
        let json = serde_json::to_value(IncidentPayload::from(&incident)).unwrap();

        assert_eq!(json["type"], "accident");
        assert_eq!(json["authorId"], "user-7");
        assert_eq!(json["createdAt"], incident.created_at);
        assert!(json.get("incident_type").is_none());
    }

    #[test]
    fn remote_incident_accepts_mongo_style_id() {
        let remote: RemoteIncident =
            serde_json::from_str(r#"{"_id": "64f0", "title": "Robo", "type": "robbery"}"#)
                .unwrap();
        assert_eq!(remote.server_id().as_deref(), Some("64f0"));
        assert_eq!(remote.incident_type, "robbery");
        assert!(remote.evidence.is_empty());
    }

    #[test]
    fn remote_incident_prefers_id_over_mongo_id() {
        let remote: RemoteIncident =
            serde_json::from_str(r#"{"_id": "64f0", "id": "srv-1", "title": "Robo"}"#).unwrap();
        assert_eq!(remote.server_id().as_deref(), Some("srv-1"));

        let remote: RemoteIncident =
            serde_json::from_str(r#"{"_id": "64f0", "id": "  ", "title": "Robo"}"#).unwrap();
        assert_eq!(remote.server_id().as_deref(), Some("64f0"));
    }

    #[test]
    fn remote_incident_accepts_numeric_id() {
        let remote: RemoteIncident = serde_json::from_str(r#"{"id": 42, "title": "Robo"}"#).unwrap();
        assert_eq!(remote.server_id().as_deref(), Some("42"));
    }

    #[test]
    fn remote_incident_accepts_iso_timestamps() {
        let remote: RemoteIncident = serde_json::from_str(
            r#"{"_id": "64f0", "createdAt": "2024-05-01T12:00:00.000Z", "updatedAt": 1714565000000}"#,
        )
        .unwrap();
        assert_eq!(remote.created_at, Some(1_714_564_800_000));
        assert_eq!(remote.updated_at, Some(1_714_565_000_000));

        let remote: RemoteIncident =
            serde_json::from_str(r#"{"_id": "64f0", "createdAt": "yesterday"}"#).unwrap();
        assert_eq!(remote.created_at, None);
    }

    #[test]
    fn remote_incident_tolerates_null_fields() {
        let remote: RemoteIncident = serde_json::from_str(
            r#"{
                "_id": "64f0",
                "title": "Robo",
                "description": null,
                "location": null,
                "district": null,
                "evidence": null,
                "authorId": {"_id": "user-7", "name": "Ana"},
                "geolocation": {"lat": -12.1, "lng": -77.03}
            }"#,
        )
        .unwrap();
        assert_eq!(remote.description, "");
        assert_eq!(remote.location, "");
        assert_eq!(remote.district, "");
        assert!(remote.evidence.is_empty());
        assert_eq!(remote.author_id, "user-7");
        assert_eq!(remote.geolocation, "-12.1,-77.03");
    }

    #[test]
    fn blank_server_id_is_treated_as_missing() {
        let remote = RemoteIncident {
            id: Some("  ".to_string()),
            ..RemoteIncident::default()
        };
        assert_eq!(remote.server_id(), None);
    }

    #[test]
    fn apply_to_keeps_sync_bookkeeping() {
        let mut local = Incident::from_draft(NewIncident {
            title: "old".to_string(),
            incident_type: "noise".to_string(),
            ..NewIncident::default()
        });
        local.server_id = Some("srv-3".to_string());
        local.retry_count = 2;

        let remote = RemoteIncident {
            id: Some("srv-3".to_string()),
            title: "new".to_string(),
            incident_type: "noise".to_string(),
            updated_at: Some(42),
            ..RemoteIncident::default()
        };
        remote.apply_to(&mut local);

        assert_eq!(local.title, "new");
        assert_eq!(local.retry_count, 2);
        assert_eq!(local.updated_at, 42);
        assert_eq!(local.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn to_local_creates_synced_record() {
        let remote = RemoteIncident {
            id: Some("srv-8".to_string()),
            title: "Fire".to_string(),
            created_at: Some(1_000),
            ..RemoteIncident::default()
        };
        let local = remote.to_local();

        assert_eq!(local.server_id.as_deref(), Some("srv-8"));
        assert_eq!(local.sync_status, SyncStatus::Synced);
        assert_eq!(local.created_at, 1_000);
        assert_eq!(local.updated_at, 1_000);
    }
}
