//! Incident model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::SyncStatus;
use crate::error::{Error, Result};
use crate::util::{normalize_text_option, now_millis};

/// Local identifier for an incident, using UUID v7 (time-sortable)
///
/// Generated on the device when the incident is reported and never changes,
/// even after the server assigns its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(Uuid);

impl IncidentId {
    /// Create a new unique incident ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IncidentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// User-entered fields of an incident report, before it is stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub incident_type: String,
    pub location: String,
    /// `"lat,lng"`; empty when the device had no fix
    pub geolocation: String,
    pub evidence: Vec<String>,
    pub district: String,
    pub author_id: String,
}

impl NewIncident {
    /// Check the draft before it is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("incident title cannot be empty".into()));
        }
        if self.incident_type.trim().is_empty() {
            return Err(Error::InvalidInput("incident type cannot be empty".into()));
        }
        if !self.geolocation.trim().is_empty() && parse_geolocation(&self.geolocation).is_none() {
            return Err(Error::InvalidInput(format!(
                "geolocation must look like 'lat,lng', got '{}'",
                self.geolocation.trim()
            )));
        }
        if self.evidence.iter().any(|uri| uri.trim().is_empty()) {
            return Err(Error::InvalidInput("evidence URIs cannot be blank".into()));
        }
        Ok(())
    }
}

/// An incident as stored on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Client-generated identifier
    pub id: IncidentId,
    /// Identifier assigned by the server on first successful sync
    pub server_id: Option<String>,
    pub title: String,
    pub description: String,
    pub incident_type: String,
    pub location: String,
    pub geolocation: String,
    /// Evidence URIs (photos, videos)
    pub evidence: Vec<String>,
    pub district: String,
    pub author_id: String,
    pub sync_status: SyncStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Failed push attempts so far
    pub retry_count: u32,
    /// Last push attempt (Unix ms)
    pub last_sync_attempt: Option<i64>,
    /// Message from the last failed push
    pub sync_error: Option<String>,
}

impl Incident {
    /// Build a pending incident from a draft with a fresh local id
    #[must_use]
    pub fn from_draft(draft: NewIncident) -> Self {
        let now = now_millis();
        Self {
            id: IncidentId::new(),
            server_id: None,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            incident_type: draft.incident_type.trim().to_string(),
            location: draft.location.trim().to_string(),
            geolocation: draft.geolocation.trim().to_string(),
            evidence: draft
                .evidence
                .into_iter()
                .map(|uri| uri.trim().to_string())
                .collect(),
            district: draft.district.trim().to_string(),
            author_id: draft.author_id.trim().to_string(),
            sync_status: SyncStatus::PendingSync,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            last_sync_attempt: None,
            sync_error: None,
        }
    }

    /// Whether the server has accepted this incident at least once
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.server_id.is_some()
    }

    /// Parsed `(latitude, longitude)` if the geolocation is well formed
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        parse_geolocation(&self.geolocation)
    }

    /// Server id when known, otherwise the local id
    #[must_use]
    pub fn display_id(&self) -> String {
        normalize_text_option(self.server_id.clone()).unwrap_or_else(|| self.id.to_string())
    }
}

/// Parse a `"lat,lng"` geocoordinate string
///
/// # Examples
///
/// ```
/// use alerta_core::models::parse_geolocation;
///
/// assert_eq!(parse_geolocation("-12.0464, -77.0428"), Some((-12.0464, -77.0428)));
/// assert_eq!(parse_geolocation("somewhere"), None);
/// ```
#[must_use]
pub fn parse_geolocation(value: &str) -> Option<(f64, f64)> {
    let re = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$")
        .expect("Invalid regex");
    let caps = re.captures(value)?;
    let lat: f64 = caps[1].parse().ok()?;
    let lng: f64 = caps[2].parse().ok()?;
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) {
        Some((lat, lng))
    } else {
        None
    }
}
