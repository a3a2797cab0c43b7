//! Data models for Alerta360

mod incident;
mod sync_stats;
mod sync_status;

pub use incident::{parse_geolocation, Incident, IncidentId, NewIncident};
pub use sync_stats::SyncStats;
pub use sync_status::SyncStatus;
