use std::path::Path;
use std::sync::Arc;

use alerta_core::config::ClientConfig;
use alerta_core::network::{ConnectivityWatch, ProbeHandle, ReachabilityProbe};
use alerta_core::remote::{HttpIncidentApi, IncidentApi, UnconfiguredIncidentApi};
use alerta_core::services::{IncidentService, IncidentStore};
use alerta_core::sync::{SyncManager, SyncOutcome, SyncScheduler};
use alerta_core::{Incident, IncidentId, SyncStats, SyncStatus};
use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::error::CliError;
use crate::notifier::ConsoleNotifier;

/// Everything a command needs, wired from the client config
pub struct AppContext {
    pub config: ClientConfig,
    pub service: IncidentService,
    pub connectivity: ConnectivityWatch,
    _probe: Option<ProbeHandle>,
}

impl AppContext {
    /// Open the store, build the API client, and take a first connectivity reading.
    pub async fn open(config: ClientConfig, db_path: &Path) -> Result<Self, CliError> {
        let store = IncidentStore::open_path(db_path).await?;
        let connectivity = ConnectivityWatch::new(false);

        let Some(base_url) = config.api_base_url().map(str::to_string) else {
            tracing::info!("No API base URL configured; incidents stay queued locally");
            return Ok(Self::from_parts(
                config,
                store,
                Arc::new(UnconfiguredIncidentApi),
                connectivity,
                None,
            ));
        };

        let api = HttpIncidentApi::new(&base_url, Some(config.http_timeout()))?;
        let probe = ReachabilityProbe::new(
            api.base_url(),
            config.probe_interval(),
            config.http_timeout(),
        )?;
        if !probe.check(&connectivity).await {
            tracing::warn!("{} is unreachable; working offline", base_url);
        }

        let probe = probe.start(connectivity.clone());
        Ok(Self::from_parts(
            config,
            store,
            Arc::new(api),
            connectivity,
            Some(probe),
        ))
    }

    pub fn from_parts(
        config: ClientConfig,
        store: IncidentStore,
        api: Arc<dyn IncidentApi>,
        connectivity: ConnectivityWatch,
        probe: Option<ProbeHandle>,
    ) -> Self {
        let manager = SyncManager::new(store, api, Arc::new(connectivity.clone()));
        Self {
            config,
            service: IncidentService::new(manager),
            connectivity,
            _probe: probe,
        }
    }

    pub const fn manager(&self) -> &SyncManager {
        self.service.sync_manager()
    }

    pub fn scheduler(&self) -> SyncScheduler {
        SyncScheduler::new(self.manager().clone(), Arc::new(ConsoleNotifier))
    }
}

#[derive(Debug, Serialize)]
pub struct IncidentListItem {
    pub id: String,
    pub server_id: Option<String>,
    pub title: String,
    pub incident_type: String,
    pub district: String,
    pub status: String,
    pub created_at: i64,
    pub relative_time: String,
    pub retry_count: u32,
    pub sync_error: Option<String>,
}

pub fn incident_to_list_item(incident: &Incident) -> IncidentListItem {
    let now_ms = Utc::now().timestamp_millis();
    IncidentListItem {
        id: incident.id.to_string(),
        server_id: incident.server_id.clone(),
        title: incident.title.clone(),
        incident_type: incident.incident_type.clone(),
        district: incident.district.clone(),
        status: incident.sync_status.to_string(),
        created_at: incident.created_at,
        relative_time: format_relative_time(incident.created_at, now_ms),
        retry_count: incident.retry_count,
        sync_error: incident.sync_error.clone(),
    }
}

pub fn format_incident_lines(incidents: &[Incident]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    incidents
        .iter()
        .map(|incident| {
            let id = incident.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let relative_time = format_relative_time(incident.created_at, now_ms);
            let place = if incident.district.is_empty() {
                incident.incident_type.clone()
            } else {
                format!("{}, {}", incident.incident_type, incident.district)
            };

            format!(
                "{short_id}  {:<12}  {} ({place})  {relative_time}",
                incident.sync_status.as_str(),
                incident.title
            )
        })
        .collect()
}

pub fn format_incident_details(incident: &Incident) -> Vec<String> {
    let mut lines = vec![
        format!("ID:          {}", incident.id),
        format!(
            "Server ID:   {}",
            incident.server_id.as_deref().unwrap_or("-")
        ),
        format!("Title:       {}", incident.title),
        format!("Type:        {}", incident.incident_type),
        format!("Status:      {}", incident.sync_status),
        format!("Reported:    {}", format_timestamp(incident.created_at)),
    ];

    for (label, value) in [
        ("Description", &incident.description),
        ("Location", &incident.location),
        ("District", &incident.district),
        ("Author", &incident.author_id),
    ] {
        if !value.is_empty() {
            lines.push(format!("{:<13}{value}", format!("{label}:")));
        }
    }

    if let Some((latitude, longitude)) = incident.coordinates() {
        lines.push(format!("Coordinates: {latitude}, {longitude}"));
    }

    for uri in &incident.evidence {
        lines.push(format!("Evidence:    {uri}"));
    }

    if incident.retry_count > 0 {
        lines.push(format!("Retries:     {}", incident.retry_count));
    }
    if let Some(error) = &incident.sync_error {
        lines.push(format!("Sync error:  {error}"));
    }

    lines
}

pub fn format_stats_lines(stats: &SyncStats) -> Vec<String> {
    SyncStatus::ALL
        .iter()
        .map(|status| format!("{:<13}{}", status.as_str(), stats.get(*status)))
        .chain(std::iter::once(format!("{:<13}{}", "TOTAL", stats.total())))
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(
            || timestamp_ms.to_string(),
            |datetime| datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn parse_local_id(value: &str) -> Result<IncidentId, CliError> {
    value
        .parse::<IncidentId>()
        .map_err(|_| CliError::InvalidIncidentId(value.trim().to_string()))
}

/// Print a sync outcome; only `Error` fails the command.
pub fn report_outcome(outcome: SyncOutcome) -> Result<(), CliError> {
    match outcome {
        SyncOutcome::Success(count) => {
            println!("Synced {count} incident(s)");
            Ok(())
        }
        SyncOutcome::NoNetwork => {
            println!("No network connection; incidents stay queued");
            Ok(())
        }
        SyncOutcome::Error(message) => Err(CliError::SyncFailed(message)),
    }
}
