use alerta_core::config::hours;
use alerta_core::network::NetworkMonitor;
use alerta_core::sync::{JobStatus, SyncOutcome};

use crate::commands::common::{format_stats_lines, parse_local_id, report_outcome, AppContext};
use crate::error::CliError;

/// Run the background job body once: requeue interrupted syncs, then push.
pub async fn run_sync_now(app: &AppContext) -> Result<(), CliError> {
    if !app.manager().is_online() {
        println!("No network connection; incidents stay queued");
        return Ok(());
    }

    match app.scheduler().run_sync_job().await {
        JobStatus::Success => {
            let stats = app.manager().get_sync_stats().await?;
            println!(
                "Sync finished: {} synced, {} pending, {} failed",
                stats.synced, stats.pending, stats.error
            );
            Ok(())
        }
        JobStatus::Retry => Err(CliError::SyncFailed(
            "sync did not complete; try again later".to_string(),
        )),
    }
}

pub async fn run_sync_stats(as_json: bool, app: &AppContext) -> Result<(), CliError> {
    let stats = app.manager().get_sync_stats().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_sync_retry(app: &AppContext) -> Result<(), CliError> {
    report_outcome(app.manager().retry_sync_errors().await)
}

pub async fn run_sync_force(id: &str, app: &AppContext) -> Result<(), CliError> {
    let id = parse_local_id(id)?;
    if !app.manager().is_online() {
        return report_outcome(SyncOutcome::NoNetwork);
    }
    report_outcome(app.manager().force_sync_incident(&id).await)
}

pub async fn run_sync_reset(app: &AppContext) -> Result<(), CliError> {
    let count = app.manager().reset_syncing_incidents().await?;
    println!("Requeued {count} interrupted incident(s)");
    Ok(())
}

/// Sync periodically, and again whenever connectivity comes back, until Ctrl-C.
pub async fn run_sync_watch(interval_hours: Option<u64>, app: &AppContext) -> Result<(), CliError> {
    let interval = match interval_hours {
        Some(0) => {
            return Err(CliError::Config(
                "--interval-hours must be greater than zero".to_string(),
            ))
        }
        Some(value) => hours(value),
        None => app.config.sync_interval(),
    };

    let scheduler = app.scheduler();
    scheduler.start_periodic_sync(interval);
    println!("Watching for incidents to sync every {interval:?}; press Ctrl-C to stop");

    let mut connectivity = app.connectivity.subscribe();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            change = connectivity.changed() => match change {
                Some(true) => {
                    tracing::info!("Back online, syncing queued incidents");
                    scheduler.sync_now();
                }
                Some(false) => tracing::info!("Connection lost; incidents will queue"),
                None => {
                    tracing::warn!("Connectivity updates stopped");
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
        }
    }

    scheduler.cancel_all_sync();
    println!("Stopped watching");
    Ok(())
}
