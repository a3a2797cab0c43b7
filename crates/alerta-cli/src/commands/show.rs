use crate::commands::common::{format_incident_details, AppContext};
use crate::error::CliError;

pub async fn run_show(id: &str, as_json: bool, app: &AppContext) -> Result<(), CliError> {
    let incident = app
        .service
        .get_incident(id)
        .await?
        .ok_or_else(|| CliError::IncidentNotFound(id.trim().to_string()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&incident)?);
    } else {
        for line in format_incident_details(&incident) {
            println!("{line}");
        }
    }
    Ok(())
}
