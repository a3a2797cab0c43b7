use crate::commands::common::{
    format_incident_lines, incident_to_list_item, AppContext, IncidentListItem,
};
use crate::error::CliError;

pub async fn run_list(
    district: Option<&str>,
    as_json: bool,
    app: &AppContext,
) -> Result<(), CliError> {
    let incidents = match district {
        Some(district) => app.service.list_by_district(district).await?,
        None => app.service.get_all_incidents().await?,
    };

    if as_json {
        let json_items = incidents
            .iter()
            .map(incident_to_list_item)
            .collect::<Vec<IncidentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if incidents.is_empty() {
        println!("No incidents reported yet.");
        return Ok(());
    }

    for line in format_incident_lines(&incidents) {
        println!("{line}");
    }
    Ok(())
}
