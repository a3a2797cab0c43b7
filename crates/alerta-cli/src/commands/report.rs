use crate::cli::ReportArgs;
use crate::commands::common::AppContext;
use crate::error::CliError;

pub async fn run_report(args: ReportArgs, app: &AppContext) -> Result<(), CliError> {
    let draft = args.into_draft(app.config.author_id());
    let incident = app.service.create_incident(draft).await?;

    if incident.is_synced() {
        println!(
            "{} {} {}",
            incident.id,
            incident.sync_status,
            incident.display_id()
        );
    } else {
        println!("{} {}", incident.id, incident.sync_status);
    }
    Ok(())
}
