use std::path::PathBuf;

use alerta_core::NewIncident;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "alerta")]
#[command(about = "Report neighborhood incidents and sync them with Alerta360")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report a new incident
    #[command(alias = "new")]
    Report(ReportArgs),
    /// List stored incidents, newest first
    List {
        /// Only incidents in this district
        #[arg(long)]
        district: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one incident by server id or local id
    Show {
        /// Server id or local id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push queued incidents to the server
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Short summary of what happened
    #[arg(long)]
    pub title: String,
    /// Incident category (robbery, vandalism, ...)
    #[arg(long = "type", value_name = "TYPE")]
    pub incident_type: String,
    #[arg(long)]
    pub description: Option<String>,
    /// Address or landmark
    #[arg(long)]
    pub location: Option<String>,
    /// Coordinates as "lat,lng"
    #[arg(long, value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub geo: Option<String>,
    #[arg(long)]
    pub district: Option<String>,
    /// Evidence URI (repeatable)
    #[arg(long = "evidence", value_name = "URI")]
    pub evidence: Vec<String>,
    /// Author id (defaults to ALERTA_USER_ID)
    #[arg(long)]
    pub author: Option<String>,
}

impl ReportArgs {
    pub fn into_draft(self, default_author: Option<&str>) -> NewIncident {
        NewIncident {
            title: self.title,
            description: self.description.unwrap_or_default(),
            incident_type: self.incident_type,
            location: self.location.unwrap_or_default(),
            geolocation: self.geo.unwrap_or_default(),
            evidence: self.evidence,
            district: self.district.unwrap_or_default(),
            author_id: self
                .author
                .or_else(|| default_author.map(str::to_string))
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one sync pass in the foreground
    Now,
    /// Show how many incidents are in each sync status
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retry incidents whose last sync failed
    Retry,
    /// Sync one incident now, with a fresh retry budget
    Force {
        /// Local incident id
        id: String,
    },
    /// Keep syncing periodically until interrupted
    Watch {
        /// Hours between sync passes
        #[arg(long, value_name = "HOURS")]
        interval_hours: Option<u64>,
    },
    /// Requeue incidents left in SYNCING by an interrupted run
    Reset,
}
