use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Keeps Docker containers alive: restarts the unhealthy ones with backoff
/// and removes duplicates left behind by redeploys.
///
/// Every option can also be set in the config file, the command line wins.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "repairman.toml")]
    pub config: PathBuf,

    /// Log and notify at debug level.
    #[arg(long)]
    pub debug: bool,

    /// Seconds to sleep after each repair pass.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Only containers whose name starts with this prefix are managed.
    #[arg(long)]
    pub namespace: Option<String>,

    #[arg(long)]
    pub seconds_between_restarts: Option<u64>,

    #[arg(long)]
    pub frame_size_in_seconds: Option<u64>,

    #[arg(long)]
    pub max_restarts_in_frame: Option<u64>,

    /// Seconds to wait once a frame is full before restarting again.
    #[arg(long)]
    pub seconds_between_next_frame: Option<u64>,

    /// Total restarts after which a container is left alone (0 disables).
    #[arg(long)]
    pub max_checks_to_give_up: Option<u64>,

    #[arg(long)]
    pub enable_cleaning_duplicated_services: Option<bool>,

    /// Events kept per container in the journal.
    #[arg(long)]
    pub max_historic_entries: Option<u64>,

    #[arg(long)]
    pub http_address: Option<String>,

    #[arg(long)]
    pub http_port: Option<u16>,

    #[arg(long)]
    pub http_prefix: Option<String>,

    /// Slack/Mattermost compatible webhook.
    #[arg(long)]
    pub notify_url: Option<String>,

    /// DEBUG, INFO or ERROR.
    #[arg(long)]
    pub notify_level: Option<String>,

    /// SQLite file for the journal, ":memory:" keeps it in memory.
    #[arg(long)]
    pub db_path: Option<String>,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
