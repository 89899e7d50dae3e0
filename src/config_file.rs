use std::path::Path;

use serde::Deserialize;

use crate::cli::Args;
use crate::policy::PolicyError;

/// Raw contents of `repairman.toml`. Anything left out takes its default.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepairmanConfigFile {
    pub debug: Option<bool>,
    pub interval: Option<u64>,
    pub namespace: Option<String>,
    pub seconds_between_restarts: Option<u64>,
    pub frame_size_in_seconds: Option<u64>,
    pub max_restarts_in_frame: Option<u64>,
    pub seconds_between_next_frame: Option<u64>,
    pub max_checks_to_give_up: Option<u64>,
    pub enable_cleaning_duplicated_services: Option<bool>,
    pub max_historic_entries: Option<u64>,
    pub http_address: Option<String>,
    pub http_port: Option<u16>,
    pub http_prefix: Option<String>,
    pub notify_url: Option<String>,
    pub notify_level: Option<String>,
    pub db_path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid global policy: {0}")]
    Policy(#[from] PolicyError),
}

impl RepairmanConfigFile {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    /// A missing file is not an error, the daemon runs on defaults.
    pub async fn try_init(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(config) => Self::try_init_from_string(&config),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Values given on the command line replace the ones from the file.
    pub fn overlay(self, args: &Args) -> Self {
        Self {
            debug: if args.debug { Some(true) } else { self.debug },
            interval: args.interval.or(self.interval),
            namespace: args.namespace.clone().or(self.namespace),
            seconds_between_restarts: args
                .seconds_between_restarts
                .or(self.seconds_between_restarts),
            frame_size_in_seconds: args.frame_size_in_seconds.or(self.frame_size_in_seconds),
            max_restarts_in_frame: args.max_restarts_in_frame.or(self.max_restarts_in_frame),
            seconds_between_next_frame: args
                .seconds_between_next_frame
                .or(self.seconds_between_next_frame),
            max_checks_to_give_up: args.max_checks_to_give_up.or(self.max_checks_to_give_up),
            enable_cleaning_duplicated_services: args
                .enable_cleaning_duplicated_services
                .or(self.enable_cleaning_duplicated_services),
            max_historic_entries: args.max_historic_entries.or(self.max_historic_entries),
            http_address: args.http_address.clone().or(self.http_address),
            http_port: args.http_port.or(self.http_port),
            http_prefix: args.http_prefix.clone().or(self.http_prefix),
            notify_url: args.notify_url.clone().or(self.notify_url),
            notify_level: args.notify_level.clone().or(self.notify_level),
            db_path: args.db_path.clone().or(self.db_path),
        }
    }
}
