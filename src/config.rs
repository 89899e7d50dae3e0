use std::time::Duration;

use crate::config_file::{ConfigError, RepairmanConfigFile};
use crate::journal::EPHEMERAL_DB_PATH;
use crate::notify::NotifyLevel;
use crate::policy::{GlobalPolicy, Policy, PolicyError};

pub const DEFAULT_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_MAX_HISTORIC_ENTRIES: u64 = 20;
pub const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub address: String,
    pub port: u16,
    pub prefix: String,
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct RepairmanConfig {
    pub interval: Duration,
    pub http: HttpSettings,
    pub global: GlobalPolicy,
}

impl RepairmanConfig {
    pub async fn try_init() -> Result<Self, ConfigError> {
        let args = crate::cli::get_cli_args();
        let file = RepairmanConfigFile::try_init(&args.config)
            .await?
            .overlay(args);
        Self::try_from_file(file)
    }

    pub fn try_from_file(file: RepairmanConfigFile) -> Result<Self, ConfigError> {
        let fallback = Policy::default();

        let notify_level = match file.notify_level {
            Some(level) => {
                level
                    .parse::<NotifyLevel>()
                    .map_err(|_| PolicyError::InvalidValue {
                        key: "notify_level".to_string(),
                        value: level.clone(),
                        expected: "one of DEBUG, INFO, ERROR",
                    })?
            }
            None => fallback.notify_level,
        };

        let defaults = Policy {
            seconds_between_restarts: file
                .seconds_between_restarts
                .unwrap_or(fallback.seconds_between_restarts),
            max_restarts_in_frame: file
                .max_restarts_in_frame
                .unwrap_or(fallback.max_restarts_in_frame),
            frame_size_in_seconds: file
                .frame_size_in_seconds
                .unwrap_or(fallback.frame_size_in_seconds),
            seconds_between_next_frame: file
                .seconds_between_next_frame
                .unwrap_or(fallback.seconds_between_next_frame),
            max_checks_to_give_up: file
                .max_checks_to_give_up
                .unwrap_or(fallback.max_checks_to_give_up),
            enable_cleaning_duplicated_services: file
                .enable_cleaning_duplicated_services
                .unwrap_or(fallback.enable_cleaning_duplicated_services),
            notify_url: file.notify_url.unwrap_or(fallback.notify_url),
            notify_level,
        };

        let global = GlobalPolicy::new(
            defaults,
            file.debug.unwrap_or(false),
            file.namespace.unwrap_or_default(),
            file.max_historic_entries
                .unwrap_or(DEFAULT_MAX_HISTORIC_ENTRIES),
            file.db_path
                .unwrap_or_else(|| EPHEMERAL_DB_PATH.to_string()),
        )?;

        Ok(Self {
            interval: Duration::from_secs(file.interval.unwrap_or(DEFAULT_INTERVAL_SECS)),
            http: HttpSettings {
                address: file
                    .http_address
                    .unwrap_or_else(|| DEFAULT_HTTP_ADDRESS.to_string()),
                port: file.http_port.unwrap_or(DEFAULT_HTTP_PORT),
                prefix: file.http_prefix.unwrap_or_default(),
            },
            global,
        })
    }
}
