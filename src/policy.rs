//! Per-container repair policies.
//!
//! The global policy carries the defaults configured for the daemon. Every
//! container may override them with `org.riotkit.repairman.<field>` labels;
//! the merged result is validated before the container is managed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;
use crate::notify::{Notifier, NotifyLevel};

pub const LABEL_PREFIX: &str = "org.riotkit.repairman.";

/// Seconds reserved for every restart attempt inside a frame.
const RESTART_OPERATION_MARGIN_SECS: u64 = 8;

/// A container with a broken configuration is reported at most this often.
const INVALID_CONFIG_REPORT_COOLDOWN: TimeDelta = TimeDelta::minutes(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("\"{0}\" is not supported by the container policy")]
    UnknownKey(String),
    #[error("Cannot read \"{key}\" value \"{value}\" as {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("max-checks-to-give-up cannot be lower than max-restarts-in-frame")]
    GiveUpBelowFrameLimit,
    #[error("Please increase max-historic-entries above max-restarts-in-frame of each service")]
    HistoryBelowFrameLimit,
    #[error("Please increase max-historic-entries above max-checks-to-give-up of each service")]
    HistoryBelowGiveUp,
    #[error("Min frame size in seconds should be at least \"{min}\". Got \"{actual}\"")]
    FrameTooSmall { min: u64, actual: u64 },
}

/// Defines how a single container is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub seconds_between_restarts: u64,
    pub max_restarts_in_frame: u64,
    pub frame_size_in_seconds: u64,
    pub seconds_between_next_frame: u64,
    /// `0` disables giving up.
    pub max_checks_to_give_up: u64,
    pub enable_cleaning_duplicated_services: bool,
    /// Empty disables notifications.
    pub notify_url: String,
    pub notify_level: NotifyLevel,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            seconds_between_restarts: 20,
            max_restarts_in_frame: 5,
            frame_size_in_seconds: 900,
            seconds_between_next_frame: 3600,
            max_checks_to_give_up: 10,
            enable_cleaning_duplicated_services: true,
            notify_url: String::new(),
            notify_level: NotifyLevel::Info,
        }
    }
}

impl Policy {
    fn apply(&mut self, key: &str, value: &str) -> Result<(), PolicyError> {
        match key {
            "seconds_between_restarts" => self.seconds_between_restarts = cast_int(key, value)?,
            "max_restarts_in_frame" => self.max_restarts_in_frame = cast_int(key, value)?,
            "frame_size_in_seconds" => self.frame_size_in_seconds = cast_int(key, value)?,
            "seconds_between_next_frame" => {
                self.seconds_between_next_frame = cast_int(key, value)?
            }
            "max_checks_to_give_up" => self.max_checks_to_give_up = cast_int(key, value)?,
            "enable_cleaning_duplicated_services" => {
                self.enable_cleaning_duplicated_services = cast_bool(value)
            }
            "notify_url" => self.notify_url = value.to_string(),
            "notify_level" => {
                self.notify_level = value.parse().map_err(|_| PolicyError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    expected: "one of DEBUG, INFO, ERROR",
                })?
            }
            _ => return Err(PolicyError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Checks the numeric constraints between the fields. `max_historic_entries`
    /// is only known when the policy belongs to a container.
    pub fn validate(&self, max_historic_entries: Option<u64>) -> Result<(), PolicyError> {
        if let Some(max_history) = max_historic_entries {
            if self.max_restarts_in_frame > max_history {
                return Err(PolicyError::HistoryBelowFrameLimit);
            }
            if self.max_checks_to_give_up > max_history {
                return Err(PolicyError::HistoryBelowGiveUp);
            }
        }

        if self.max_checks_to_give_up != 0 && self.max_checks_to_give_up < self.max_restarts_in_frame
        {
            return Err(PolicyError::GiveUpBelowFrameLimit);
        }

        let min_frame_size = self
            .max_restarts_in_frame
            .saturating_mul(self.seconds_between_restarts)
            .saturating_mul(RESTART_OPERATION_MARGIN_SECS);

        if self.frame_size_in_seconds < min_frame_size {
            return Err(PolicyError::FrameTooSmall {
                min: min_frame_size,
                actual: self.frame_size_in_seconds,
            });
        }

        Ok(())
    }
}

/// Defaults for every container plus the settings that only exist globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalPolicy {
    pub defaults: Policy,
    pub debug: bool,
    /// Only containers whose name starts with this prefix are managed.
    pub namespace: String,
    pub max_historic_entries: u64,
    pub db_path: String,
}

impl GlobalPolicy {
    pub fn new(
        defaults: Policy,
        debug: bool,
        namespace: String,
        max_historic_entries: u64,
        db_path: String,
    ) -> Result<Self, PolicyError> {
        defaults.validate(None)?;
        Ok(Self {
            defaults,
            debug,
            namespace,
            max_historic_entries,
            db_path,
        })
    }
}

pub fn cast_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "y"
    )
}

fn cast_int(key: &str, value: &str) -> Result<u64, PolicyError> {
    value.trim().parse().map_err(|_| PolicyError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

/// Overlays `overrides` (field name to raw text) on the global defaults.
pub fn resolve(
    global: &GlobalPolicy,
    overrides: &HashMap<String, String>,
) -> Result<Policy, PolicyError> {
    let mut policy = global.defaults.clone();

    // Sorted so the reported error does not depend on hash order
    let mut entries: Vec<_> = overrides.iter().collect();
    entries.sort();

    for (key, value) in entries {
        policy.apply(key, value)?;
    }

    policy.validate(Some(global.max_historic_entries))?;
    Ok(policy)
}

/// Picks the repairman labels and turns them into policy field names.
/// Dots and dashes in the field part are read as underscores.
pub fn overrides_from_labels(labels: &HashMap<String, String>) -> HashMap<String, String> {
    labels
        .iter()
        .filter_map(|(label, value)| {
            label
                .strip_prefix(LABEL_PREFIX)
                .map(|field| (field.replace(['.', '-'], "_"), value.clone()))
        })
        .collect()
}

/// Resolves container policies and keeps track of which broken
/// configurations were already reported.
#[derive(Debug)]
pub struct PolicyResolver {
    global: GlobalPolicy,
    clock: Arc<dyn Clock>,
    notifier: Arc<Notifier>,
    reported: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PolicyResolver {
    pub fn new(global: GlobalPolicy, clock: Arc<dyn Clock>, notifier: Arc<Notifier>) -> Self {
        Self {
            global,
            clock,
            notifier,
            reported: Mutex::new(HashMap::new()),
        }
    }

    pub fn global(&self) -> &GlobalPolicy {
        &self.global
    }

    /// Returns `None` when the container must not be managed this cycle.
    pub async fn resolve_labels(
        &self,
        container_name: &str,
        labels: &HashMap<String, String>,
    ) -> Option<Policy> {
        match resolve(&self.global, &overrides_from_labels(labels)) {
            Ok(policy) => Some(policy),
            Err(e) => {
                if self.should_report(container_name) {
                    log::error!(
                        "Container \"{container_name}\" has an invalid configuration and will not be managed: {e}"
                    );
                    self.notifier
                        .invalid_configuration(container_name, &self.global.defaults, &e)
                        .await;
                } else {
                    log::debug!("Skipping misconfigured container \"{container_name}\": {e}");
                }
                None
            }
        }
    }

    fn should_report(&self, container_name: &str) -> bool {
        let now = self.clock.now();
        let mut reported = self.reported.lock().expect("Poisoned mutex");
        reported.retain(|_, last| now - *last < INVALID_CONFIG_REPORT_COOLDOWN);

        match reported.get(container_name) {
            Some(last) if now - *last < INVALID_CONFIG_REPORT_COOLDOWN => false,
            _ => {
                reported.insert(container_name.to_string(), now);
                true
            }
        }
    }
}
