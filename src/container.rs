use crate::policy::Policy;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_EXITED: &str = "exited";
pub const HEALTH_UNHEALTHY: &str = "unhealthy";

/// Snapshot of a container as reported by the runtime in one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    name: String,
    status: String,
    exit_code: i64,
    created_at: String,
    health: Option<String>,
    policy: Policy,
}

impl Container {
    pub fn new(
        name: impl Into<String>,
        status: impl Into<String>,
        exit_code: i64,
        created_at: impl Into<String>,
        health: Option<String>,
        policy: Policy,
    ) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            exit_code,
            created_at: created_at.into(),
            health,
            policy,
        }
    }

    /// The name is the identity of a container across cycles.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn is_unhealthy(&self) -> bool {
        self.health.as_deref() == Some(HEALTH_UNHEALTHY)
            || (self.status == STATUS_EXITED && is_failure_exit_code(self.exit_code))
    }

    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_RUNNING && !self.is_unhealthy()
    }
}

/// Exit codes from 130 to 200 come from signals and interrupts (SIGINT,
/// SIGKILL, SIGTERM...), so they are not treated as failures.
pub fn is_failure_exit_code(code: i64) -> bool {
    (1..130).contains(&code) || code > 200
}
