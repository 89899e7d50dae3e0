//! Restarts unhealthy containers, backing off as failures pile up.
//!
//! The decision is a pure function of the policy, the journal history and
//! the current time. Executing it may sleep for a long time, which is why
//! every container gets its own worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use super::{Task, TaskContext, TaskError, Workers};
use crate::container::Container;
use crate::journal::{self, Journal};
use crate::lock::LockOutcome;
use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Restart,
    /// Too soon after the previous restart, wait this long first.
    WaitFor(Duration),
    /// The frame is full, wait for the next one before restarting.
    LongerWait,
    /// Give up on the container until it recovers by itself.
    DoNotTouch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestartHistory {
    pub total_restarts: u64,
    pub restarts_in_frame: u64,
    pub reached_max_in_previous_frame: bool,
    pub last_restart: Option<DateTime<Utc>>,
}

impl RestartHistory {
    pub fn load(journal: &Journal, container_name: &str, policy: &Policy) -> journal::Result<Self> {
        Ok(Self {
            total_restarts: journal.total_restarts(container_name)?,
            restarts_in_frame: journal
                .count_restarts_in_window(container_name, policy.frame_size_in_seconds)?,
            reached_max_in_previous_frame: journal
                .reached_max_in_previous_window(container_name, policy.frame_size_in_seconds)?,
            last_restart: journal.last_restart_time(container_name)?,
        })
    }
}

/// Limits set to zero are disabled.
pub fn decide(policy: &Policy, history: &RestartHistory, now: DateTime<Utc>) -> Decision {
    if policy.max_checks_to_give_up > 0 && history.total_restarts >= policy.max_checks_to_give_up {
        return Decision::DoNotTouch;
    }

    if policy.max_restarts_in_frame > 0 && history.restarts_in_frame >= policy.max_restarts_in_frame
    {
        return Decision::LongerWait;
    }

    if let Some(last_restart) = history.last_restart {
        let next_allowed = last_restart
            .checked_add_signed(seconds(policy.seconds_between_restarts))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if next_allowed > now {
            let delay = (next_allowed - now).to_std().unwrap_or_default();
            return Decision::WaitFor(delay);
        }
    }

    Decision::Restart
}

/// Longest a worker may legitimately sleep before its restart: a full
/// next-frame wait followed by the restart delay.
fn longest_wait(policy: &Policy) -> TimeDelta {
    seconds(
        policy
            .seconds_between_next_frame
            .saturating_add(policy.seconds_between_restarts),
    )
}

fn seconds(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

pub struct HealTask {
    ctx: Arc<TaskContext>,
}

impl HealTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Task for HealTask {
    fn name(&self) -> &'static str {
        "heal"
    }

    async fn process(&self) -> Result<Workers, TaskError> {
        let unhealthy = self.ctx.adapter.list_unhealthy_in_namespace().await?;
        let mut workers = Vec::with_capacity(unhealthy.len());

        for container in unhealthy {
            let hold = longest_wait(container.policy());
            if self.ctx.locks.acquire_for(container.name(), hold) == LockOutcome::AlreadyLocked {
                log::debug!(
                    "Container \"{}\" is already being repaired",
                    container.name()
                );
                continue;
            }

            let ctx = Arc::clone(&self.ctx);
            workers.push(tokio::spawn(async move {
                if let Err(e) = repair(&ctx, &container).await {
                    log::error!("Failed to repair container \"{}\": {e}", container.name());
                }
                ctx.locks.release(container.name());
            }));
        }

        Ok(workers)
    }
}

async fn repair(ctx: &TaskContext, container: &Container) -> Result<(), TaskError> {
    let name = container.name();
    let policy = container.policy();

    log::debug!(
        "Preparing to repair \"{name}\" (status={}, exit_code={})",
        container.status(),
        container.exit_code()
    );

    let history = {
        let journal = Arc::clone(&ctx.journal);
        let container_name = name.to_string();
        let policy = policy.clone();
        tokio::task::spawn_blocking(move || {
            RestartHistory::load(&journal, &container_name, &policy)
        })
        .await??
    };
    let now = ctx.clock.now();

    if let Some(last_restart) = history.last_restart {
        if last_restart > now {
            log::error!(
                "Last restart of \"{name}\" is in the future ({last_restart} > {now}), check the system clock"
            );
        }
    }

    log::debug!(
        "\"{name}\": {} restarts in frame, {} total, previous frame at max: {}",
        history.restarts_in_frame,
        history.total_restarts,
        history.reached_max_in_previous_frame
    );

    match decide(policy, &history, now) {
        Decision::DoNotTouch => {
            if ctx.journal.record_do_not_touch(name)? {
                log::error!("Gave up on \"{name}\", it will not be touched until it recovers");
                ctx.notifier.not_touching_anymore(container).await;
            }
            return Ok(());
        }
        Decision::WaitFor(delay) => {
            log::warn!(
                "\"{name}\" failed again, waiting {}s before the next restart",
                delay.as_secs()
            );
            let trailing_log = ctx.trailing_log(name).await;
            ctx.notifier
                .multiple_failures_happened(container, &trailing_log)
                .await;
            tokio::time::sleep(delay).await;
        }
        Decision::LongerWait => {
            log::error!(
                "\"{name}\" reached {} restarts in the frame, waiting {}s for the next one",
                policy.max_restarts_in_frame,
                policy.seconds_between_next_frame
            );
            let trailing_log = ctx.trailing_log(name).await;
            ctx.notifier
                .max_restarts_reached(container, &trailing_log)
                .await;
            tokio::time::sleep(Duration::from_secs(policy.seconds_between_next_frame)).await;
            ctx.journal.record_give_up_wait_and_archive(name)?;
        }
        Decision::Restart => {}
    }

    log::info!("Restarting \"{name}\"");
    ctx.journal.record_restart(name)?;
    ctx.adapter.restart(name).await?;

    let trailing_log = ctx.trailing_log(name).await;
    ctx.notifier
        .container_was_restarted(container, &trailing_log)
        .await;

    Ok(())
}
