//! Removes stale duplicates left behind by redeploys.
//!
//! Redeploy tooling renames the old instance of a service to
//! `<12 char hash>_<service name>` and sometimes fails to clean it up.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Task, TaskContext, TaskError, Workers};
use crate::lock::LockOutcome;

pub const HASH_PREFIX_LEN: usize = 12;

/// Whether `candidate` is a renamed duplicate of the `canonical` service.
pub fn is_duplicate_of(candidate: &str, canonical: &str) -> bool {
    candidate.len() == canonical.len() + HASH_PREFIX_LEN + 1
        && candidate
            .strip_suffix(canonical)
            .is_some_and(|rest| rest.ends_with('_'))
        && candidate
            .split('_')
            .next()
            .is_some_and(|prefix| prefix.len() == HASH_PREFIX_LEN)
}

pub struct DeduplicationTask {
    ctx: Arc<TaskContext>,
}

impl DeduplicationTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Task for DeduplicationTask {
    fn name(&self) -> &'static str {
        "deduplication"
    }

    async fn process(&self) -> Result<Workers, TaskError> {
        let services = self.ctx.adapter.list_in_namespace().await?;
        let everything = self.ctx.adapter.list_all().await?;
        let mut workers = Vec::new();

        for service in services {
            if !service.policy().enable_cleaning_duplicated_services {
                continue;
            }

            let duplicates = everything
                .iter()
                .filter(|candidate| is_duplicate_of(candidate.name(), service.name()));

            for duplicate in duplicates {
                // The lease is taken on the service, so two passes never
                // clean up after the same service at once
                if self.ctx.locks.acquire(service.name()) == LockOutcome::AlreadyLocked {
                    log::debug!(
                        "Duplicates of \"{}\" are already being removed",
                        service.name()
                    );
                    continue;
                }

                let ctx = Arc::clone(&self.ctx);
                let duplicate = duplicate.clone();
                let service_name = service.name().to_string();

                workers.push(tokio::spawn(async move {
                    log::warn!(
                        "Removing \"{}\" (created {}), it duplicates \"{service_name}\"",
                        duplicate.name(),
                        duplicate.created_at()
                    );

                    match ctx.adapter.remove(duplicate.name()).await {
                        Ok(()) => ctx.notifier.container_was_removed(&duplicate).await,
                        Err(e) => log::error!("Unable to remove \"{}\": {e}", duplicate.name()),
                    }

                    ctx.locks.release(&service_name);
                }));
            }
        }

        Ok(workers)
    }
}
