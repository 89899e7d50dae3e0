//! Forgets the history of given up containers once they run healthy again.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Task, TaskContext, TaskError, Workers};

pub struct RecoveryMonitorTask {
    ctx: Arc<TaskContext>,
}

impl RecoveryMonitorTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Task for RecoveryMonitorTask {
    fn name(&self) -> &'static str {
        "recovery"
    }

    async fn process(&self) -> Result<Workers, TaskError> {
        for container in self.ctx.adapter.list_in_namespace().await? {
            if !container.is_healthy() {
                continue;
            }

            if self.ctx.journal.is_marked_do_not_touch(container.name())? {
                let forgotten = self.ctx.journal.events(container.name())?.len();
                log::info!(
                    "\"{}\" is back alive, forgetting {forgotten} journal events",
                    container.name()
                );
                self.ctx.journal.clear_history(container.name())?;
                self.ctx.notifier.container_is_back_alive(&container).await;
            }
        }

        Ok(Workers::new())
    }
}
