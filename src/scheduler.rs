use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::tasks::{DeduplicationTask, HealTask, RecoveryMonitorTask, Task, TaskContext, Workers};

/// Runs the repair passes one after another, forever.
///
/// Workers spawned by a pass are not awaited: a container stuck in a long
/// backoff keeps its lease while the following cycles move on.
pub struct Scheduler {
    tasks: Vec<Box<dyn Task>>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(ctx: Arc<TaskContext>, interval: Duration) -> Self {
        let tasks: Vec<Box<dyn Task>> = vec![
            Box::new(DeduplicationTask::new(Arc::clone(&ctx))),
            Box::new(RecoveryMonitorTask::new(Arc::clone(&ctx))),
            Box::new(HealTask::new(ctx)),
        ];
        Self::with_tasks(tasks, interval)
    }

    pub fn with_tasks(tasks: Vec<Box<dyn Task>>, interval: Duration) -> Self {
        Self { tasks, interval }
    }

    /// One pass of every task, sleeping `interval` after each. A failing
    /// task is logged and the cycle goes on.
    pub async fn run_cycle(&self) -> Workers {
        let mut workers = Workers::new();

        for task in &self.tasks {
            let started = Instant::now();
            match task.process().await {
                Ok(spawned) => {
                    log::debug!(
                        "Task {} dispatched {} workers in {:?}",
                        task.name(),
                        spawned.len(),
                        started.elapsed()
                    );
                    workers.extend(spawned);
                }
                Err(e) => log::error!("Task {} failed: {e}", task.name()),
            }

            tokio::time::sleep(self.interval).await;
        }

        workers
    }

    pub async fn run(&self) {
        log::info!("Starting the repair loop, interval {:?}", self.interval);
        loop {
            // Dropping the handles detaches the workers
            drop(self.run_cycle().await);
        }
    }
}
