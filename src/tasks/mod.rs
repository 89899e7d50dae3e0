//! The repair passes run by the scheduler.
//!
//! A pass scans the runtime once and hands every matched container to its
//! own detached worker. Workers are protected by the [`LockManager`] lease of
//! the container, not by the scheduler, which never waits for them.

pub mod dedup;
pub mod heal;
pub mod recovery;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::adapter::{AdapterError, ContainerAdapter, DEFAULT_LOG_LINES};
use crate::clock::Clock;
use crate::journal::{Journal, JournalError};
use crate::lock::LockManager;
use crate::notify::Notifier;

pub use dedup::DeduplicationTask;
pub use heal::HealTask;
pub use recovery::RecoveryMonitorTask;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Runtime error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("Blocking journal access failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handles of the workers dispatched by a pass. Dropping them detaches the
/// workers, awaiting them waits for the repairs to finish.
pub type Workers = Vec<JoinHandle<()>>;

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self) -> Result<Workers, TaskError>;
}

/// Collaborators shared by every task and worker of a daemon instance.
pub struct TaskContext {
    pub adapter: Arc<dyn ContainerAdapter>,
    pub journal: Arc<Journal>,
    pub locks: Arc<LockManager>,
    pub notifier: Arc<Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl TaskContext {
    /// Last lines of the container output for notifications. A failure to
    /// fetch them must not stop the repair.
    pub async fn trailing_log(&self, container_name: &str) -> String {
        match self
            .adapter
            .get_trailing_log(container_name, DEFAULT_LOG_LINES)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Unable to fetch the log of \"{container_name}\": {e}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::adapter::fake::FakeAdapter;
    use crate::clock::ManualClock;
    use crate::journal::EPHEMERAL_DB_PATH;
    use crate::notify::RecordingTransport;

    pub struct Harness {
        pub ctx: Arc<TaskContext>,
        pub adapter: Arc<FakeAdapter>,
        pub journal: Arc<Journal>,
        pub locks: Arc<LockManager>,
        pub transport: Arc<RecordingTransport>,
        pub clock: Arc<ManualClock>,
    }

    impl Harness {
        pub fn new(namespace: &str) -> Self {
            let clock = Arc::new(ManualClock::starting_now());
            let adapter = Arc::new(FakeAdapter::new(namespace));
            let journal = Arc::new(
                Journal::open(EPHEMERAL_DB_PATH, 20, clock.clone()).expect("in-memory journal"),
            );
            let locks = Arc::new(LockManager::new(clock.clone()));
            let transport = Arc::new(RecordingTransport::default());
            let notifier = Arc::new(Notifier::new(transport.clone()));

            let ctx = Arc::new(TaskContext {
                adapter: adapter.clone(),
                journal: journal.clone(),
                locks: locks.clone(),
                notifier,
                clock: clock.clone(),
            });

            Self {
                ctx,
                adapter,
                journal,
                locks,
                transport,
                clock,
            }
        }
    }

    pub async fn join(workers: Workers) {
        for worker in workers {
            worker.await.expect("worker panicked");
        }
    }
}
