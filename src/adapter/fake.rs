use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{AdapterError, ContainerAdapter, Result};
use crate::container::Container;

/// In-memory runtime. Restarts are only recorded, removals drop the container.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    namespace: String,
    containers: Mutex<Vec<Container>>,
    restarted: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    unreachable: AtomicBool,
}

impl FakeAdapter {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    /// Adds the container or replaces the one with the same name.
    pub fn put(&self, container: Container) {
        let mut containers = self.containers.lock().expect("Poisoned mutex");
        containers.retain(|c| c.name() != container.name());
        containers.push(container);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn restarted(&self) -> Vec<String> {
        self.restarted.lock().expect("Poisoned mutex").clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().expect("Poisoned mutex").clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AdapterError::NotFound("runtime".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerAdapter for FakeAdapter {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_all(&self) -> Result<Vec<Container>> {
        self.check_reachable()?;
        Ok(self.containers.lock().expect("Poisoned mutex").clone())
    }

    async fn restart(&self, id: &str) -> Result<()> {
        self.check_reachable()?;
        self.restarted
            .lock()
            .expect("Poisoned mutex")
            .push(id.to_string());
        Ok(())
    }

    async fn get_trailing_log(&self, id: &str, max_lines: usize) -> Result<String> {
        self.check_reachable()?;
        Ok(format!("last {max_lines} lines of {id}"))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut containers = self.containers.lock().expect("Poisoned mutex");
        let before = containers.len();
        containers.retain(|c| c.name() != id);
        if containers.len() == before {
            return Err(AdapterError::NotFound(id.to_string()));
        }
        self.removed
            .lock()
            .expect("Poisoned mutex")
            .push(id.to_string());
        Ok(())
    }
}
