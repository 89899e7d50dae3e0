//! Access to the container runtime.
//!
//! Everything the tasks need from the runtime goes through
//! [`ContainerAdapter`], so Docker and the in-memory test double are
//! interchangeable.

pub mod docker;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;

use crate::container::Container;

pub use docker::DockerAdapter;

pub const DEFAULT_LOG_LINES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Container {0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[async_trait]
pub trait ContainerAdapter: Send + Sync {
    /// Name prefix of the managed containers.
    fn namespace(&self) -> &str;

    /// Every container known to the runtime, whatever its namespace.
    async fn list_all(&self) -> Result<Vec<Container>>;

    async fn restart(&self, id: &str) -> Result<()>;

    async fn get_trailing_log(&self, id: &str, max_lines: usize) -> Result<String>;

    /// Stops the container and removes it.
    async fn remove(&self, id: &str) -> Result<()>;

    async fn list_in_namespace(&self) -> Result<Vec<Container>> {
        let namespace = self.namespace();
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|container| container.name().starts_with(namespace))
            .collect())
    }

    async fn list_unhealthy_in_namespace(&self) -> Result<Vec<Container>> {
        Ok(self
            .list_in_namespace()
            .await?
            .into_iter()
            .filter(Container::is_unhealthy)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeAdapter;
    use super::*;
    use crate::policy::Policy;

    #[tokio::test]
    async fn test_namespace_and_health_filters() {
        let adapter = FakeAdapter::new("app_");
        adapter.put(Container::new("app_web_1", "running", 0, "", None, Policy::default()));
        adapter.put(Container::new("app_db_1", "exited", 1, "", None, Policy::default()));
        adapter.put(Container::new("other_db_1", "exited", 1, "", None, Policy::default()));
        adapter.put(Container::new(
            "app_cache_1",
            "running",
            0,
            "",
            Some("unhealthy".to_string()),
            Policy::default(),
        ));

        assert_eq!(adapter.list_all().await.unwrap().len(), 4);
        assert_eq!(adapter.list_in_namespace().await.unwrap().len(), 3);

        let mut unhealthy: Vec<_> = adapter
            .list_unhealthy_in_namespace()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name().to_string())
            .collect();
        unhealthy.sort();
        assert_eq!(unhealthy, vec!["app_cache_1", "app_db_1"]);
    }
}
