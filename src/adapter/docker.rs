//! Docker runtime access using bollard.
//!
//! Containers are listed including the stopped ones, so failed exits are
//! visible, and inspected one by one for their state, health and labels.

use std::sync::Arc;

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, ListContainersOptions,
    ListContainersOptionsBuilder, LogsOptions, LogsOptionsBuilder, RemoveContainerOptions,
    RemoveContainerOptionsBuilder, RestartContainerOptions, StopContainerOptions,
    StopContainerOptionsBuilder,
};
use futures_util::StreamExt;

use super::{AdapterError, ContainerAdapter, Result};
use crate::container::Container;
use crate::policy::PolicyResolver;

/// Seconds Docker waits for a graceful stop before killing the container.
const STOP_TIMEOUT_SECS: i32 = 10;

pub struct DockerAdapter {
    docker: Docker,
    resolver: Arc<PolicyResolver>,
}

impl DockerAdapter {
    /// Connects using the default method (Unix socket on Linux/macOS, named
    /// pipe on Windows).
    pub fn connect(resolver: Arc<PolicyResolver>) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, resolver })
    }

    /// `None` when the container vanished in the meantime or its labels
    /// do not resolve to a valid policy.
    async fn inspect(&self, id: &str) -> Result<Option<Container>> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();

        let info = match self.docker.inspect_container(id, Some(options)).await {
            Ok(info) => info,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                log::debug!("Container {id} disappeared before it could be inspected");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let name = info
            .name
            .as_deref()
            .unwrap_or(id)
            .trim_start_matches('/')
            .to_string();
        let state = info.state.unwrap_or_default();
        let status = state.status.map(|s| s.to_string()).unwrap_or_default();
        let exit_code = state.exit_code.unwrap_or_default();
        let health = state
            .health
            .and_then(|health| health.status)
            .map(|s| s.to_string());
        let created_at = info.created.map(|c| c.to_string()).unwrap_or_default();
        let labels = info
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();

        let Some(policy) = self.resolver.resolve_labels(&name, &labels).await else {
            return Ok(None);
        };

        Ok(Some(Container::new(
            name, status, exit_code, created_at, health, policy,
        )))
    }
}

#[async_trait]
impl ContainerAdapter for DockerAdapter {
    fn namespace(&self) -> &str {
        &self.resolver.global().namespace
    }

    async fn list_all(&self) -> Result<Vec<Container>> {
        let options: ListContainersOptions = ListContainersOptionsBuilder::new().all(true).build();
        let summaries = self.docker.list_containers(Some(options)).await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else {
                continue;
            };
            if let Some(container) = self.inspect(&id).await? {
                containers.push(container);
            }
        }

        Ok(containers)
    }

    async fn restart(&self, id: &str) -> Result<()> {
        match self
            .docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(AdapterError::NotFound(id.to_string())),
            Err(e) => {
                log::error!("Failed to restart container {id}: {e}");
                Err(e.into())
            }
        }
    }

    async fn get_trailing_log(&self, id: &str, max_lines: usize) -> Result<String> {
        let options: LogsOptions = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .tail(&max_lines.to_string())
            .build();

        let mut stream = self.docker.logs(id, Some(options));
        let mut log = String::new();

        while let Some(chunk) = stream.next().await {
            log.push_str(&String::from_utf8_lossy(&chunk?.into_bytes()));
        }

        Ok(log.trim_end().to_string())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let options: StopContainerOptions = StopContainerOptionsBuilder::new()
            .t(STOP_TIMEOUT_SECS)
            .build();

        match self.docker.stop_container(id, Some(options)).await {
            Ok(_) => log::info!("Container {id} stopped successfully"),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => log::warn!("Container {id} not found, skipping stop"),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => log::info!("Container {id} already stopped"),
            Err(e) => {
                log::warn!("Failed to stop container {id}: {e}");
                return Err(e.into());
            }
        }

        let options: RemoveContainerOptions =
            RemoveContainerOptionsBuilder::new().force(true).build();

        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => {
                log::info!("Container {id} removed successfully");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                log::info!("Container {id} not found, skipping removal");
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to remove container {id}: {e}");
                Err(e.into())
            }
        }
    }
}
