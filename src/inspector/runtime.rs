//! Container runtime used to run inspector services
//!
//! The lifecycle manager only needs a handful of operations, so they sit
//! behind [`ContainerRuntime`]. [`DockerRuntime`] implements them against the
//! local Docker (or Podman) socket.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use std::collections::HashMap;
use tracing::{debug, info};

/// Image labels consulted, in order, for an OS hint
const OS_HINT_LABELS: &[&str] = &["os", "org.opencontainers.image.base.name", "ID"];

const STOP_TIMEOUT_SECS: i64 = 10;

/// Ownership token for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    /// Host port published for the service, when known
    pub host_port: Option<u16>,
}

/// Everything needed to create one inspector container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub container_port: u16,
    pub host_port: u16,
    pub cmd: Vec<String>,
    /// `host:container` bind mounts
    pub binds: Vec<String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// First running container carrying every label in `labels`
    async fn find_running(&self, labels: &[(String, String)]) -> Result<Option<ContainerHandle>>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    async fn start_container(&self, handle: &ContainerHandle) -> Result<()>;

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<()>;

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<()>;

    /// Distro hint from the target image's metadata, if it carries one
    async fn image_os_hint(&self, image: &str) -> Result<Option<String>>;
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker/Podman")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_running(&self, labels: &[(String, String)]) -> Result<Option<ContainerHandle>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>(),
        );
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                filters,
                ..Default::default()
            }))
            .await
            .context("Failed to list containers")?;

        let Some(summary) = containers.into_iter().next() else {
            return Ok(None);
        };

        let id = summary.id.context("Container ID missing")?;
        let name = summary
            .names
            .and_then(|names| names.into_iter().next())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.clone());
        let host_port = summary
            .ports
            .unwrap_or_default()
            .into_iter()
            .find_map(|p| p.public_port);

        debug!(container = %name, ?host_port, "Found running container");
        Ok(Some(ContainerHandle {
            id,
            name,
            host_port,
        }))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let port_key = format!("{}/tcp", spec.container_port);
        let exposed_ports = HashMap::from([(port_key.clone(), HashMap::new())]);
        let port_bindings = HashMap::from([(
            port_key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.host_port.to_string()),
            }]),
        )]);

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                binds: Some(spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .with_context(|| format!("Failed to create container {} from {}", spec.name, spec.image))?;

        info!(container = %spec.name, image = %spec.image, "Created inspector container");
        Ok(ContainerHandle {
            id: response.id,
            name: spec.name.clone(),
            host_port: Some(spec.host_port),
        })
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("Failed to start container {}", handle.name))
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .stop_container(
                &handle.id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await
            .with_context(|| format!("Failed to stop container {}", handle.name))
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .with_context(|| format!("Failed to remove container {}", handle.name))
    }

    async fn image_os_hint(&self, image: &str) -> Result<Option<String>> {
        let inspect = self
            .docker
            .inspect_image(image)
            .await
            .with_context(|| format!("Failed to inspect image {}", image))?;

        let labels = inspect
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();
        Ok(os_hint_from_labels(&labels))
    }
}

fn os_hint_from_labels(labels: &HashMap<String, String>) -> Option<String> {
    OS_HINT_LABELS
        .iter()
        .find_map(|key| labels.get(*key))
        .filter(|v| !v.trim().is_empty())
        .cloned()
}
