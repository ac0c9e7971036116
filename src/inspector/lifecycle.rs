//! Inspector service lifecycle
//!
//! [`ServiceLifecycle`] hands out one live [`ServiceInstance`] per OS family
//! for the duration of a run. Each family moves through
//! `NotStarted -> AwaitingHealth -> Ready -> Stopped`, or ends in `Failed`.
//!
//! Acquisition tries, in order: an instance already acquired in this run, the
//! external service when one is configured, a service already answering on
//! the family's host port, a running container labelled for the family, and
//! finally a freshly created container. Only containers created here are
//! stopped on release, including one whose start was interrupted.

use super::client::InspectorApi;
use super::images::InspectorImages;
use super::os::InspectorOs;
use super::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};
use crate::config::{InspectorConfig, ServiceMode};
use crate::error::InspectorError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedRwLockReadGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const APP_LABEL: &str = "app";
const OS_LABEL: &str = "os";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    AwaitingHealth,
    Ready,
    Stopped,
    Failed,
}

/// A reachable inspector service
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub os: InspectorOs,
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub container: Option<ContainerHandle>,
    /// Whether this process created the container (and so must remove it)
    pub started_by_us: bool,
    in_flight: Arc<RwLock<()>>,
}

impl ServiceInstance {
    fn new(
        os: InspectorOs,
        host: impl Into<String>,
        port: u16,
        base_url: impl Into<String>,
        container: Option<ContainerHandle>,
        started_by_us: bool,
    ) -> Self {
        Self {
            os,
            host: host.into(),
            port,
            base_url: base_url.into(),
            container,
            started_by_us,
            in_flight: Arc::new(RwLock::new(())),
        }
    }

    /// Marks an extraction in flight; release waits until every lease is dropped
    pub async fn lease(&self) -> OwnedRwLockReadGuard<()> {
        self.in_flight.clone().read_owned().await
    }
}

struct Slot {
    state: LifecycleState,
    instance: Option<ServiceInstance>,
    failure: Option<InspectorError>,
    /// Container being started or awaited; outlives a dropped `acquire`
    starting: Option<ContainerHandle>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: LifecycleState::NotStarted,
            instance: None,
            failure: None,
            starting: None,
        }
    }
}

pub struct ServiceLifecycle {
    config: Arc<InspectorConfig>,
    images: Arc<InspectorImages>,
    runtime: Arc<dyn ContainerRuntime>,
    api: Arc<dyn InspectorApi>,
    slots: Mutex<HashMap<InspectorOs, Arc<AsyncMutex<Slot>>>>,
}

impl ServiceLifecycle {
    pub fn new(
        config: Arc<InspectorConfig>,
        images: Arc<InspectorImages>,
        runtime: Arc<dyn ContainerRuntime>,
        api: Arc<dyn InspectorApi>,
    ) -> Self {
        Self {
            config,
            images,
            runtime,
            api,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, os: InspectorOs) -> Arc<AsyncMutex<Slot>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(os).or_default().clone()
    }

    fn tracked(&self) -> Vec<(InspectorOs, Arc<AsyncMutex<Slot>>)> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().map(|(os, slot)| (*os, slot.clone())).collect()
    }

    pub async fn state(&self, os: InspectorOs) -> LifecycleState {
        self.slot(os).lock().await.state
    }

    /// Returns a ready service for `os`, starting one if needed
    ///
    /// Concurrent calls for the same family are serialised so at most one
    /// container is created. A family that failed stays failed for the run.
    pub async fn acquire(&self, os: InspectorOs) -> Result<ServiceInstance, InspectorError> {
        let slot = self.slot(os);
        let mut slot = slot.lock().await;

        match slot.state {
            LifecycleState::Ready => {
                if let Some(instance) = &slot.instance {
                    debug!(%os, url = %instance.base_url, "Reusing acquired inspector service");
                    return Ok(instance.clone());
                }
            }
            LifecycleState::Failed => {
                if let Some(err) = &slot.failure {
                    return Err(err.clone());
                }
            }
            _ => {}
        }

        slot.state = LifecycleState::AwaitingHealth;
        match self.establish(os, &mut slot).await {
            Ok(instance) => {
                info!(
                    %os,
                    url = %instance.base_url,
                    started_by_us = instance.started_by_us,
                    "Inspector service ready"
                );
                slot.state = LifecycleState::Ready;
                slot.instance = Some(instance.clone());
                Ok(instance)
            }
            Err(err) => {
                warn!(%os, error = %err, "Inspector service unavailable");
                slot.state = LifecycleState::Failed;
                slot.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn establish(
        &self,
        os: InspectorOs,
        slot: &mut Slot,
    ) -> Result<ServiceInstance, InspectorError> {
        if let ServiceMode::External { url } = &self.config.service_mode {
            return self.use_external(os, url).await;
        }

        let ports = self.config.ports_for(os);
        let host = self.config.service_host.clone();
        let base_url = format!("http://{}:{}", host, ports.host);

        if self.is_up(&base_url).await {
            info!(%os, url = %base_url, "Found inspector service already listening");
            return Ok(ServiceInstance::new(os, host, ports.host, base_url, None, false));
        }

        let labels = self.labels(os);
        match self.runtime.find_running(&labels).await {
            Ok(Some(container)) => {
                let port = container.host_port.unwrap_or(ports.host);
                let base_url = format!("http://{}:{}", host, port);
                info!(%os, container = %container.name, url = %base_url, "Reusing running inspector container");
                self.wait_until_healthy(&base_url).await?;
                return Ok(ServiceInstance::new(
                    os,
                    host,
                    port,
                    base_url,
                    Some(container),
                    false,
                ));
            }
            Ok(None) => {}
            Err(e) => warn!(%os, error = %e, "Could not list running containers"),
        }

        let container = self.start_container(os, slot).await?;
        if let Err(err) = self.wait_until_healthy(&base_url).await {
            slot.starting = None;
            self.teardown(&container).await;
            return Err(err);
        }
        slot.starting = None;
        Ok(ServiceInstance::new(
            os,
            host,
            ports.host,
            base_url,
            Some(container),
            true,
        ))
    }

    async fn use_external(
        &self,
        os: InspectorOs,
        url: &str,
    ) -> Result<ServiceInstance, InspectorError> {
        let health = self.api.health_check(url).await?;
        if !health.is_up() {
            return Err(InspectorError::ServiceUnreachable {
                url: url.to_string(),
                message: format!(
                    "service did not report ready (HTTP {}, status {:?})",
                    health.http_status, health.status
                ),
                timed_out: false,
                connect_failed: false,
            });
        }

        let parsed = reqwest::Url::parse(url).map_err(|e| {
            InspectorError::InvalidConfiguration(format!("Invalid service URL {}: {}", url, e))
        })?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let port = parsed.port_or_known_default().unwrap_or_default();
        info!(%os, url, "Using external inspector service");
        Ok(ServiceInstance::new(os, host, port, url, None, false))
    }

    fn labels(&self, os: InspectorOs) -> Vec<(String, String)> {
        vec![
            (APP_LABEL.to_string(), self.images.family().to_string()),
            (OS_LABEL.to_string(), os.to_string()),
        ]
    }

    fn container_spec(&self, os: InspectorOs) -> Result<ContainerSpec, InspectorError> {
        let image = self.images.lookup(os).ok_or_else(|| {
            InspectorError::InvalidConfiguration(format!("No inspector image configured for {}", os))
        })?;
        let ports = self.config.ports_for(os);

        Ok(ContainerSpec {
            name: format!("{}-{}-{}", self.images.family(), os, std::process::id()),
            image: image.reference(),
            labels: self.labels(os).into_iter().collect(),
            container_port: ports.container,
            host_port: ports.host,
            cmd: vec![
                format!("--server.port={}", ports.container),
                format!("--current.linux.distro={}", os),
            ],
            binds: vec![format!(
                "{}:{}",
                self.config.shared_dir.display(),
                self.config.container_shared_dir
            )],
        })
    }

    /// Creates and starts the family's container, tracking it in `slot`
    ///
    /// Until the runtime reports an id the container is tracked by name, which
    /// the runtime also accepts, so an interrupted create can still be removed.
    async fn start_container(
        &self,
        os: InspectorOs,
        slot: &mut Slot,
    ) -> Result<ContainerHandle, InspectorError> {
        let spec = self.container_spec(os)?;
        let start_failure = |message: String| InspectorError::ServiceStartFailure {
            os,
            container: spec.name.clone(),
            message,
        };

        slot.starting = Some(ContainerHandle {
            id: spec.name.clone(),
            name: spec.name.clone(),
            host_port: Some(spec.host_port),
        });
        let starting = &mut slot.starting;
        let mut created = false;
        let started = tokio::time::timeout(self.config.command_timeout, async {
            let handle = self.runtime.create_container(&spec).await?;
            *starting = Some(handle.clone());
            created = true;
            self.runtime.start_container(&handle).await?;
            Ok::<_, anyhow::Error>(handle)
        })
        .await;

        match started {
            Ok(Ok(handle)) => {
                info!(%os, container = %handle.name, image = %spec.image, "Started inspector container");
                Ok(handle)
            }
            Ok(Err(e)) => {
                if created {
                    self.abandon_start(slot).await;
                } else {
                    slot.starting = None;
                }
                Err(start_failure(format!("{:#}", e)))
            }
            Err(_) => {
                self.abandon_start(slot).await;
                Err(start_failure(format!(
                    "container did not start within {}s",
                    self.config.command_timeout.as_secs()
                )))
            }
        }
    }

    /// Removes whatever a failed start left behind
    async fn abandon_start(&self, slot: &mut Slot) {
        if let Some(container) = slot.starting.take() {
            self.teardown(&container).await;
        }
    }

    async fn is_up(&self, base_url: &str) -> bool {
        matches!(self.api.health_check(base_url).await, Ok(h) if h.is_up())
    }

    /// Polls the health endpoint until it reports ready
    ///
    /// Transport errors and not-ready answers are retried at the configured
    /// interval until the command timeout runs out.
    pub async fn wait_until_healthy(&self, base_url: &str) -> Result<(), InspectorError> {
        let deadline = self.config.command_timeout;
        let interval = self.config.poll_interval;
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining.max(interval), self.api.health_check(base_url))
                .await
            {
                Ok(Ok(health)) if health.is_up() => {
                    debug!(url = %base_url, attempt, "Health check succeeded");
                    return Ok(());
                }
                Ok(Ok(health)) => {
                    debug!(url = %base_url, attempt, http_status = health.http_status, "Service not ready yet")
                }
                Ok(Err(e)) => debug!(url = %base_url, attempt, error = %e, "Health check failed"),
                Err(_) => debug!(url = %base_url, attempt, "Health check timed out"),
            }

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(InspectorError::ServiceTimeout {
                    address: base_url.to_string(),
                    elapsed,
                    deadline,
                });
            }
            tokio::time::sleep(interval.min(deadline - elapsed)).await;
        }
    }

    /// Releases the instance acquired for `instance.os`
    ///
    /// Waits for in-flight extractions, then stops and removes the container
    /// when this process started it. Failures are logged. Releasing twice is
    /// a no-op.
    pub async fn release(&self, instance: &ServiceInstance) {
        self.release_os(instance.os).await;
    }

    async fn release_os(&self, os: InspectorOs) {
        let slot = self.slot(os);
        let mut slot = slot.lock().await;
        if let Some(container) = slot.starting.take() {
            // An acquire was dropped mid-start; the container is never usable
            warn!(%os, container = %container.name, "Removing inspector container left by an interrupted start");
            slot.state = LifecycleState::Stopped;
            self.teardown(&container).await;
            return;
        }
        if slot.state != LifecycleState::Ready {
            return;
        }
        slot.state = LifecycleState::Stopped;
        let Some(instance) = slot.instance.take() else {
            return;
        };

        let _drained = instance.in_flight.write().await;
        if !instance.started_by_us {
            debug!(%os, url = %instance.base_url, "Leaving service we did not start");
            return;
        }
        if let Some(container) = &instance.container {
            if self.config.keep_containers {
                info!(%os, container = %container.name, "Leaving inspector container running");
            } else {
                self.teardown(container).await;
            }
        }
    }

    /// Releases every instance acquired during the run
    pub async fn release_all(&self) {
        let tracked = self.tracked();
        let releases = tracked.iter().map(|(os, _)| self.release_os(*os));
        futures_util::future::join_all(releases).await;
    }

    async fn teardown(&self, container: &ContainerHandle) {
        if let Err(e) = self.runtime.stop_container(container).await {
            warn!(container = %container.name, error = %e, "Failed to stop inspector container");
        }
        match self.runtime.remove_container(container).await {
            Ok(()) => info!(container = %container.name, "Removed inspector container"),
            Err(e) => warn!(container = %container.name, error = %e, "Failed to remove inspector container"),
        }
    }
}
