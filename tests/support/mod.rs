//! Shared helpers for integration tests: an in-memory container runtime, a
//! scripted inspector API and a throw-away HTTP server.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use image_inspector::config::{InspectorConfig, ServiceMode};
use image_inspector::extract::ExtractionPayload;
use image_inspector::inspector::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExtractionRequest, ExtractionResponse,
    HealthStatus, InspectorApi,
};
use image_inspector::InspectorError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Config suitable for tests: short timeouts, start-as-needed, given shared dir
pub fn test_config(shared_dir: &Path) -> InspectorConfig {
    let mut config = InspectorConfig::default();
    config.service_mode = ServiceMode::StartAsNeeded;
    config.service_host = "127.0.0.1".to_string();
    config.command_timeout = Duration::from_millis(400);
    config.poll_interval = Duration::from_millis(20);
    config.shared_dir = shared_dir.to_path_buf();
    config.cleanup = true;
    config.organize_by_layer = false;
    config.include_removed_components = false;
    config.output_container_fs = false;
    config.code_location_prefix = None;
    config.platform_top_layer_id = None;
    config
}

/// Container runtime that only counts calls
#[derive(Default)]
pub struct MockRuntime {
    pub created: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub removed: Mutex<Vec<String>>,
    pub specs: Mutex<Vec<ContainerSpec>>,
    pub fail_create: AtomicBool,
    pub running: Mutex<Option<ContainerHandle>>,
    pub os_hints: Mutex<HashMap<String, String>>,
    pub create_delay: Mutex<Option<Duration>>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Whether a container was created for the host port in `base_url`
    pub fn serves(&self, base_url: &str) -> bool {
        self.specs
            .lock()
            .unwrap()
            .iter()
            .any(|spec| base_url.ends_with(&format!(":{}", spec.host_port)))
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn set_os_hint(&self, image: &str, hint: &str) {
        self.os_hints
            .lock()
            .unwrap()
            .insert(image.to_string(), hint.to_string());
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn find_running(&self, _labels: &[(String, String)]) -> Result<Option<ContainerHandle>> {
        Ok(self.running.lock().unwrap().clone())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            anyhow::bail!("image {} not found", spec.image);
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());
        Ok(ContainerHandle {
            id: format!("container-{}", n),
            name: spec.name.clone(),
            host_port: Some(spec.host_port),
        })
    }

    async fn start_container(&self, _handle: &ContainerHandle) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_container(&self, _handle: &ContainerHandle) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.removed.lock().unwrap().push(handle.id.clone());
        Ok(())
    }

    async fn image_os_hint(&self, image: &str) -> Result<Option<String>> {
        Ok(self.os_hints.lock().unwrap().get(image).cloned())
    }
}

/// How the scripted API answers health requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Up,
    Down,
    /// Down until the runtime has created a container for the checked port
    UpOnceCreated,
    /// Down for the first `n` health requests
    UpAfterCalls(usize),
}

/// Inspector API answering from a script keyed by image repository
pub struct ScriptedApi {
    runtime: Arc<MockRuntime>,
    health: Mutex<Health>,
    extractions: Mutex<HashMap<String, Result<ExtractionPayload, InspectorError>>>,
    fail_next: Mutex<Option<InspectorError>>,
    pub health_calls: AtomicUsize,
    pub requests: Mutex<Vec<(String, ExtractionRequest)>>,
}

impl ScriptedApi {
    pub fn new(runtime: Arc<MockRuntime>, health: Health) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            health: Mutex::new(health),
            extractions: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(None),
            health_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_health(&self, health: Health) {
        *self.health.lock().unwrap() = health;
    }

    pub fn respond(&self, image_repo: &str, result: Result<ExtractionPayload, InspectorError>) {
        self.extractions
            .lock()
            .unwrap()
            .insert(image_repo.to_string(), result);
    }

    /// The next extraction call fails with `err`, whatever the script says
    pub fn fail_next(&self, err: InspectorError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn requests(&self) -> Vec<(String, ExtractionRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InspectorApi for ScriptedApi {
    async fn health_check(&self, base_url: &str) -> Result<HealthStatus, InspectorError> {
        let calls = self.health_calls.fetch_add(1, Ordering::SeqCst);
        let up = match *self.health.lock().unwrap() {
            Health::Up => true,
            Health::Down => false,
            Health::UpOnceCreated => self.runtime.serves(base_url),
            Health::UpAfterCalls(n) => calls >= n,
        };
        Ok(HealthStatus {
            http_status: if up { 200 } else { 503 },
            status: Some(if up { "UP" } else { "DOWN" }.to_string()),
        })
    }

    async fn request_extraction(
        &self,
        base_url: &str,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, InspectorError> {
        self.requests
            .lock()
            .unwrap()
            .push((base_url.to_string(), request.clone()));

        let injected = self.fail_next.lock().unwrap().take();
        if let Some(err) = injected {
            return Err(err);
        }

        let repo = request.image_repo.clone().unwrap_or_default();
        let scripted = self.extractions.lock().unwrap().get(&repo).cloned();
        match scripted {
            Some(Ok(payload)) => Ok(ExtractionResponse {
                url: format!("{}/getbdio", base_url),
                raw_body: serde_json::to_string(&payload).unwrap(),
                payload,
            }),
            Some(Err(err)) => Err(err),
            None => Err(InspectorError::ExtractionRejected {
                url: format!("{}/getbdio", base_url),
                status_code: 404,
                body: format!("no script for {}", repo),
            }),
        }
    }
}

/// Payload with a flat apk listing
pub fn apk_payload(repo: &str, tag: &str, packages: &[&str]) -> ExtractionPayload {
    serde_json::from_value(serde_json::json!({
        "imageRepo": repo,
        "imageTag": tag,
        "architecture": "x86_64",
        "packageManager": "apk",
        "packages": packages,
    }))
    .unwrap()
}

/// A canned HTTP response
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
    /// Wait this long before answering
    pub delay: Option<Duration>,
    /// Advertise this Content-Length instead of the real one, then hang up
    pub declared_length: Option<usize>,
}

impl CannedResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: None,
            declared_length: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sends the headers and part of the body, then closes the connection
    pub fn cut_off(mut self, declared_length: usize) -> Self {
        self.declared_length = Some(declared_length);
        self
    }
}

/// Minimal HTTP/1.1 server answering by path prefix; returns its base URL
/// and the request targets it has seen
pub async fn spawn_http_server(
    routes: Vec<(&'static str, CannedResponse)>,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_server = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            let seen = seen_by_server.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            read += n;
                            if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                                break;
                            }
                        }
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]).to_string();
                let target = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                seen.lock().unwrap().push(target.clone());

                let response = routes
                    .iter()
                    .find(|(prefix, _)| target.starts_with(prefix))
                    .map(|(_, r)| r.clone())
                    .unwrap_or_else(|| CannedResponse::new(404, "not found"));
                if let Some(delay) = response.delay {
                    tokio::time::sleep(delay).await;
                }
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    response.declared_length.unwrap_or(response.body.len()),
                    response.body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), seen)
}
