//! Configuration management for image-inspector
//!
//! Settings load from environment variables with compiled-in defaults, and
//! command-line flags override individual fields afterwards. The resulting
//! [`InspectorConfig`] is built once at process start and shared read-only.
//!
//! # Environment Variables
//!
//! ## Inspector images
//! - `IMAGE_INSPECTOR_REPOSITORY`: Registry/namespace prefix for inspector images - default: "blackducksoftware"
//! - `IMAGE_INSPECTOR_IMAGE_FAMILY`: Image family - default: "blackduck-imageinspector"
//! - `IMAGE_INSPECTOR_IMAGE_VERSION`: Image tag - default: the compiled-in inspector version
//!
//! ## Service lifecycle
//! - `IMAGE_INSPECTOR_SERVICE_URL`: Use an already running service at this URL
//! - `IMAGE_INSPECTOR_SERVICE_START`: Start inspector containers as needed (true|false) - default: "true"
//! - `IMAGE_INSPECTOR_SERVICE_HOST`: Host the started services are reached on - default: "localhost"
//! - `IMAGE_INSPECTOR_COMMAND_TIMEOUT`: Per-operation timeout in seconds - default: "120"
//! - `IMAGE_INSPECTOR_POLL_INTERVAL_MS`: Health check interval - default: "1000"
//! - `IMAGE_INSPECTOR_DEFAULT_DISTRO`: OS used when the target OS is unknown - default: "ubuntu"
//! - `IMAGE_INSPECTOR_SHARED_DIR`: Host directory shared with the service - default: system temp dir + "image-inspector/shared"
//! - `IMAGE_INSPECTOR_CONTAINER_SHARED_DIR`: Mount point of the shared directory inside the service
//!
//! ## Run flags
//! - `IMAGE_INSPECTOR_OUTPUT_DIR`: Where artifacts are written - default: "."
//! - `IMAGE_INSPECTOR_ORGANIZE_BY_LAYER`, `IMAGE_INSPECTOR_INCLUDE_REMOVED`,
//!   `IMAGE_INSPECTOR_CLEANUP`, `IMAGE_INSPECTOR_OUTPUT_CONTAINER_FS`: booleans
//! - `IMAGE_INSPECTOR_KEEP_CONTAINERS`: Leave started inspector containers running - default: "false"
//! - `IMAGE_INSPECTOR_CODE_LOCATION_PREFIX`, `IMAGE_INSPECTOR_PLATFORM_TOP_LAYER_ID`
//! - `IMAGE_INSPECTOR_LOG_LEVEL`: Logging level - default: "info"

use crate::inspector::images::ImageSettings;
use crate::inspector::os::InspectorOs;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SERVICE_HOST: &str = "localhost";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_CONTAINER_SHARED_DIR: &str = "/opt/blackduck/blackduck-imageinspector/shared";
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// How inspector services are obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMode {
    /// Reuse the service already running at this URL; never start or stop containers
    External { url: String },
    /// Start inspector containers on demand and tear them down at the end of the run
    StartAsNeeded,
}

/// Host and container port of one inspector service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePorts {
    pub host: u16,
    pub container: u16,
}

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Inspector image repository/family/version as configured (before per-run overrides)
    pub images: ImageSettings,

    pub service_mode: ServiceMode,

    /// Host name used to reach services this process starts
    pub service_host: String,

    /// Ports per OS family
    pub ports: HashMap<InspectorOs, ServicePorts>,

    /// Bound on each suspension point: container start, health checks, extraction call
    pub command_timeout: Duration,

    /// Fixed interval between health checks
    pub poll_interval: Duration,

    /// OS used when neither the caller nor the image metadata names one
    pub default_distro: InspectorOs,

    /// Directory shared with inspector containers (host side)
    pub shared_dir: PathBuf,

    /// Where `shared_dir` is mounted inside inspector containers
    pub container_shared_dir: String,

    pub output_dir: PathBuf,

    pub organize_by_layer: bool,
    pub include_removed_components: bool,
    /// Tells the service to remove its working files after each extraction
    pub cleanup: bool,

    /// Leave inspector containers started by this run in place on release
    pub keep_containers: bool,

    /// Ask the service to leave the extracted container filesystem in the shared directory
    pub output_container_fs: bool,

    pub code_location_prefix: Option<String>,
    pub project_name: Option<String>,
    pub version_name: Option<String>,
    pub platform_top_layer_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for InspectorConfig {
    /// Loads from `IMAGE_INSPECTOR_*` environment variables, falling back to
    /// defaults for anything unset or unparsable
    fn default() -> Self {
        let images = ImageSettings {
            repository: env::var("IMAGE_INSPECTOR_REPOSITORY").ok(),
            family: non_blank_env("IMAGE_INSPECTOR_IMAGE_FAMILY"),
            version: non_blank_env("IMAGE_INSPECTOR_IMAGE_VERSION"),
        };

        let service_start = env_bool("IMAGE_INSPECTOR_SERVICE_START").unwrap_or(true);
        let service_mode = match non_blank_env("IMAGE_INSPECTOR_SERVICE_URL") {
            Some(url) if !service_start => ServiceMode::External { url },
            _ => ServiceMode::StartAsNeeded,
        };

        let command_timeout = Duration::from_secs(
            env_parse("IMAGE_INSPECTOR_COMMAND_TIMEOUT").unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        );
        let poll_interval = Duration::from_millis(
            env_parse("IMAGE_INSPECTOR_POLL_INTERVAL_MS").unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );

        let default_distro = non_blank_env("IMAGE_INSPECTOR_DEFAULT_DISTRO")
            .and_then(|v| v.parse().ok())
            .unwrap_or(InspectorOs::Ubuntu);

        let shared_dir = non_blank_env("IMAGE_INSPECTOR_SHARED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("image-inspector").join("shared"));

        let log_level = env::var("IMAGE_INSPECTOR_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            images,
            service_mode,
            service_host: non_blank_env("IMAGE_INSPECTOR_SERVICE_HOST")
                .unwrap_or_else(|| DEFAULT_SERVICE_HOST.to_string()),
            ports: default_ports(),
            command_timeout,
            poll_interval,
            default_distro,
            shared_dir,
            container_shared_dir: non_blank_env("IMAGE_INSPECTOR_CONTAINER_SHARED_DIR")
                .unwrap_or_else(|| DEFAULT_CONTAINER_SHARED_DIR.to_string()),
            output_dir: non_blank_env("IMAGE_INSPECTOR_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            organize_by_layer: env_bool("IMAGE_INSPECTOR_ORGANIZE_BY_LAYER").unwrap_or(false),
            include_removed_components: env_bool("IMAGE_INSPECTOR_INCLUDE_REMOVED")
                .unwrap_or(false),
            cleanup: env_bool("IMAGE_INSPECTOR_CLEANUP").unwrap_or(true),
            keep_containers: env_bool("IMAGE_INSPECTOR_KEEP_CONTAINERS").unwrap_or(false),
            output_container_fs: env_bool("IMAGE_INSPECTOR_OUTPUT_CONTAINER_FS").unwrap_or(false),
            code_location_prefix: non_blank_env("IMAGE_INSPECTOR_CODE_LOCATION_PREFIX"),
            project_name: None,
            version_name: None,
            platform_top_layer_id: non_blank_env("IMAGE_INSPECTOR_PLATFORM_TOP_LAYER_ID"),
            log_level,
        }
    }
}

impl InspectorConfig {
    /// Validates the configuration
    ///
    /// Checks timeout bounds, the health check interval, the external service URL and
    /// the log level. Runs before any container or network action.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "Command timeout must be at least 1 second".to_string(),
            ));
        }
        if self.command_timeout > Duration::from_secs(MAX_COMMAND_TIMEOUT_SECS) {
            return Err(ConfigError::ValidationFailed(format!(
                "Command timeout cannot exceed {} seconds",
                MAX_COMMAND_TIMEOUT_SECS
            )));
        }

        if self.poll_interval.is_zero() || self.poll_interval >= self.command_timeout {
            return Err(ConfigError::ValidationFailed(format!(
                "Poll interval ({}ms) must be positive and shorter than the command timeout",
                self.poll_interval.as_millis()
            )));
        }

        if let ServiceMode::External { url } = &self.service_mode {
            let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::ParseError {
                field: "service URL".to_string(),
                error: format!("{}: {}", url, e),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationFailed(format!(
                    "Service URL must use http or https: {}",
                    url
                )));
            }
        }

        if self.container_shared_dir.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Container shared directory must not be empty".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Ports for `os`, falling back to the family defaults
    pub fn ports_for(&self, os: InspectorOs) -> ServicePorts {
        self.ports.get(&os).copied().unwrap_or(ServicePorts {
            host: os.default_host_port(),
            container: os.default_container_port(),
        })
    }
}

fn default_ports() -> HashMap<InspectorOs, ServicePorts> {
    InspectorOs::all()
        .iter()
        .map(|os| {
            (
                *os,
                ServicePorts {
                    host: os.default_host_port(),
                    container: os.default_container_port(),
                },
            )
        })
        .collect()
}

fn non_blank_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| v.trim().to_lowercase().parse().ok())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
