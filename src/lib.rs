//! image-inspector - package inventories for container images
//!
//! Container images are inspected by OS-matched inspector services: an
//! Alpine image needs `apk`, a CentOS image `rpm`, an Ubuntu image `dpkg`.
//! This library decides which service an image needs, starts or reuses it,
//! asks it for the image's package listing and reduces that listing into a
//! deduplicated dependency graph with a stable artifact name.
//!
//! # Example Usage
//!
//! ```no_run
//! use image_inspector::driver::{targets_for_tar, InspectionDriver};
//! use image_inspector::inspector::{DockerRuntime, ImageInspectorClient, InspectorImages};
//! use image_inspector::InspectorConfig;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Arc::new(InspectorConfig::default());
//! let images = Arc::new(InspectorImages::new(Default::default(), config.images.clone()));
//! let runtime = Arc::new(DockerRuntime::connect()?);
//! let api = Arc::new(ImageInspectorClient::new(config.command_timeout)?);
//!
//! let driver = InspectionDriver::new(config, images, runtime, api);
//! let targets = targets_for_tar(Path::new("/tmp/image-inspector/shared/alpine.tar"), &["alpine:3.6".into()], None);
//! let report = driver.run(targets).await;
//! for result in report.succeeded() {
//!     println!("{}: {} components", result.artifact_name, result.graph.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`inspector`]: inspector images, container runtime, service lifecycle and HTTP client
//! - [`extract`]: package-line formats and reduction into a [`DependencyGraph`]
//! - [`naming`]: code location and artifact file names
//! - [`driver`]: per-run orchestration and reporting

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod extract;
pub mod inspector;
pub mod naming;
pub mod paths;
pub mod sink;
pub mod util;

pub use config::{ConfigError, InspectorConfig, ServiceMode};
pub use driver::{ExtractionResult, ImageIdentity, InspectionDriver, InspectionTarget, RunReport};
pub use error::InspectorError;
pub use extract::{Component, DependencyGraph};
pub use inspector::{InspectorOs, ServiceLifecycle};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
