//! Orchestration of inspection runs
//!
//! For every target the driver resolves the OS family, builds the extraction
//! request, acquires a service, calls it, reduces the payload and names the
//! result. Targets of one run are inspected concurrently and reported
//! separately; services are released once every target has finished,
//! whatever the outcome.

use crate::config::InspectorConfig;
use crate::error::InspectorError;
use crate::extract::{ComponentReducer, DependencyGraph, PackageManagerKind, ReduceOptions};
use crate::inspector::{
    ContainerRuntime, ExtractionRequest, ExtractionResponse, InspectorApi, InspectorImages,
    InspectorOs, ServiceInstance, ServiceLifecycle,
};
use crate::naming::{artifact_file_name, code_location_name, container_fs_tar_file_name};
use crate::paths::ContainerPaths;
use crate::sink::GraphSink;
use futures_util::future::join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LATEST_TAG: &str = "latest";

/// Repository, tag and digest of the image under inspection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIdentity {
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageIdentity {
    /// Parses `[registry[:port]/]name[:tag][@digest]`
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        let (rest, digest) = match reference.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (reference, None),
        };

        // A ':' before the last '/' belongs to a registry port, not a tag
        let name_start = rest.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match rest[name_start..].rfind(':') {
            Some(i) => {
                let split = name_start + i;
                (&rest[..split], Some(rest[split + 1..].to_string()))
            }
            None => (rest, None),
        };

        Self {
            repository: repository.to_string(),
            tag: tag.filter(|t| !t.is_empty()),
            digest: digest.filter(|d| !d.is_empty()),
        }
    }

    pub fn tag_or_latest(&self) -> &str {
        self.tag.as_deref().unwrap_or(LATEST_TAG)
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// One image to inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionTarget {
    pub image: ImageIdentity,
    /// Host path of the image tarball, inside the shared directory
    pub tar_path: PathBuf,
    /// Explicit OS family; resolved from image metadata when absent
    pub os: Option<InspectorOs>,
}

impl InspectionTarget {
    pub fn new(image: ImageIdentity, tar_path: impl Into<PathBuf>) -> Self {
        Self {
            image,
            tar_path: tar_path.into(),
            os: None,
        }
    }

    pub fn with_os(mut self, os: InspectorOs) -> Self {
        self.os = Some(os);
        self
    }

    /// Repository, or the tarball's file stem when the image was not named
    pub fn display_name(&self) -> String {
        if !self.image.repository.trim().is_empty() {
            return self.image.repository.clone();
        }
        self.tar_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub image: ImageIdentity,
    pub os: InspectorOs,
    pub package_manager: PackageManagerKind,
    pub graph: DependencyGraph,
    pub artifact_name: String,
    pub code_location_name: String,
    /// Where the sink stored the graph, when a sink is attached
    pub artifact_path: Option<PathBuf>,
    pub raw_response_body: String,
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub target: InspectionTarget,
    pub result: Result<ExtractionResult, InspectorError>,
}

/// Per-image results of one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<ImageOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&InspectionTarget, &InspectorError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.target, e)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

pub struct InspectionDriver {
    config: Arc<InspectorConfig>,
    lifecycle: Arc<ServiceLifecycle>,
    runtime: Arc<dyn ContainerRuntime>,
    api: Arc<dyn InspectorApi>,
    paths: ContainerPaths,
    sink: Option<Arc<dyn GraphSink>>,
}

impl InspectionDriver {
    pub fn new(
        config: Arc<InspectorConfig>,
        images: Arc<InspectorImages>,
        runtime: Arc<dyn ContainerRuntime>,
        api: Arc<dyn InspectorApi>,
    ) -> Self {
        let lifecycle = Arc::new(ServiceLifecycle::new(
            config.clone(),
            images,
            runtime.clone(),
            api.clone(),
        ));
        Self {
            paths: ContainerPaths::from_config(&config),
            config,
            lifecycle,
            runtime,
            api,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn GraphSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn lifecycle(&self) -> &ServiceLifecycle {
        &self.lifecycle
    }

    /// Inspects every target, then releases every service acquired on the way
    pub async fn run(&self, targets: Vec<InspectionTarget>) -> RunReport {
        info!(targets = targets.len(), "Starting inspection run");

        let outcomes = join_all(targets.into_iter().map(|target| async move {
            let result = self.inspect(&target).await;
            match &result {
                Ok(r) => info!(image = %target.display_name(), artifact = %r.artifact_name, components = r.graph.len(), "Inspection succeeded"),
                Err(e) => error!(image = %target.display_name(), kind = e.kind(), error = %e, "Inspection failed"),
            }
            ImageOutcome { target, result }
        }))
        .await;

        self.shutdown().await;
        RunReport { outcomes }
    }

    /// Best-effort release of every acquired service
    pub async fn shutdown(&self) {
        self.lifecycle.release_all().await;
    }

    pub async fn inspect(&self, target: &InspectionTarget) -> Result<ExtractionResult, InspectorError> {
        let request = self.build_request(target)?;
        let os = self.resolve_os(target).await;
        let instance = self.lifecycle.acquire(os).await?;
        let response = self.extract(&instance, &request).await?;

        let payload = &response.payload;
        let options = ReduceOptions {
            organize_by_layer: self.config.organize_by_layer,
            include_removed_components: self.config.include_removed_components,
            platform_top_layer_id: self.config.platform_top_layer_id.clone(),
        };
        let graph = ComponentReducer::for_payload(payload).reduce(payload, &options);

        let repo = payload
            .image_repo
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| target.display_name());
        let tag = payload
            .image_tag
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| target.image.tag_or_latest().to_string());
        let pkg_mgr_path = payload.package_manager_path();
        let project = self.config.project_name.as_deref().unwrap_or(&repo);
        let version = self.config.version_name.as_deref().unwrap_or(&tag);

        let artifact_name = artifact_file_name(&repo, pkg_mgr_path, project, version);
        let code_location_name = code_location_name(
            self.config.code_location_prefix.as_deref(),
            &repo,
            &tag,
            pkg_mgr_path,
            payload.package_manager.name(),
        );
        debug!(%artifact_name, %code_location_name, "Named extraction result");

        let artifact_path = match &self.sink {
            Some(sink) => Some(sink.write(&graph, &artifact_name)?),
            None => None,
        };

        Ok(ExtractionResult {
            image: target.image.clone(),
            os,
            package_manager: payload.package_manager,
            graph,
            artifact_name,
            code_location_name,
            artifact_path,
            raw_response_body: response.raw_body,
        })
    }

    /// Explicit OS, then the image metadata hint, then the configured default
    pub async fn resolve_os(&self, target: &InspectionTarget) -> InspectorOs {
        if let Some(os) = target.os {
            return os;
        }

        if !target.image.repository.trim().is_empty() {
            match self.runtime.image_os_hint(&target.image.to_string()).await {
                Ok(Some(hint)) => {
                    if let Some(os) = InspectorOs::from_hint(&hint) {
                        debug!(image = %target.image, %hint, %os, "OS resolved from image metadata");
                        return os;
                    }
                    debug!(image = %target.image, %hint, "Unrecognised OS hint");
                }
                Ok(None) => {}
                Err(e) => debug!(image = %target.image, error = %e, "Image metadata unavailable"),
            }
        }

        debug!(os = %self.config.default_distro, "Using default distro");
        self.config.default_distro
    }

    fn build_request(&self, target: &InspectionTarget) -> Result<ExtractionRequest, InspectorError> {
        let tar_path = self.paths.to_container_path(&target.tar_path)?;
        let name = target.display_name();

        let resulting_fs_path = self.config.output_container_fs.then(|| {
            self.paths.in_container_dir(&container_fs_tar_file_name(
                &name,
                target.image.tag_or_latest(),
            ))
        });

        Ok(ExtractionRequest {
            tar_path,
            image_repo: Some(target.image.repository.clone()),
            image_tag: target.image.tag.clone(),
            resulting_fs_path,
            organize_by_layer: self.config.organize_by_layer,
            include_removed_components: self.config.include_removed_components,
            cleanup: self.config.cleanup,
            platform_top_layer_id: self.config.platform_top_layer_id.clone(),
        })
    }

    /// One extraction call under an in-flight lease
    ///
    /// A request that never connected to a service this process just started
    /// is sent once more after waiting for health again. Anything the service
    /// may have received (timeouts, cut-off bodies, HTTP errors) is returned
    /// as-is.
    async fn extract(
        &self,
        instance: &ServiceInstance,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, InspectorError> {
        let _lease = instance.lease().await;
        match self.api.request_extraction(&instance.base_url, request).await {
            Err(err) if err.is_transient() && instance.started_by_us => {
                warn!(error = %err, "Freshly started service refused the connection; checking health once more");
                self.lifecycle.wait_until_healthy(&instance.base_url).await?;
                self.api.request_extraction(&instance.base_url, request).await
            }
            other => other,
        }
    }
}

/// Targets for a tarball holding one or more images
pub fn targets_for_tar(
    tar_path: &Path,
    images: &[String],
    os: Option<InspectorOs>,
) -> Vec<InspectionTarget> {
    let identities: Vec<ImageIdentity> = if images.is_empty() {
        vec![ImageIdentity::default()]
    } else {
        images.iter().map(|i| ImageIdentity::parse(i)).collect()
    };

    identities
        .into_iter()
        .map(|image| InspectionTarget {
            image,
            tar_path: tar_path.to_path_buf(),
            os,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_references() {
        let image = ImageIdentity::parse("alpine:3.6");
        assert_eq!(image.repository, "alpine");
        assert_eq!(image.tag.as_deref(), Some("3.6"));

        let image = ImageIdentity::parse("library/ubuntu");
        assert_eq!(image.repository, "library/ubuntu");
        assert!(image.tag.is_none());
        assert_eq!(image.tag_or_latest(), "latest");
    }

    #[test]
    fn test_parse_registry_port_and_digest() {
        let image = ImageIdentity::parse("registry.local:5000/team/app:1.2@sha256:abcd");
        assert_eq!(image.repository, "registry.local:5000/team/app");
        assert_eq!(image.tag.as_deref(), Some("1.2"));
        assert_eq!(image.digest.as_deref(), Some("sha256:abcd"));
        assert_eq!(image.to_string(), "registry.local:5000/team/app:1.2@sha256:abcd");

        let image = ImageIdentity::parse("registry.local:5000/team/app");
        assert_eq!(image.repository, "registry.local:5000/team/app");
        assert!(image.tag.is_none());
    }

    #[test]
    fn test_targets_for_aggregate_tar() {
        let targets = targets_for_tar(
            Path::new("/shared/multi.tar"),
            &["alpine:3.6".to_string(), "centos:7".to_string()],
            None,
        );
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].image.repository, "centos");

        let targets = targets_for_tar(Path::new("/shared/single.tar"), &[], Some(InspectorOs::Alpine));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].display_name(), "single");
        assert_eq!(targets[0].os, Some(InspectorOs::Alpine));
    }

    #[test]
    fn test_report_counts() {
        let target = InspectionTarget::new(ImageIdentity::parse("a:1"), "/shared/a.tar");
        let report = RunReport {
            outcomes: vec![ImageOutcome {
                target,
                result: Err(InspectorError::InvalidConfiguration("x".to_string())),
            }],
        };
        assert!(!report.all_succeeded());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.succeeded().count(), 0);
    }
}
