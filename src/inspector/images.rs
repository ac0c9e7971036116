//! Inspector image directory
//!
//! Maps an OS family to the inspector image to run for it. Built once from
//! three layers of settings: a per-run override, the configured values, and
//! the compiled-in defaults. Lookups after construction are read-only.

use super::os::InspectorOs;
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_INSPECTOR_REPOSITORY: &str = "blackducksoftware";
pub const DEFAULT_INSPECTOR_FAMILY: &str = "blackduck-imageinspector";
pub const DEFAULT_INSPECTOR_VERSION: &str = "4.4.1";

/// One layer of image settings
///
/// `repository: Some("")` is an explicit "no registry prefix" and wins over
/// lower layers; blank family or version values fall through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSettings {
    pub repository: Option<String>,
    pub family: Option<String>,
    pub version: Option<String>,
}

impl ImageSettings {
    pub fn compiled_defaults() -> Self {
        Self {
            repository: Some(DEFAULT_INSPECTOR_REPOSITORY.to_string()),
            family: Some(DEFAULT_INSPECTOR_FAMILY.to_string()),
            version: Some(DEFAULT_INSPECTOR_VERSION.to_string()),
        }
    }

    /// Fills unset fields of `self` from `fallback`
    pub fn or(self, fallback: ImageSettings) -> Self {
        Self {
            repository: self.repository.or(fallback.repository),
            family: non_blank(self.family).or_else(|| non_blank(fallback.family)),
            version: non_blank(self.version).or_else(|| non_blank(fallback.version)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// The inspector image used for one OS family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectorImageRef {
    pub os: InspectorOs,
    pub image_name: String,
    pub image_tag: String,
}

impl InspectorImageRef {
    /// `name:tag` as passed to the container runtime
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }
}

/// Read-only registry of inspector images keyed by OS
#[derive(Debug, Clone)]
pub struct InspectorImages {
    family: String,
    images: HashMap<InspectorOs, InspectorImageRef>,
}

impl InspectorImages {
    /// Resolves `run_override` > `configured` > compiled-in defaults
    pub fn new(run_override: ImageSettings, configured: ImageSettings) -> Self {
        let resolved = run_override
            .or(configured)
            .or(ImageSettings::compiled_defaults());

        let repo_prefix = normalize_repository(resolved.repository.as_deref().unwrap_or(""));
        let family = resolved
            .family
            .unwrap_or_else(|| DEFAULT_INSPECTOR_FAMILY.to_string());
        let version = resolved
            .version
            .unwrap_or_else(|| DEFAULT_INSPECTOR_VERSION.to_string());

        let images = InspectorOs::all()
            .iter()
            .map(|os| {
                (
                    *os,
                    InspectorImageRef {
                        os: *os,
                        image_name: format!("{}{}-{}", repo_prefix, family, os.suffix()),
                        image_tag: version.clone(),
                    },
                )
            })
            .collect();

        Self { family, images }
    }

    pub fn lookup(&self, os: InspectorOs) -> Option<&InspectorImageRef> {
        self.images.get(&os)
    }

    /// Image family, used to label the containers started from these images
    pub fn family(&self) -> &str {
        &self.family
    }
}

impl Default for InspectorImages {
    fn default() -> Self {
        Self::new(ImageSettings::default(), ImageSettings::default())
    }
}

/// Blank stays blank; anything else ends with exactly the `/` it needs
fn normalize_repository(repo: &str) -> String {
    let repo = repo.trim();
    if repo.is_empty() || repo.ends_with('/') {
        repo.to_string()
    } else {
        format!("{}/", repo)
    }
}
