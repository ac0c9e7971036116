//! Extraction requests and the URLs that carry them
//!
//! Both service calls are plain GETs. The extraction call encodes every
//! request field as a query parameter in a fixed order so the same request
//! always produces the same URL.

use crate::error::InspectorError;
use reqwest::Url;
use serde::Serialize;

pub const EXTRACTION_ENDPOINT: &str = "getbdio";
pub const HEALTH_ENDPOINT: &str = "health";

const LOGGING_LEVEL_PARAM: &str = "logginglevel";
const TARFILE_PARAM: &str = "tarfile";
const CLEANUP_PARAM: &str = "cleanup";
const RESULTING_CONTAINER_FS_PATH_PARAM: &str = "resultingcontainerfspath";
const IMAGE_REPO_PARAM: &str = "imagerepo";
const IMAGE_TAG_PARAM: &str = "imagetag";
const ORGANIZE_BY_LAYER_PARAM: &str = "organizecomponentsbylayer";
const INCLUDE_REMOVED_PARAM: &str = "includeremovedcomponents";
const PLATFORM_TOP_LAYER_PARAM: &str = "platformtoplayerid";

/// Parameters of one extraction call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionRequest {
    /// Path of the image tarball as seen from inside the service container
    pub tar_path: String,
    pub image_repo: Option<String>,
    pub image_tag: Option<String>,
    /// Where the service should leave the extracted container filesystem
    pub resulting_fs_path: Option<String>,
    pub organize_by_layer: bool,
    pub include_removed_components: bool,
    pub cleanup: bool,
    pub platform_top_layer_id: Option<String>,
}

impl ExtractionRequest {
    pub fn new(tar_path: impl Into<String>) -> Self {
        Self {
            tar_path: tar_path.into(),
            cleanup: true,
            ..Default::default()
        }
    }
}

/// `{base}/{endpoint}`, tolerating stray slashes on either side
pub fn endpoint_url(base_url: &str, endpoint: &str) -> Result<Url, InspectorError> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| {
        InspectorError::InvalidConfiguration(format!("Invalid service URL {}: {}", raw, e))
    })
}

/// Builds the extraction URL
///
/// Parameter order: logging level, tarfile, cleanup, resulting container fs
/// path (when set), image repo and tag (when not blank), then the layer flags.
pub fn extraction_url(
    base_url: &str,
    request: &ExtractionRequest,
    logging_level: &str,
) -> Result<Url, InspectorError> {
    if request.tar_path.trim().is_empty() {
        return Err(InspectorError::InvalidConfiguration(
            "Extraction request is missing the tarfile path".to_string(),
        ));
    }

    let mut url = endpoint_url(base_url, EXTRACTION_ENDPOINT)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(LOGGING_LEVEL_PARAM, logging_level);
        query.append_pair(TARFILE_PARAM, &request.tar_path);
        query.append_pair(CLEANUP_PARAM, bool_param(request.cleanup));
        if let Some(path) = non_blank(&request.resulting_fs_path) {
            query.append_pair(RESULTING_CONTAINER_FS_PATH_PARAM, path);
        }
        if let Some(repo) = non_blank(&request.image_repo) {
            query.append_pair(IMAGE_REPO_PARAM, repo);
        }
        if let Some(tag) = non_blank(&request.image_tag) {
            query.append_pair(IMAGE_TAG_PARAM, tag);
        }
        query.append_pair(ORGANIZE_BY_LAYER_PARAM, bool_param(request.organize_by_layer));
        query.append_pair(
            INCLUDE_REMOVED_PARAM,
            bool_param(request.include_removed_components),
        );
        if let Some(layer) = non_blank(&request.platform_top_layer_id) {
            query.append_pair(PLATFORM_TOP_LAYER_PARAM, layer);
        }
    }
    Ok(url)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
