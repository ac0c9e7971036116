//! Stable names derived from image identity and package-manager location
//!
//! Everything here is a pure function of its inputs: re-running an inspection
//! of the same image yields the same code location and artifact file names,
//! which downstream consumers use to match new artifacts with old ones.

use sha1::{Digest, Sha1};

/// Artifact names at or above this length are shortened by hashing segments
pub const MAX_FILE_NAME_LENGTH: usize = 255;

const HASHED_SEGMENT_LENGTH: usize = 15;
const ARTIFACT_SUFFIX: &str = "bdio.jsonld";

/// `{prefix}_{repo}_{tag}_{path}_{name}` with `/` flattened to `_`; a blank prefix is omitted
pub fn code_location_name(
    prefix: Option<&str>,
    image_repo: &str,
    image_tag: &str,
    pkg_mgr_path: &str,
    pkg_mgr_name: &str,
) -> String {
    let base = format!(
        "{}_{}_{}_{}",
        slashes_to_underscores(image_repo),
        image_tag,
        slashes_to_underscores(pkg_mgr_path),
        pkg_mgr_name
    );
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}", prefix, base),
        None => base,
    }
}

/// File name of the persisted dependency document
///
/// When the name would reach [`MAX_FILE_NAME_LENGTH`], segments are replaced
/// one at a time by a truncated content hash, always in the order image,
/// path, project, version, until the name fits or all four are hashed.
pub fn artifact_file_name(
    image_repo: &str,
    pkg_mgr_path: &str,
    project_name: &str,
    version_name: &str,
) -> String {
    let mut segments = [
        clean_image_name(image_repo),
        slashes_to_underscores(pkg_mgr_path),
        slashes_to_underscores(project_name),
        slashes_to_underscores(version_name),
    ];

    let mut name = format_artifact_name(&segments);
    for i in 0..segments.len() {
        if name.len() < MAX_FILE_NAME_LENGTH {
            break;
        }
        segments[i] = segment_digest(&segments[i]);
        name = format_artifact_name(&segments);
    }
    name
}

/// `{repo}_{tag}_containerfilesystem.tar.gz`
pub fn container_fs_tar_file_name(image_repo: &str, image_tag: &str) -> String {
    format!(
        "{}_{}_containerfilesystem.tar.gz",
        slashes_to_underscores(image_repo),
        image_tag
    )
}

/// Image names may carry a registry port or tag, so both `/` and `:` are flattened
pub fn clean_image_name(image_repo: &str) -> String {
    slashes_to_underscores(image_repo).replace(':', "_")
}

fn slashes_to_underscores(value: &str) -> String {
    value.replace('/', "_")
}

fn format_artifact_name(segments: &[String; 4]) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        segments[0], segments[1], segments[2], segments[3], ARTIFACT_SUFFIX
    )
}

fn segment_digest(segment: &str) -> String {
    let mut digest = hex::encode(Sha1::digest(segment.as_bytes()));
    digest.truncate(HASHED_SEGMENT_LENGTH);
    digest
}
