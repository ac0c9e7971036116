//! Host/container path translation for the shared directory
//!
//! Inspector services only see the shared directory through a bind mount,
//! so any host path handed to them must first be rewritten onto the mount
//! point.

use crate::config::InspectorConfig;
use crate::error::InspectorError;
use std::env;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPaths {
    host_shared_dir: PathBuf,
    container_shared_dir: String,
}

impl ContainerPaths {
    pub fn new(host_shared_dir: impl Into<PathBuf>, container_shared_dir: impl Into<String>) -> Self {
        Self {
            host_shared_dir: normalize(&absolute(&host_shared_dir.into())),
            container_shared_dir: container_shared_dir.into(),
        }
    }

    pub fn from_config(config: &InspectorConfig) -> Self {
        Self::new(&config.shared_dir, config.container_shared_dir.clone())
    }

    /// Rewrites a host path inside the shared directory onto the container mount
    ///
    /// Relative paths are taken from the current directory.
    pub fn to_container_path(&self, host_path: &Path) -> Result<String, InspectorError> {
        let host_path = normalize(&absolute(host_path));
        let relative = host_path.strip_prefix(&self.host_shared_dir).map_err(|_| {
            InspectorError::InvalidConfiguration(format!(
                "{} is not inside the shared directory {}",
                host_path.display(),
                self.host_shared_dir.display()
            ))
        })?;

        let mut translated = self.container_shared_dir.trim_end_matches('/').to_string();
        for part in relative.components() {
            if let Component::Normal(part) = part {
                translated.push('/');
                translated.push_str(&part.to_string_lossy());
            }
        }
        Ok(translated)
    }

    /// `file_name` placed directly in the container-side shared directory
    pub fn in_container_dir(&self, file_name: &str) -> String {
        format!("{}/{}", self.container_shared_dir.trim_end_matches('/'), file_name)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically resolves `.` and `..` so prefix checks cannot be escaped
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
