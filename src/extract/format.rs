//! Line formats of the supported package managers
//!
//! Formats differ only in how one line of listing output is split into a
//! name, a version and (sometimes) an architecture. Everything else about
//! reduction is shared and lives in [`super::reducer`].

use super::payload::PackageManagerKind;
use tracing::{debug, trace};

/// One package line after splitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLine {
    pub name: String,
    pub version: String,
    /// Architecture carried on the line itself, overriding the image architecture
    pub architecture: Option<String>,
}

pub trait LineFormat: Send + Sync {
    fn kind(&self) -> PackageManagerKind;

    /// Lines that carry no package: warnings, headers, blank lines
    fn is_noise(&self, line: &str) -> bool;

    /// Splits a non-noise line; `None` when the line does not fit the format
    fn split(&self, line: &str) -> Option<PackageLine>;
}

/// Returns the line format for `kind`, or `None` for images without a package manager
pub fn line_format(kind: PackageManagerKind) -> Option<Box<dyn LineFormat>> {
    match kind {
        PackageManagerKind::Apk => Some(Box::new(ApkFormat)),
        PackageManagerKind::Dpkg => Some(Box::new(DpkgFormat)),
        PackageManagerKind::Rpm => Some(Box::new(RpmFormat)),
        PackageManagerKind::None => None,
    }
}

/// `apk info -v`: `name-with-dashes-version-release`
#[derive(Debug, Clone, Copy, Default)]
pub struct ApkFormat;

impl LineFormat for ApkFormat {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Apk
    }

    fn is_noise(&self, line: &str) -> bool {
        is_blank_or_warning(line)
    }

    fn split(&self, line: &str) -> Option<PackageLine> {
        let (name, version) = split_name_version(line.trim())?;
        Some(PackageLine {
            name,
            version,
            architecture: None,
        })
    }
}

/// `rpm -qa`: `name-version-release.arch`
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmFormat;

const RPM_ARCHITECTURES: &[&str] = &[
    "x86_64", "i386", "i486", "i586", "i686", "noarch", "aarch64", "armv7hl", "ppc64le", "ppc64",
    "s390x",
];

impl LineFormat for RpmFormat {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Rpm
    }

    fn is_noise(&self, line: &str) -> bool {
        is_blank_or_warning(line)
    }

    fn split(&self, line: &str) -> Option<PackageLine> {
        let line = line.trim();
        let (nvr, architecture) = match line.rsplit_once('.') {
            Some((nvr, arch)) if RPM_ARCHITECTURES.contains(&arch) => (nvr, Some(arch.to_string())),
            _ => (line, None),
        };
        let (name, version) = split_name_version(nvr)?;
        Some(PackageLine {
            name,
            version,
            architecture,
        })
    }
}

/// `dpkg -l`: `ii  name[:arch]  version  arch  description`
#[derive(Debug, Clone, Copy, Default)]
pub struct DpkgFormat;

impl LineFormat for DpkgFormat {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Dpkg
    }

    fn is_noise(&self, line: &str) -> bool {
        // Header rows and packages in states other than installed
        !line.trim_start().starts_with("ii ")
    }

    fn split(&self, line: &str) -> Option<PackageLine> {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 4 {
            debug!(line, "Skipping dpkg line with too few columns");
            return None;
        }
        let name = columns[1].split(':').next().unwrap_or(columns[1]);
        Some(PackageLine {
            name: name.to_string(),
            version: columns[2].to_string(),
            architecture: Some(columns[3].to_string()),
        })
    }
}

fn is_blank_or_warning(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.to_lowercase().starts_with("warning")
}

/// The last two `-` tokens form the version; everything before is the name
fn split_name_version(value: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() < 3 {
        debug!(line = value, "Skipping package line without name-version-release");
        return None;
    }
    let split_at = parts.len() - 2;
    let version = parts[split_at..].join("-");
    let name = parts[..split_at]
        .iter()
        .filter(|p| !p.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");
    trace!(name = %name, version = %version, "Split package line");
    if name.is_empty() {
        return None;
    }
    Some((name, version))
}
