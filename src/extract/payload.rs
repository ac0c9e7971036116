use serde::{Deserialize, Serialize};

/// Package manager that produced a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    Apk,
    Dpkg,
    Rpm,
    /// The image has no recognised package manager database
    None,
}

impl PackageManagerKind {
    pub fn name(&self) -> &'static str {
        match self {
            PackageManagerKind::Apk => "apk",
            PackageManagerKind::Dpkg => "dpkg",
            PackageManagerKind::Rpm => "rpm",
            PackageManagerKind::None => "none",
        }
    }

    /// Forge used when the service does not report one
    pub fn default_forge(&self) -> &'static str {
        match self {
            PackageManagerKind::Apk => "alpine",
            PackageManagerKind::Dpkg => "debian",
            PackageManagerKind::Rpm => "centos",
            PackageManagerKind::None => "",
        }
    }

    /// Database location inside the image filesystem
    pub fn default_path(&self) -> &'static str {
        match self {
            PackageManagerKind::Apk => "lib/apk",
            PackageManagerKind::Dpkg => "var/lib/dpkg",
            PackageManagerKind::Rpm => "var/lib/rpm",
            PackageManagerKind::None => "noPkgMgr",
        }
    }
}

/// Package listing as of one filesystem layer, bottom layer first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerListing {
    pub layer_id: String,
    #[serde(default)]
    pub packages: Vec<String>,
}

/// Body of a successful extraction response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPayload {
    #[serde(default)]
    pub image_repo: Option<String>,
    #[serde(default)]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    pub package_manager: PackageManagerKind,
    #[serde(default)]
    pub package_manager_path: Option<String>,
    #[serde(default)]
    pub forge: Option<String>,
    /// Listing of the final image filesystem
    #[serde(default)]
    pub packages: Vec<String>,
    /// Per-layer listings; present when layer organisation was requested
    #[serde(default)]
    pub layers: Vec<LayerListing>,
}

impl ExtractionPayload {
    pub fn forge(&self) -> &str {
        self.forge
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| self.package_manager.default_forge())
    }

    pub fn package_manager_path(&self) -> &str {
        self.package_manager_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.package_manager.default_path())
    }

    pub fn architecture(&self) -> &str {
        self.architecture.as_deref().unwrap_or("")
    }

    /// Listing of the final filesystem, falling back to the top layer
    pub fn final_listing(&self) -> &[String] {
        if self.packages.is_empty() {
            if let Some(top) = self.layers.last() {
                return &top.packages;
            }
        }
        &self.packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_payload() {
        let payload: ExtractionPayload =
            serde_json::from_str(r#"{"packageManager":"apk","packages":["musl-1.1.18-r3"]}"#)
                .unwrap();
        assert_eq!(payload.package_manager, PackageManagerKind::Apk);
        assert_eq!(payload.forge(), "alpine");
        assert_eq!(payload.package_manager_path(), "lib/apk");
        assert_eq!(payload.architecture(), "");
        assert!(payload.layers.is_empty());
    }

    #[test]
    fn test_unknown_package_manager_is_rejected() {
        let result =
            serde_json::from_str::<ExtractionPayload>(r#"{"packageManager":"pacman"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_final_listing_falls_back_to_top_layer() {
        let payload: ExtractionPayload = serde_json::from_str(
            r#"{
                "packageManager": "dpkg",
                "forge": "ubuntu",
                "layers": [
                    {"layerId": "sha256:a", "packages": ["one"]},
                    {"layerId": "sha256:b", "packages": ["one", "two"]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(payload.forge(), "ubuntu");
        assert_eq!(payload.final_listing(), &["one".to_string(), "two".to_string()]);
    }
}
