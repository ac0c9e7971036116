use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating-system family an inspector service is built for
///
/// Each family runs its own inspector image because the package-manager
/// binaries (`apk`, `rpm`, `dpkg`) must match the target image's database
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectorOs {
    Alpine,
    Centos,
    Ubuntu,
}

impl InspectorOs {
    pub fn all() -> &'static [InspectorOs] {
        &[InspectorOs::Alpine, InspectorOs::Centos, InspectorOs::Ubuntu]
    }

    /// Suffix appended to the image family to form the inspector image name
    pub fn suffix(&self) -> &'static str {
        match self {
            InspectorOs::Alpine => "alpine",
            InspectorOs::Centos => "centos",
            InspectorOs::Ubuntu => "ubuntu",
        }
    }

    pub fn default_host_port(&self) -> u16 {
        match self {
            InspectorOs::Alpine => 9000,
            InspectorOs::Centos => 9001,
            InspectorOs::Ubuntu => 9002,
        }
    }

    pub fn default_container_port(&self) -> u16 {
        match self {
            InspectorOs::Alpine => 8080,
            InspectorOs::Centos => 8081,
            InspectorOs::Ubuntu => 8082,
        }
    }

    /// Maps a free-form distro hint (image label, os-release ID) to a family
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.to_lowercase();
        if hint.contains("alpine") {
            Some(InspectorOs::Alpine)
        } else if ["centos", "rhel", "redhat", "fedora", "amzn", "oracle"]
            .iter()
            .any(|h| hint.contains(h))
        {
            Some(InspectorOs::Centos)
        } else if ["ubuntu", "debian"].iter().any(|h| hint.contains(h)) {
            Some(InspectorOs::Ubuntu)
        } else {
            None
        }
    }
}

impl fmt::Display for InspectorOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for InspectorOs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alpine" => Ok(InspectorOs::Alpine),
            "centos" => Ok(InspectorOs::Centos),
            "ubuntu" => Ok(InspectorOs::Ubuntu),
            other => Err(format!(
                "Unknown inspector OS: {}. Valid options: alpine, centos, ubuntu",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("ALPINE".parse::<InspectorOs>(), Ok(InspectorOs::Alpine));
        assert_eq!(" centos ".parse::<InspectorOs>(), Ok(InspectorOs::Centos));
        assert!("windows".parse::<InspectorOs>().is_err());
    }

    #[test]
    fn test_from_hint() {
        assert_eq!(
            InspectorOs::from_hint("docker.io/library/alpine:3.18"),
            Some(InspectorOs::Alpine)
        );
        assert_eq!(InspectorOs::from_hint("rhel"), Some(InspectorOs::Centos));
        assert_eq!(InspectorOs::from_hint("Debian"), Some(InspectorOs::Ubuntu));
        assert_eq!(InspectorOs::from_hint("busybox"), None);
    }

    #[test]
    fn test_ports_are_distinct() {
        let host: std::collections::HashSet<_> =
            InspectorOs::all().iter().map(|os| os.default_host_port()).collect();
        assert_eq!(host.len(), 3);
        assert_eq!(InspectorOs::Ubuntu.to_string(), "ubuntu");
    }
}
