//! Persisting dependency graphs
//!
//! The driver hands finished graphs to a [`GraphSink`] together with the
//! artifact name. [`JsonFileSink`] writes a plain JSON document named after
//! the artifact into the output directory.

use crate::error::InspectorError;
use crate::extract::{Component, DependencyGraph, Relationship};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub trait GraphSink: Send + Sync {
    /// Persists `graph` under `artifact_name`, returning where it went
    fn write(&self, graph: &DependencyGraph, artifact_name: &str) -> Result<PathBuf, InspectorError>;
}

#[derive(Serialize)]
struct GraphDocument<'a> {
    name: &'a str,
    components: Vec<&'a Component>,
    relationships: Vec<&'a Relationship>,
}

pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl GraphSink for JsonFileSink {
    fn write(&self, graph: &DependencyGraph, artifact_name: &str) -> Result<PathBuf, InspectorError> {
        let path = self.output_dir.join(artifact_name);
        let write_error = |message: String| InspectorError::ArtifactWrite {
            path: path.display().to_string(),
            message,
        };

        let document = GraphDocument {
            name: artifact_name,
            components: graph.components().collect(),
            relationships: graph.relationships().collect(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|e| write_error(e.to_string()))?;

        fs::create_dir_all(&self.output_dir).map_err(|e| write_error(e.to_string()))?;
        fs::write(&path, json).map_err(|e| write_error(e.to_string()))?;

        info!(path = %path.display(), components = graph.len(), "Wrote dependency document");
        Ok(path)
    }
}
