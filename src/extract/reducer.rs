//! Reduction of raw package listings into a dependency graph
//!
//! The reducer applies the same steps to every format: drop noise, split the
//! line, drop `.`-prefixed virtual packages, derive the external ID and merge
//! by identity. In layered mode each layer's listing is a snapshot of the
//! filesystem after that layer; diffs between consecutive snapshots give the
//! layers that introduced each component, and absence from the top snapshot
//! means a later layer whited it out.

use super::component::{Component, ComponentKey, DependencyGraph};
use super::format::{line_format, LineFormat};
use super::payload::{ExtractionPayload, LayerListing};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Per-run reduction flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceOptions {
    pub organize_by_layer: bool,
    pub include_removed_components: bool,
    /// Layers up to and including this one belong to the base platform and are left out
    pub platform_top_layer_id: Option<String>,
}

pub struct ComponentReducer {
    format: Option<Box<dyn LineFormat>>,
    forge: String,
    architecture: String,
}

impl ComponentReducer {
    pub fn new(
        format: Option<Box<dyn LineFormat>>,
        forge: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            format,
            forge: forge.into(),
            architecture: architecture.into(),
        }
    }

    /// Reducer matching the package manager, forge and architecture the service reported
    pub fn for_payload(payload: &ExtractionPayload) -> Self {
        Self::new(
            line_format(payload.package_manager),
            payload.forge(),
            payload.architecture(),
        )
    }

    /// Reduces one listing to its unique components, keyed by identity
    pub fn reduce_listing<S: AsRef<str>>(&self, lines: &[S]) -> BTreeMap<ComponentKey, Component> {
        let mut components = BTreeMap::new();
        let Some(format) = &self.format else {
            return components;
        };

        for line in lines {
            let line = line.as_ref();
            if format.is_noise(line) {
                trace!(line, "Skipping noise line");
                continue;
            }
            let Some(parsed) = format.split(line) else {
                continue;
            };
            if parsed.name.starts_with('.') {
                debug!(name = %parsed.name, "Skipping virtual package");
                continue;
            }
            let architecture = parsed
                .architecture
                .unwrap_or_else(|| self.architecture.clone());
            let component =
                Component::new(parsed.name, parsed.version, architecture, self.forge.clone());
            trace!(external_id = %component.external_id, "Constructed component");
            components.entry(component.key()).or_insert(component);
        }
        components
    }

    /// Reduces a whole extraction payload according to `options`
    pub fn reduce(&self, payload: &ExtractionPayload, options: &ReduceOptions) -> DependencyGraph {
        let platform_cut = self.platform_cut(&payload.layers, options);

        if options.organize_by_layer {
            if payload.layers.is_empty() {
                warn!("Layer organisation requested but the service returned no layers; building a flat graph");
            } else {
                return self.reduce_layers(&payload.layers, platform_cut, options);
            }
        }

        let platform = platform_cut
            .map(|cut| self.reduce_listing(payload.layers[cut].packages.as_slice()))
            .unwrap_or_default();

        let mut graph = DependencyGraph::new();
        for (key, component) in self.reduce_listing(payload.final_listing()) {
            if platform.contains_key(&key) {
                continue;
            }
            graph.add_component(component);
        }
        debug!(components = graph.len(), "Reduced flat listing");
        graph
    }

    fn reduce_layers(
        &self,
        layers: &[LayerListing],
        platform_cut: Option<usize>,
        options: &ReduceOptions,
    ) -> DependencyGraph {
        let snapshots: Vec<_> = layers
            .iter()
            .map(|layer| self.reduce_listing(layer.packages.as_slice()))
            .collect();
        let top = snapshots.last().cloned().unwrap_or_default();

        let mut graph = DependencyGraph::new();
        for (index, layer) in layers.iter().enumerate() {
            if platform_cut.map_or(false, |cut| index <= cut) {
                continue;
            }

            let layer_key = graph.add_component(Component::layer(index, &layer.layer_id));
            let previous = index.checked_sub(1).map(|i| &snapshots[i]);

            for (key, component) in &snapshots[index] {
                if previous.map_or(false, |p| p.contains_key(key)) {
                    continue;
                }

                let mut component = component.clone();
                component.layers.insert(layer.layer_id.clone());
                component.removed = !top.contains_key(key);
                if component.removed && !options.include_removed_components {
                    trace!(external_id = %component.external_id, layer = %layer.layer_id, "Omitting removed component");
                    continue;
                }

                let key = graph.add_component(component);
                graph.add_relationship(&layer_key, &key);
            }
        }

        debug!(
            layers = layers.len(),
            components = graph.len(),
            relationships = graph.relationship_count(),
            "Reduced layered listing"
        );
        graph
    }

    fn platform_cut(&self, layers: &[LayerListing], options: &ReduceOptions) -> Option<usize> {
        let top_id = options.platform_top_layer_id.as_deref()?;
        let cut = layers.iter().position(|l| l.layer_id == top_id);
        if cut.is_none() {
            warn!(layer = top_id, "Platform top layer not found in image; nothing excluded");
        }
        cut
    }
}
