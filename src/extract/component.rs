//! Components and the dependency graph they form
//!
//! A component's identity is `(name, version, architecture, forge)`. The graph
//! keeps at most one node per identity; adding a component that is already
//! present merges the two instead of duplicating the node.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Forge of the synthetic per-layer components in layered graphs
pub const LAYER_FORGE: &str = "layer";

/// Identity of a component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentKey {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub forge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub forge: String,
    /// `name/version/architecture`
    pub external_id: String,
    /// Layers that introduced the component (layered graphs only)
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub layers: BTreeSet<String>,
    /// Set when the component was deleted by a later layer
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
        forge: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        let architecture = architecture.into();
        let external_id = format!("{}/{}/{}", name, version, architecture);
        Self {
            name,
            version,
            architecture,
            forge: forge.into(),
            external_id,
            layers: BTreeSet::new(),
            removed: false,
        }
    }

    /// Synthetic node standing for one filesystem layer
    pub fn layer(index: usize, layer_id: &str) -> Self {
        let name = format!("Layer{:02}_{}", index, layer_id.replace(':', "_"));
        Self {
            external_id: name.clone(),
            name,
            version: String::new(),
            architecture: String::new(),
            forge: LAYER_FORGE.to_string(),
            layers: BTreeSet::new(),
            removed: false,
        }
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey {
            name: self.name.clone(),
            version: self.version.clone(),
            architecture: self.architecture.clone(),
            forge: self.forge.clone(),
        }
    }

    pub fn is_layer(&self) -> bool {
        self.forge == LAYER_FORGE
    }
}

/// Directed "depends-on" edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Relationship {
    pub parent: ComponentKey,
    pub child: ComponentKey,
}

/// Deduplicated component set plus edges between members of that set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    components: BTreeMap<ComponentKey, Component>,
    relationships: BTreeSet<Relationship>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `component`, merging with an existing node of the same identity
    ///
    /// Merging unions the introducing layers. A merged node is only marked
    /// removed when every contribution was removed.
    pub fn add_component(&mut self, component: Component) -> ComponentKey {
        let key = component.key();
        match self.components.get_mut(&key) {
            Some(existing) => {
                existing.layers.extend(component.layers);
                existing.removed = existing.removed && component.removed;
            }
            None => {
                self.components.insert(key.clone(), component);
            }
        }
        key
    }

    /// Adds an edge; refuses edges whose endpoints are not in the graph
    pub fn add_relationship(&mut self, parent: &ComponentKey, child: &ComponentKey) -> bool {
        if !self.components.contains_key(parent) || !self.components.contains_key(child) {
            return false;
        }
        self.relationships.insert(Relationship {
            parent: parent.clone(),
            child: child.clone(),
        })
    }

    pub fn get(&self, key: &ComponentKey) -> Option<&Component> {
        self.components.get(key)
    }

    /// Components in identity order
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Package components, leaving out synthetic layer nodes
    pub fn packages(&self) -> impl Iterator<Item = &Component> {
        self.components.values().filter(|c| !c.is_layer())
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    pub fn children_of<'a>(&'a self, parent: &'a ComponentKey) -> impl Iterator<Item = &'a Component> {
        self.relationships
            .iter()
            .filter(move |r| &r.parent == parent)
            .filter_map(move |r| self.components.get(&r.child))
    }

    pub fn external_ids(&self) -> Vec<String> {
        self.packages().map(|c| c.external_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}
