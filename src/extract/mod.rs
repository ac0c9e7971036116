//! Turning inspector output into dependency graphs

pub mod component;
pub mod format;
pub mod payload;
pub mod reducer;

pub use component::{Component, ComponentKey, DependencyGraph, Relationship};
pub use format::{line_format, ApkFormat, DpkgFormat, LineFormat, PackageLine, RpmFormat};
pub use payload::{ExtractionPayload, LayerListing, PackageManagerKind};
pub use reducer::{ComponentReducer, ReduceOptions};
