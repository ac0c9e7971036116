//! Inspector services: which image to run, how to run it, and how to talk to it

pub mod client;
pub mod images;
pub mod lifecycle;
pub mod os;
pub mod request;
pub mod runtime;

pub use client::{ExtractionResponse, HealthStatus, ImageInspectorClient, InspectorApi};
pub use images::{ImageSettings, InspectorImageRef, InspectorImages};
pub use lifecycle::{LifecycleState, ServiceInstance, ServiceLifecycle};
pub use os::InspectorOs;
pub use request::ExtractionRequest;
pub use runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, DockerRuntime};
