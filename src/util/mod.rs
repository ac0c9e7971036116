//! Shared helpers

pub mod logging;

pub use logging::{current_level_name, init_from_env, init_logging, LoggingConfig};
