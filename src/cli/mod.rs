pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, HealthArgs, InspectArgs};
pub use output::{HealthReport, OutputFormat, OutputFormatter};
