use image_inspector::cli::commands::{CliArgs, Commands};
use image_inspector::cli::handlers::{handle_health, handle_inspect};
use image_inspector::util::logging::{init_from_env, init_logging, parse_level, LoggingConfig};
use image_inspector::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("image-inspector v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Inspect(inspect_args) => handle_inspect(inspect_args).await,
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        init_from_env();
        return;
    };

    init_logging(LoggingConfig::for_level(level));
}
