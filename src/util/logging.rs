//! Structured logging setup for image-inspector
//!
//! Logging goes through the `tracing` ecosystem. The subscriber is installed
//! at most once per process; later calls are ignored. `RUST_LOG` wins over
//! the configured level when it is set.
//!
//! ```no_run
//! use image_inspector::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(os = "alpine", "Inspector service ready");
//! ```

use std::env;
use std::sync::Once;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Noisy dependencies held at `warn` unless `RUST_LOG` says otherwise
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "bollard"];

/// Level name reported when no subscriber has been installed
const FALLBACK_LEVEL_NAME: &str = "INFO";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for this crate's own events
    pub level: Level,

    /// One JSON object per event instead of human-readable lines
    pub use_json: bool,

    pub include_target: bool,

    /// File and line of the emitting call site
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with call-site and thread metadata, for log shippers
    pub fn structured(level: Level) -> Self {
        Self {
            level,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    /// [`Self::structured`] or [`Self::with_level`], as `IMAGE_INSPECTOR_LOG_JSON` asks
    pub fn for_level(level: Level) -> Self {
        if json_from_env() {
            Self::structured(level)
        } else {
            Self::with_level(level)
        }
    }
}

/// Parses a level name case-insensitively, defaulting to `INFO`
///
/// ```
/// use image_inspector::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("Debug"), Level::DEBUG);
/// assert_eq!(parse_level("bogus"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("image_inspector={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for target in QUIET_TARGETS {
            if let Ok(directive) = format!("{}=warn", target).parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Installs the global subscriber; only the first call has any effect
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init()
        };

        if let Err(e) = result {
            eprintln!("Logging already initialised elsewhere: {}", e);
        }
    });
}

/// Reads `IMAGE_INSPECTOR_LOG_LEVEL` and `IMAGE_INSPECTOR_LOG_JSON`
pub fn init_from_env() {
    let level = parse_level(
        &env::var("IMAGE_INSPECTOR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
    );
    init_logging(LoggingConfig::for_level(level));
}

/// Whether `IMAGE_INSPECTOR_LOG_JSON` asks for JSON output
pub fn json_from_env() -> bool {
    env::var("IMAGE_INSPECTOR_LOG_JSON")
        .ok()
        .and_then(|v| v.trim().to_lowercase().parse::<bool>().ok())
        .unwrap_or(false)
}

/// Upper-case name of the most verbose level currently enabled
///
/// Passed to inspector services so their own verbosity follows ours.
pub fn current_level_name() -> String {
    level_filter_name(LevelFilter::current())
}

fn level_filter_name(filter: LevelFilter) -> String {
    match filter.into_level() {
        Some(level) => level.as_str().to_string(),
        None => FALLBACK_LEVEL_NAME.to_string(),
    }
}
