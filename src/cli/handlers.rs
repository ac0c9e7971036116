use super::commands::{HealthArgs, InspectArgs};
use super::output::{HealthReport, OutputFormatter};
use crate::config::{ConfigError, InspectorConfig, ServiceMode};
use crate::driver::{targets_for_tar, InspectionDriver};
use crate::inspector::{
    DockerRuntime, ImageInspectorClient, ImageSettings, InspectorApi, InspectorImages, InspectorOs,
};
use crate::paths::ContainerPaths;
use crate::sink::JsonFileSink;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_CONFIG: i32 = 2;

/// Environment configuration with the inspect flags applied on top
pub fn inspect_config(args: &InspectArgs) -> Result<InspectorConfig, ConfigError> {
    let mut config = InspectorConfig::default();

    if let Some(url) = &args.service_url {
        config.service_mode = ServiceMode::External { url: url.clone() };
    }
    if let Some(secs) = args.timeout {
        config.command_timeout = Duration::from_secs(secs);
    }
    if let Some(dir) = &args.shared_dir {
        config.shared_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    config.organize_by_layer |= args.organize_by_layer;
    config.include_removed_components |= args.include_removed;
    config.output_container_fs |= args.output_container_fs;
    if args.no_cleanup {
        config.cleanup = false;
    }
    config.keep_containers |= args.keep_containers;
    if args.code_location_prefix.is_some() {
        config.code_location_prefix = args.code_location_prefix.clone();
    }
    if args.project_name.is_some() {
        config.project_name = args.project_name.clone();
    }
    if args.version_name.is_some() {
        config.version_name = args.version_name.clone();
    }
    if args.platform_top_layer_id.is_some() {
        config.platform_top_layer_id = args.platform_top_layer_id.clone();
    }

    config.validate()?;
    ContainerPaths::from_config(&config)
        .to_container_path(&args.tar)
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
    Ok(config)
}

pub async fn handle_inspect(args: &InspectArgs) -> i32 {
    let config = match inspect_config(args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INVALID_CONFIG;
        }
    };
    debug!(?config, "Resolved configuration");

    let runtime = match DockerRuntime::connect() {
        Ok(runtime) => Arc::new(runtime),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    let api = match ImageInspectorClient::new(config.command_timeout) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let images = Arc::new(InspectorImages::new(
        ImageSettings::default(),
        config.images.clone(),
    ));
    let sink = Arc::new(JsonFileSink::new(config.output_dir.clone()));
    let driver = InspectionDriver::new(config, images, runtime, api).with_sink(sink);
    let targets = targets_for_tar(&args.tar, &args.images, args.os);

    let report = tokio::select! {
        report = driver.run(targets) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; releasing inspector services");
            driver.shutdown().await;
            eprintln!("Interrupted");
            return EXIT_FAILURE;
        }
    };

    match OutputFormatter::new(args.format.into()).format_report(&report) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    }

    if report.all_succeeded() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    let mut config = InspectorConfig::default();
    if let Some(url) = &args.service_url {
        config.service_mode = ServiceMode::External { url: url.clone() };
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return EXIT_INVALID_CONFIG;
    }

    let client = match ImageInspectorClient::new(config.command_timeout) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let families: Vec<InspectorOs> = match args.os {
        Some(os) => vec![os],
        None => InspectorOs::all().to_vec(),
    };
    let reports = check_health(&client, &config, &families).await;

    match OutputFormatter::new(args.format.into()).format_health(&reports) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    }

    if reports.iter().all(|r| r.healthy) {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

/// One health request per family against its configured address
pub async fn check_health(
    api: &dyn InspectorApi,
    config: &InspectorConfig,
    families: &[InspectorOs],
) -> Vec<HealthReport> {
    let mut reports = Vec::with_capacity(families.len());
    for os in families {
        let url = match &config.service_mode {
            ServiceMode::External { url } => url.clone(),
            ServiceMode::StartAsNeeded => format!(
                "http://{}:{}",
                config.service_host,
                config.ports_for(*os).host
            ),
        };

        let report = match api.health_check(&url).await {
            Ok(health) => HealthReport {
                os: *os,
                healthy: health.is_up(),
                http_status: Some(health.http_status),
                status: health.status,
                error: None,
                url,
            },
            Err(e) => HealthReport {
                os: *os,
                healthy: false,
                http_status: None,
                status: None,
                error: Some(e.to_string()),
                url,
            },
        };
        reports.push(report);
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{CliArgs, Commands};
    use clap::Parser;
    use serial_test::serial;

    fn inspect_args(extra: &[&str]) -> InspectArgs {
        let mut argv = vec!["image-inspector", "inspect"];
        argv.extend_from_slice(extra);
        match CliArgs::parse_from(argv).command {
            Commands::Inspect(args) => args,
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    #[serial]
    fn test_flags_override_environment() {
        std::env::remove_var("IMAGE_INSPECTOR_SERVICE_URL");
        let args = inspect_args(&[
            "--tar",
            "/tmp/shared/a.tar",
            "--shared-dir",
            "/tmp/shared",
            "--service-url",
            "http://inspector:8080",
            "--timeout",
            "30",
            "--no-cleanup",
            "--keep-containers",
            "--organize-by-layer",
        ]);
        let config = inspect_config(&args).unwrap();
        assert_eq!(
            config.service_mode,
            ServiceMode::External {
                url: "http://inspector:8080".to_string()
            }
        );
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert!(!config.cleanup);
        assert!(config.keep_containers);
        assert!(config.organize_by_layer);
    }

    #[test]
    #[serial]
    fn test_relative_tar_inside_shared_dir_is_accepted() {
        let shared = std::env::current_dir().unwrap().join("shared");
        let args = inspect_args(&[
            "--tar",
            "shared/a.tar",
            "--shared-dir",
            shared.to_str().unwrap(),
        ]);
        assert!(inspect_config(&args).is_ok());
    }

    #[test]
    #[serial]
    fn test_tar_outside_shared_dir_is_invalid() {
        let args = inspect_args(&["--tar", "/elsewhere/a.tar", "--shared-dir", "/tmp/shared"]);
        assert!(matches!(
            inspect_config(&args),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    #[serial]
    fn test_bad_service_url_is_invalid() {
        let args = inspect_args(&[
            "--tar",
            "/tmp/shared/a.tar",
            "--shared-dir",
            "/tmp/shared",
            "--service-url",
            "not a url",
        ]);
        assert!(inspect_config(&args).is_err());
    }
}
