use crate::inspector::InspectorOs;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Container image package inspection
#[derive(Parser, Debug)]
#[command(
    name = "image-inspector",
    about = "Inspect container image packages through OS-matched inspector services",
    version,
    long_about = "image-inspector runs (or reuses) an inspector service matching the target \
                  image's OS family, asks it to list the installed packages, and reduces the \
                  listing into a dependency graph document."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Inspect the images in a tarball",
        long_about = "Inspects one image tarball, or an aggregate tarball holding several \
                      images, and writes one dependency document per image.\n\n\
                      Examples:\n  \
                      image-inspector inspect --tar /shared/alpine.tar --image alpine:3.6\n  \
                      image-inspector inspect --tar /shared/multi.tar --image alpine:3.6 --image centos:7\n  \
                      image-inspector inspect --tar /shared/app.tar --os ubuntu --organize-by-layer"
    )]
    Inspect(InspectArgs),

    #[command(
        about = "Check inspector service health",
        long_about = "Sends one health request per OS family to the configured or default \
                      service address.\n\n\
                      Examples:\n  \
                      image-inspector health\n  \
                      image-inspector health --os alpine"
    )]
    Health(HealthArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long, value_name = "PATH", help = "Image tarball inside the shared directory")]
    pub tar: PathBuf,

    #[arg(
        long = "image",
        value_name = "REPO[:TAG]",
        help = "Image held by the tarball; repeat for aggregate tarballs"
    )]
    pub images: Vec<String>,

    #[arg(long, value_parser = parse_os, help = "OS family of the image (alpine, centos, ubuntu)")]
    pub os: Option<InspectorOs>,

    #[arg(long, help = "Record which layer introduced each component")]
    pub organize_by_layer: bool,

    #[arg(long, help = "Keep components removed by later layers")]
    pub include_removed: bool,

    #[arg(long, help = "Leave service-side working files in place")]
    pub no_cleanup: bool,

    #[arg(long, help = "Leave inspector containers started by this run running")]
    pub keep_containers: bool,

    #[arg(long, help = "Ask the service for the extracted container filesystem")]
    pub output_container_fs: bool,

    #[arg(long, value_name = "URL", help = "Use the inspector service already running at URL")]
    pub service_url: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Per-operation timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, value_name = "DIR", help = "Directory shared with inspector containers")]
    pub shared_dir: Option<PathBuf>,

    #[arg(short = 'o', long, value_name = "DIR", help = "Where dependency documents are written")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_name = "PREFIX")]
    pub code_location_prefix: Option<String>,

    #[arg(long, value_name = "NAME", help = "Project name (defaults to the image repository)")]
    pub project_name: Option<String>,

    #[arg(long, value_name = "VERSION", help = "Project version (defaults to the image tag)")]
    pub version_name: Option<String>,

    #[arg(long, value_name = "LAYER_ID", help = "Top layer of the base platform to leave out")]
    pub platform_top_layer_id: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(long, value_parser = parse_os, help = "OS family to check (omit to check all)")]
    pub os: Option<InspectorOs>,

    #[arg(long, value_name = "URL", help = "Check the service at URL instead")]
    pub service_url: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_os(s: &str) -> Result<InspectorOs, String> {
    s.parse()
}
