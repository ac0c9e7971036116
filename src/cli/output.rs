//! Output formatting for run reports and health checks
//!
//! Reports render as JSON, YAML or human-readable text. The machine-readable
//! forms share one serialisable view so both carry the same fields.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::driver::{ImageOutcome, RunReport};
use crate::inspector::InspectorOs;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

/// Health of one inspector service
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub os: InspectorOs,
    pub url: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    succeeded: usize,
    failed: usize,
    images: Vec<ImageSummary<'a>>,
}

#[derive(Serialize)]
struct ImageSummary<'a> {
    image: String,
    succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    os: Option<InspectorOs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_manager: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_location_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<&'a str>,
}

impl<'a> ImageSummary<'a> {
    fn from_outcome(outcome: &'a ImageOutcome) -> Self {
        let image = outcome.target.display_name();
        match &outcome.result {
            Ok(result) => Self {
                image,
                succeeded: true,
                os: Some(result.os),
                package_manager: Some(result.package_manager.name()),
                artifact_name: Some(&result.artifact_name),
                code_location_name: Some(&result.code_location_name),
                artifact_path: result.artifact_path.as_ref().map(|p| p.display().to_string()),
                components: Some(result.graph.packages().count()),
                error_kind: None,
                error: None,
                origin: None,
            },
            Err(err) => Self {
                image,
                succeeded: false,
                os: None,
                package_manager: None,
                artifact_name: None,
                code_location_name: None,
                artifact_path: None,
                components: None,
                error_kind: Some(err.kind()),
                error: Some(err.to_string()),
                origin: err.origin(),
            },
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        let summary = RunSummary {
            succeeded: report.succeeded().count(),
            failed: report.failed().count(),
            images: report.outcomes.iter().map(ImageSummary::from_outcome).collect(),
        };
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&summary)
                .context("Failed to serialize run report to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(&summary).context("Failed to serialize run report to YAML")
            }
            OutputFormat::Human => Ok(format_report_human(&summary)),
        }
    }

    pub fn format_health(&self, reports: &[HealthReport]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(reports)
                .context("Failed to serialize health results to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(reports).context("Failed to serialize health results to YAML")
            }
            OutputFormat::Human => Ok(format_health_human(reports)),
        }
    }
}

fn format_report_human(summary: &RunSummary<'_>) -> String {
    let mut output = String::new();

    if summary.failed == 0 {
        output.push_str("\u{2713} Inspection Result\n");
    } else {
        output.push_str("\u{26A0} Inspection Result (Failures)\n");
    }
    output.push_str(RULE);
    output.push_str("\n\n");

    for image in &summary.images {
        let symbol = if image.succeeded { "\u{2713}" } else { "\u{2717}" };
        output.push_str(&format!("{} {}\n", symbol, image.image));

        if image.succeeded {
            if let Some(os) = image.os {
                output.push_str(&format!("\u{251C}\u{2500} OS:              {}\n", os));
            }
            if let Some(pm) = image.package_manager {
                output.push_str(&format!("\u{251C}\u{2500} Package manager: {}\n", pm));
            }
            if let Some(count) = image.components {
                output.push_str(&format!("\u{251C}\u{2500} Components:      {}\n", count));
            }
            if let Some(location) = image.code_location_name {
                output.push_str(&format!("\u{251C}\u{2500} Code location:   {}\n", location));
            }
            let artifact = image
                .artifact_path
                .clone()
                .or_else(|| image.artifact_name.map(str::to_string))
                .unwrap_or_default();
            output.push_str(&format!("\u{2514}\u{2500} Artifact:        {}\n", artifact));
        } else {
            if let Some(kind) = image.error_kind {
                output.push_str(&format!("\u{251C}\u{2500} Failure: {}\n", kind));
            }
            if let Some(origin) = image.origin {
                output.push_str(&format!("\u{251C}\u{2500} Origin:  {}\n", origin));
            }
            output.push_str(&format!(
                "\u{2514}\u{2500} Error:   {}\n",
                image.error.as_deref().unwrap_or("unknown")
            ));
        }
        output.push('\n');
    }

    output.push_str(&format!(
        "{} succeeded, {} failed\n",
        summary.succeeded, summary.failed
    ));
    output
}

fn format_health_human(reports: &[HealthReport]) -> String {
    let mut output = String::new();

    output.push_str("Inspector Service Health\n");
    output.push_str(RULE);
    output.push_str("\n\n");

    for report in reports {
        let symbol = if report.healthy { "\u{2713}" } else { "\u{2717}" };
        output.push_str(&format!("{} {} ({})\n", symbol, report.os, report.url));
        output.push_str(&format!(
            "  Status: {}\n",
            if report.healthy { "Up" } else { "Unavailable" }
        ));
        if let Some(code) = report.http_status {
            output.push_str(&format!("  HTTP:   {}\n", code));
        }
        if let Some(error) = &report.error {
            output.push_str(&format!("  Error:  {}\n", error));
        }
        output.push('\n');
    }
    output
}
