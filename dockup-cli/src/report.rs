//! Provisioning report
//!
//! Printed after every `install` run and optionally written as TOML so
//! automation can tell which step failed without scraping logs.

use crate::host::HostInfo;
use crate::pipeline::{StepRecord, StepStatus};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct ProvisionReport {
    pub timestamp: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostInfo>,
    pub steps: Vec<StepRecord>,
}

impl ProvisionReport {
    pub fn new(timestamp: String, host: Option<HostInfo>, steps: Vec<StepRecord>) -> Self {
        let failed_step = steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| s.name.clone());
        Self {
            timestamp,
            succeeded: failed_step.is_none(),
            failed_step,
            host,
            steps,
        }
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize report")
    }
}

/// Write report as TOML, expanding `~` and creating parent directories
pub fn write_report(report: &ProvisionReport, output_path: &Path) -> Result<PathBuf> {
    let content = report.to_toml()?;

    let expanded = shellexpand::tilde(&output_path.to_string_lossy()).into_owned();
    let final_path = PathBuf::from(expanded);

    if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    fs::write(&final_path, content)
        .with_context(|| format!("Failed to write report to {}", final_path.display()))?;

    Ok(final_path)
}

fn status_icon(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Applied => "✨",
        StepStatus::AlreadySatisfied => "✅",
        StepStatus::Failed => "❌",
        StepStatus::NotRun => "⏭️ ",
    }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Applied => "applied",
        StepStatus::AlreadySatisfied => "already satisfied",
        StepStatus::Failed => "failed",
        StepStatus::NotRun => "not run",
    }
}

/// Print report to stdout in human-readable format
pub fn print_report(report: &ProvisionReport) {
    println!("🐳 dockup Provisioning Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Generated: {}", report.timestamp);

    if let Some(host) = &report.host {
        let name = host
            .pretty_name
            .clone()
            .unwrap_or_else(|| format!("{} {}", host.distro, host.codename));
        println!("Host: {name} ({}) user={}", host.arch, host.user);
    }
    println!();

    println!("📦 Steps:");
    for step in &report.steps {
        print!(
            "  {} {:<16} {}",
            status_icon(step.status),
            step.name,
            status_label(step.status)
        );
        if step.status == StepStatus::Applied || step.status == StepStatus::AlreadySatisfied {
            println!(" ({} ms)", step.elapsed_ms);
        } else {
            println!();
        }
        if let Some(error) = &step.error {
            println!("      {error}");
        }
    }

    println!();
    if report.succeeded {
        println!(
            "✅ Docker provisioned ({} applied, {} already satisfied)",
            report.count(StepStatus::Applied),
            report.count(StepStatus::AlreadySatisfied)
        );
    } else if let Some(step) = &report.failed_step {
        println!("❌ Provisioning stopped at step '{step}'");
    }
}
