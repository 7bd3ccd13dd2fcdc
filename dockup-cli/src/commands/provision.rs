//! Provisioning commands
//!
//! - `install`: detect the host and run the full step pipeline
//! - `plan`: show what `install` would do without touching the host
//! - `detect`: print detected host facts
//! - `verify`: check a finished installation

use crate::apt;
use crate::config::ProvisionConfig;
use crate::exec::SystemRunner;
use crate::fetch::{HttpFetcher, OfflineFetcher};
use crate::host::detection::DEFAULT_OS_RELEASE;
use crate::host::{HostInfo, HostOverrides, detect_host, running_as_root};
use crate::provisioner::Provisioner;
use crate::report::{print_report, write_report};
use crate::verify::{print_verify_result, verify_installation};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Host and configuration options shared by every command
#[derive(Debug, Args, Clone)]
pub struct HostArgs {
    /// TOML file overriding the built-in provisioning settings
    #[clap(long, global = true, env = "DOCKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// OS descriptor to read the distribution from
    #[clap(long, global = true, default_value = DEFAULT_OS_RELEASE)]
    pub os_release: PathBuf,

    /// Debian architecture (skips `dpkg --print-architecture`)
    #[clap(long, global = true)]
    pub arch: Option<String>,

    /// User to grant docker group access (default: $SUDO_USER, then current user)
    #[clap(long, global = true)]
    pub user: Option<String>,

    /// Compose release to install, e.g. v2.29.7
    #[clap(long, global = true, env = "DOCKUP_COMPOSE_VERSION")]
    pub compose_version: Option<String>,
}

impl HostArgs {
    pub fn overrides(&self) -> HostOverrides {
        HostOverrides {
            os_release: self.os_release.clone(),
            arch: self.arch.clone(),
            user: self.user.clone(),
            sudo_user: std::env::var("SUDO_USER").ok(),
        }
    }

    pub fn load_config(&self) -> Result<ProvisionConfig> {
        let mut config = ProvisionConfig::load(self.config.as_deref())
            .context("Failed to load provisioning config")?;

        if let Some(version) = &self.compose_version {
            config.compose.set_version(version);
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProvisionCommands {
    /// Install Docker Engine, the Compose binary and docker group access
    #[clap(alias = "run")]
    Install {
        /// Also write the report as TOML to this path
        #[clap(short, long)]
        report: Option<PathBuf>,
    },

    /// Show every step and the commands it would run, without changing anything
    Plan,

    /// Print the detected distribution, architecture and user
    Detect,

    /// Check that an installation is complete
    Verify,
}

/// Handle provisioning commands
pub async fn handle_provision_command(cmd: ProvisionCommands, args: &HostArgs) -> Result<()> {
    let config = args.load_config()?;
    let overrides = args.overrides();

    match cmd {
        ProvisionCommands::Install { report } => install(&config, &overrides, report).await,
        ProvisionCommands::Plan => plan(&config, &overrides),
        ProvisionCommands::Detect => detect(&config, &overrides),
        ProvisionCommands::Verify => verify(&config, &overrides),
    }
}

async fn install(
    config: &ProvisionConfig,
    overrides: &HostOverrides,
    report_path: Option<PathBuf>,
) -> Result<()> {
    if config.targets_live_root() && !running_as_root() {
        anyhow::bail!("dockup install must run as root (try: sudo dockup install)");
    }

    println!(
        "🐳 dockup install - Docker Engine + Compose {}",
        config.compose.version
    );
    println!();

    let fetcher = HttpFetcher::new(&config.download).context("Failed to set up downloader")?;
    let provisioner = Provisioner::new(config, &SystemRunner, &fetcher);
    let report = provisioner.run(overrides).await;

    println!();
    print_report(&report);

    if let Some(path) = report_path {
        let written = write_report(&report, &path).context("Failed to write report")?;
        println!();
        println!("📄 Report written to: {}", written.display());
    }

    if let Some(step) = &report.failed_step {
        anyhow::bail!("Provisioning failed at step '{step}'");
    }
    Ok(())
}

fn detect_or_fail(overrides: &HostOverrides) -> Result<HostInfo> {
    detect_host(&SystemRunner, overrides).context("Host detection failed")
}

fn plan(config: &ProvisionConfig, overrides: &HostOverrides) -> Result<()> {
    let host = detect_or_fail(overrides)?;
    let provisioner = Provisioner::new(config, &SystemRunner, &OfflineFetcher);

    println!(
        "📋 Plan for {} {} ({}), user {}",
        host.distro, host.codename, host.arch, host.user
    );
    for (index, step) in provisioner.plan(&host).iter().enumerate() {
        println!("  {}. {}", index + 1, step.name);
        for action in &step.actions {
            println!("       {action}");
        }
    }
    Ok(())
}

fn detect(config: &ProvisionConfig, overrides: &HostOverrides) -> Result<()> {
    let host = detect_or_fail(overrides)?;

    if let Some(name) = &host.pretty_name {
        println!("os:         {name}");
    }
    println!("distro:     {}", host.distro);
    println!("codename:   {}", host.codename);
    println!("arch:       {} (compose: {})", host.arch, host.arch.compose_name());
    println!("user:       {}", host.user);
    println!("repository: {}", apt::sources_line(config, &host));
    Ok(())
}

fn verify(config: &ProvisionConfig, overrides: &HostOverrides) -> Result<()> {
    let host = detect_or_fail(overrides)?;
    let result =
        verify_installation(&SystemRunner, config, &host).context("Verification could not run")?;

    print_verify_result(&result);

    if !result.passed() {
        anyhow::bail!("Docker installation is incomplete");
    }
    Ok(())
}
