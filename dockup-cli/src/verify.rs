//! Post-install verification
//!
//! Checks that a finished run left the host in the expected state: the
//! repository is registered, packages and the pinned Compose binary are
//! installed, and the user can reach the Docker socket through the group.

use crate::apt;
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::exec::{CommandRunner, Invocation};
use crate::host::HostInfo;
use crate::steps::group::group_members;
use crate::steps::trust_key::{key_fingerprints, normalize};
use std::os::unix::fs::PermissionsExt;

/// Result of a single verification check
#[derive(Debug, Clone)]
pub struct CheckItem {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub fix_hint: Option<String>,
}

impl CheckItem {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.into(),
            fix_hint: None,
        }
    }

    fn fail(name: &str, message: impl Into<String>, fix_hint: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.into(),
            fix_hint: Some(fix_hint.to_string()),
        }
    }
}

/// Overall verification result
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub checks: Vec<CheckItem>,
}

impl VerifyResult {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed(&self) -> Vec<&CheckItem> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// Extract semantic version from version output
/// Handles various formats:
///   "2.29.7" -> "2.29.7"
///   "Docker Compose version v2.29.7" -> "2.29.7"
///   "Docker version 27.3.1, build ce12230" -> "27.3.1"
pub fn extract_version(output: &str) -> Option<String> {
    let re = regex::Regex::new(r"v?(\d+\.\d+\.\d+)").ok()?;
    re.captures(output)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Compare an installed version against the pinned one
pub fn version_matches(installed: &str, pinned: &str) -> bool {
    match (
        semver::Version::parse(installed.trim()),
        semver::Version::parse(pinned.trim().trim_start_matches('v')),
    ) {
        (Ok(installed), Ok(pinned)) => installed == pinned,
        _ => installed.trim() == pinned.trim().trim_start_matches('v'),
    }
}

fn check_sources_list(config: &ProvisionConfig, host: &HostInfo) -> CheckItem {
    let name = "repository";
    let path = config.host_path(&config.sources_list_path);
    let expected = apt::sources_line(config, host);

    match std::fs::read_to_string(&path) {
        Ok(content) if content.trim_end() == expected => {
            CheckItem::pass(name, format!("{} registered", path.display()))
        }
        Ok(content) => CheckItem::fail(
            name,
            format!("{} contains '{}'", path.display(), content.trim_end()),
            "dockup install",
        ),
        Err(e) => CheckItem::fail(name, format!("{}: {e}", path.display()), "dockup install"),
    }
}

fn check_keyring(runner: &dyn CommandRunner, config: &ProvisionConfig) -> CheckItem {
    let name = "trust-key";
    let path = config.host_path(&config.keyring_path);
    let present = std::fs::metadata(&path).is_ok_and(|meta| meta.is_file() && meta.len() > 0);
    if !present {
        return CheckItem::fail(
            name,
            format!("{} missing or empty", path.display()),
            "dockup install",
        );
    }

    let Some(expected) = &config.key_fingerprint else {
        return CheckItem::pass(name, format!("{} present (fingerprint not checked)", path.display()));
    };
    let expected = normalize(expected);
    match key_fingerprints(runner, &path) {
        Ok(found) if found.contains(&expected) => {
            CheckItem::pass(name, format!("{} carries key {expected}", path.display()))
        }
        Ok(found) => CheckItem::fail(
            name,
            format!(
                "{} holds [{}], expected {expected}",
                path.display(),
                found.join(", ")
            ),
            &format!("rm {} && dockup install", path.display()),
        ),
        Err(e) => CheckItem::fail(
            name,
            format!("{} could not be inspected: {}", path.display(), e.chain()),
            "dockup install",
        ),
    }
}

fn check_packages(runner: &dyn CommandRunner, config: &ProvisionConfig) -> Result<CheckItem> {
    let name = "docker-packages";
    let missing = apt::missing_packages(runner, &config.docker_packages)?;
    Ok(if missing.is_empty() {
        CheckItem::pass(name, format!("{} packages installed", config.docker_packages.len()))
    } else {
        CheckItem::fail(
            name,
            format!("not installed: {}", missing.join(", ")),
            "dockup install",
        )
    })
}

fn check_compose(runner: &dyn CommandRunner, config: &ProvisionConfig) -> CheckItem {
    let name = "compose-binary";
    let path = config.host_path(&config.compose.install_path);

    let meta = match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => meta,
        _ => {
            return CheckItem::fail(
                name,
                format!("{} not found", path.display()),
                "dockup install",
            );
        }
    };
    if meta.permissions().mode() & 0o111 == 0 {
        return CheckItem::fail(
            name,
            format!("{} is not executable", path.display()),
            &format!("chmod +x {}", path.display()),
        );
    }

    let invocation = Invocation::new(path.display().to_string().as_str(), ["version", "--short"]);
    let reported = runner
        .run_checked(&invocation)
        .ok()
        .and_then(|output| extract_version(&output.stdout));

    match reported {
        Some(version) if version_matches(&version, &config.compose.version) => {
            CheckItem::pass(name, format!("{} reports {version}", path.display()))
        }
        Some(version) => CheckItem::fail(
            name,
            format!(
                "{} reports {version}, expected {}",
                path.display(),
                config.compose_semver()
            ),
            "dockup install",
        ),
        None => CheckItem::fail(
            name,
            format!("{} did not report a version", path.display()),
            "dockup install",
        ),
    }
}

fn check_group(
    runner: &dyn CommandRunner,
    config: &ProvisionConfig,
    host: &HostInfo,
) -> Result<CheckItem> {
    let name = "docker-group";
    let group = &config.docker_group;
    let fix = format!("usermod -aG {group} {}", host.user);

    Ok(match group_members(runner, group)? {
        None => CheckItem::fail(name, format!("group {group} does not exist"), &fix),
        Some(_) if host.user == "root" => CheckItem::pass(name, format!("group {group} exists")),
        Some(members) if members.contains(&host.user) => CheckItem::pass(
            name,
            format!("{} is in {group} (may need a new login session)", host.user),
        ),
        Some(_) => CheckItem::fail(name, format!("{} is not in {group}", host.user), &fix),
    })
}

/// Run every post-install check
pub fn verify_installation(
    runner: &dyn CommandRunner,
    config: &ProvisionConfig,
    host: &HostInfo,
) -> Result<VerifyResult> {
    let mut checks = vec![
        check_sources_list(config, host),
        check_keyring(runner, config),
        check_packages(runner, config)?,
    ];
    if config.compose.enabled {
        checks.push(check_compose(runner, config));
    }
    if config.grant_group {
        checks.push(check_group(runner, config, host)?);
    }
    Ok(VerifyResult { checks })
}

/// Print verification results as a checklist
pub fn print_verify_result(result: &VerifyResult) {
    println!("🔍 Verifying Docker installation:");
    for check in &result.checks {
        let status = if check.passed { "✅" } else { "❌" };
        println!("  {status} {:<16} {}", check.name, check.message);
        if let Some(fix) = &check.fix_hint {
            println!("      Fix: {fix}");
        }
    }

    println!();
    if result.passed() {
        println!("✅ All checks passed!");
    } else {
        println!("⚠️  {} check(s) failed", result.failed().len());
    }
}
