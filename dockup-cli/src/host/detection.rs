// Host detection
// Reads the OS descriptor, architecture and invoking user, failing on
// anything the Docker repository cannot serve

use super::{Arch, Distro, HostInfo, OsRelease};
use crate::error::{MissingOsFieldSnafu, Result, UnknownUserSnafu, UnsupportedDistroSnafu};
use crate::exec::{CommandRunner, Invocation};
use snafu::OptionExt;
use std::path::{Path, PathBuf};

pub const DEFAULT_OS_RELEASE: &str = "/etc/os-release";

/// Values that replace detection when given on the command line
#[derive(Debug, Clone)]
pub struct HostOverrides {
    pub os_release: PathBuf,
    pub arch: Option<String>,
    pub user: Option<String>,
    /// Value of `SUDO_USER`, read by the caller
    pub sudo_user: Option<String>,
}

impl Default for HostOverrides {
    fn default() -> Self {
        Self {
            os_release: PathBuf::from(DEFAULT_OS_RELEASE),
            arch: None,
            user: None,
            sudo_user: std::env::var("SUDO_USER").ok(),
        }
    }
}

/// Detect distribution, codename, architecture and user
pub fn detect_host(runner: &dyn CommandRunner, overrides: &HostOverrides) -> Result<HostInfo> {
    let release = OsRelease::load(&overrides.os_release)?;
    let (distro, codename) = resolve_distro(&release, &overrides.os_release)?;

    let arch = match &overrides.arch {
        Some(arch) => Arch::parse(arch)?,
        None => detect_arch(runner)?,
    };

    let user = resolve_user(overrides)?;

    let host = HostInfo {
        distro,
        codename,
        arch,
        user,
        pretty_name: release.get("PRETTY_NAME").map(str::to_string),
    };
    tracing::info!(
        distro = %host.distro,
        codename = %host.codename,
        arch = %host.arch,
        user = %host.user,
        "detected host"
    );
    Ok(host)
}

/// Map os-release fields to a supported distribution and its codename.
/// Derivatives resolve through `ID_LIKE` when they publish the parent's
/// codename (`UBUNTU_CODENAME` or `DEBIAN_CODENAME`).
pub fn resolve_distro(release: &OsRelease, path: &Path) -> Result<(Distro, String)> {
    let id = release
        .id()
        .context(MissingOsFieldSnafu { path, field: "ID" })?;

    if let Some(distro) = Distro::from_id(id) {
        let codename = release.get("VERSION_CODENAME").or_else(|| match distro {
            Distro::Ubuntu => release.get("UBUNTU_CODENAME"),
            Distro::Debian | Distro::Raspbian => None,
        });
        let codename = codename.context(MissingOsFieldSnafu {
            path,
            field: "VERSION_CODENAME",
        })?;
        return Ok((distro, codename.to_string()));
    }

    let like = release.id_like();
    if like.contains(&"ubuntu") {
        if let Some(codename) = release.get("UBUNTU_CODENAME") {
            tracing::debug!(id, "using Ubuntu repository for derivative");
            return Ok((Distro::Ubuntu, codename.to_string()));
        }
    }
    if like.contains(&"debian") {
        if let Some(codename) = release.get("DEBIAN_CODENAME") {
            tracing::debug!(id, "using Debian repository for derivative");
            return Ok((Distro::Debian, codename.to_string()));
        }
    }

    UnsupportedDistroSnafu {
        id,
        supported: Distro::ALL.map(Distro::as_str).join(", "),
    }
    .fail()
}

fn detect_arch(runner: &dyn CommandRunner) -> Result<Arch> {
    let output = runner.run_checked(&Invocation::new("dpkg", ["--print-architecture"]))?;
    Arch::parse(&output.stdout)
}

/// The user who should gain docker access: explicit override, then the
/// account behind `sudo`, then whoever runs the process.
fn resolve_user(overrides: &HostOverrides) -> Result<String> {
    if let Some(user) = overrides.user.as_deref().filter(|u| !u.trim().is_empty()) {
        return Ok(user.trim().to_string());
    }

    if let Some(user) = overrides
        .sudo_user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty() && *u != "root")
    {
        return Ok(user.to_string());
    }

    Some(whoami::username())
        .filter(|u| !u.is_empty())
        .context(UnknownUserSnafu)
}
