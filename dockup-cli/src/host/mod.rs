// Host facts the install steps depend on
// Detected once, before any step runs

pub mod detection;
pub mod os_release;

pub use detection::{HostOverrides, detect_host};
pub use os_release::OsRelease;

use crate::error::{Result, UnsupportedArchSnafu};
use serde::Serialize;
use std::fmt;

/// Distributions Docker publishes an APT repository for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    Ubuntu,
    Debian,
    Raspbian,
}

impl Distro {
    pub const ALL: [Distro; 3] = [Distro::Ubuntu, Distro::Debian, Distro::Raspbian];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == id)
    }

    /// Path segment under the repository base URL
    pub fn as_str(self) -> &'static str {
        match self {
            Distro::Ubuntu => "ubuntu",
            Distro::Debian => "debian",
            Distro::Raspbian => "raspbian",
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debian architecture name as printed by `dpkg --print-architecture`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
    Armhf,
    Ppc64el,
    S390x,
}

impl Arch {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "amd64" => Ok(Arch::Amd64),
            "arm64" => Ok(Arch::Arm64),
            "armhf" => Ok(Arch::Armhf),
            "ppc64el" => Ok(Arch::Ppc64el),
            "s390x" => Ok(Arch::S390x),
            other => UnsupportedArchSnafu { arch: other }.fail(),
        }
    }

    pub fn deb_name(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Armhf => "armhf",
            Arch::Ppc64el => "ppc64el",
            Arch::S390x => "s390x",
        }
    }

    /// Machine name used in Compose release asset names (`uname -m` style)
    pub fn compose_name(self) -> &'static str {
        match self {
            Arch::Amd64 => "x86_64",
            Arch::Arm64 => "aarch64",
            Arch::Armhf => "armv7",
            Arch::Ppc64el => "ppc64le",
            Arch::S390x => "s390x",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.deb_name())
    }
}

/// Everything detected about the target host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub distro: Distro,
    pub codename: String,
    pub arch: Arch,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
}

/// Whether the process runs with an effective uid of 0
pub fn running_as_root() -> bool {
    // SAFETY: geteuid is a POSIX getter that always succeeds and has no side effects
    let euid = unsafe { libc::geteuid() };
    euid == 0
}
