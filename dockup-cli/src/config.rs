//! Provisioning configuration
//!
//! Every constant the install sequence depends on lives here so a TOML file
//! can override it. Missing keys fall back to the defaults below.

use crate::error::{ParseConfigSnafu, ReadConfigSnafu, Result};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fingerprint of Docker's release signing key.
pub const DOCKER_KEY_FINGERPRINT: &str = "9DC858229FC7DD38854AE2D88D81803C0EBFCD88";

/// Compose release installed when no override is given.
pub const PINNED_COMPOSE_VERSION: &str = "v2.29.7";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub repo_base_url: String,
    pub channel: String,
    pub keyring_path: PathBuf,
    /// Expected signing key fingerprint. An empty string disables the check.
    #[serde(deserialize_with = "empty_as_none")]
    pub key_fingerprint: Option<String>,
    pub sources_list_path: PathBuf,
    pub prerequisite_packages: Vec<String>,
    pub docker_packages: Vec<String>,
    pub docker_group: String,
    pub grant_group: bool,
    /// Prefix applied to every file written. `/` on a real host.
    pub root_dir: PathBuf,
    pub compose: ComposeConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub enabled: bool,
    pub version: String,
    pub release_base_url: String,
    pub install_path: PathBuf,
    /// Pinned digest of the release asset. When unset the `.sha256` file
    /// published beside the asset is used.
    #[serde(deserialize_with = "empty_as_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            repo_base_url: "https://download.docker.com/linux".to_string(),
            channel: "stable".to_string(),
            keyring_path: PathBuf::from("/etc/apt/keyrings/docker.asc"),
            key_fingerprint: Some(DOCKER_KEY_FINGERPRINT.to_string()),
            sources_list_path: PathBuf::from("/etc/apt/sources.list.d/docker.list"),
            prerequisite_packages: ["ca-certificates", "curl", "gnupg"]
                .into_iter()
                .map(String::from)
                .collect(),
            docker_packages: [
                "docker-ce",
                "docker-ce-cli",
                "containerd.io",
                "docker-buildx-plugin",
                "docker-compose-plugin",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            docker_group: "docker".to_string(),
            grant_group: true,
            root_dir: PathBuf::from("/"),
            compose: ComposeConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            version: PINNED_COMPOSE_VERSION.to_string(),
            release_base_url: "https://github.com/docker/compose/releases/download".to_string(),
            install_path: PathBuf::from("/usr/local/bin/docker-compose"),
            sha256: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            connect_timeout_secs: 15,
            retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ComposeConfig {
    /// Release tag for the configured version; tags always carry a leading `v`
    pub fn release_tag(&self) -> String {
        format!("v{}", self.version.trim().trim_start_matches('v'))
    }

    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
        self.version = self.release_tag();
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ProvisionConfig {
    /// Load config from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        Self::from_toml(&content).context(ParseConfigSnafu { path })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        let version = config.compose.version.clone();
        config.compose.set_version(&version);
        Ok(config)
    }

    /// Map an absolute host path onto `root_dir`.
    pub fn host_path(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root_dir.join(relative)
    }

    /// Whether file writes land on the live filesystem.
    pub fn targets_live_root(&self) -> bool {
        self.root_dir == Path::new("/")
    }

    /// Version string without the leading `v` of the release tag.
    pub fn compose_semver(&self) -> &str {
        self.compose.version.trim_start_matches('v')
    }
}

// TOML has no null, so `""` stands in for an unset optional string
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}
