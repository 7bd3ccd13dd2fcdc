//! Error types for the provisioning library
//!
//! The CLI layer wraps these in `anyhow`; everything below the command
//! handlers returns [`ProvisionError`] so a failed step can be reported
//! with its full cause chain.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProvisionError {
    #[snafu(display("failed to read OS descriptor {}", path.display()))]
    ReadOsRelease {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse OS descriptor {}: {message}", path.display()))]
    ParseOsRelease { path: PathBuf, message: String },

    #[snafu(display("OS descriptor {} has no {field} field", path.display()))]
    MissingOsField { path: PathBuf, field: &'static str },

    #[snafu(display("unsupported distribution '{id}' (supported: {supported})"))]
    UnsupportedDistro { id: String, supported: String },

    #[snafu(display("unsupported architecture '{arch}'"))]
    UnsupportedArch { arch: String },

    #[snafu(display("could not determine the invoking user"))]
    UnknownUser,

    #[snafu(display("failed to execute `{command}`"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` exited with status {}: {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()), stderr.trim()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("failed to build HTTP client"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("download of {url} failed"))]
    Download { url: String, source: reqwest::Error },

    #[snafu(display("download of {url} attempted without network access"))]
    Offline { url: String },

    #[snafu(display("download of {url} returned HTTP {status}"))]
    HttpStatus { url: String, status: u16 },

    #[snafu(display("checksum mismatch for {url}: expected {expected}, got {actual}"))]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[snafu(display("no SHA-256 digest found in {url}"))]
    MalformedChecksum { url: String },

    #[snafu(display(
        "signing key fingerprint mismatch: expected {expected}, found [{}]",
        found.join(", ")
    ))]
    FingerprintMismatch { expected: String, found: Vec<String> },

    #[snafu(display("failed to read {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to read config {}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse config {}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

impl ProvisionError {
    /// Render the error with its full cause chain, one line per cause.
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }

    /// Whether retrying the same operation might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Download { source, .. } => source.is_timeout() || source.is_connect(),
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
