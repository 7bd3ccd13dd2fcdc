//! Install steps
//!
//! Each stage of the Docker install is a [`Step`]: it can describe what it
//! would do, probe whether the host already satisfies it, and apply itself.
//! The probe is what makes a second run a no-op.

pub mod compose;
pub mod group;
pub mod packages;
pub mod repository;
pub mod trust_key;

pub use compose::ComposeBinary;
pub use group::DockerGroup;
pub use packages::{DockerPackages, Prerequisites, RefreshIndex};
pub use repository::RegisterRepository;
pub use trust_key::TrustKey;

use crate::config::ProvisionConfig;
use crate::error::{Result, WriteFileSnafu};
use crate::exec::CommandRunner;
use crate::fetch::Fetcher;
use crate::host::HostInfo;
use async_trait::async_trait;
use snafu::ResultExt;
use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// What a step gets to work with
pub struct StepContext<'a> {
    pub host: &'a HostInfo,
    pub config: &'a ProvisionConfig,
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn Fetcher,
}

impl StepContext<'_> {
    /// Absolute host path mapped under the configured root
    pub fn host_path(&self, path: &Path) -> PathBuf {
        self.config.host_path(path)
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    /// Stable identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Commands and file writes this step performs, for `plan`
    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String>;

    /// Whether the host already has what this step would produce
    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool>;

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()>;
}

/// Create `dir` and any missing parents with `mode`
pub(crate) fn ensure_dir(dir: &Path, mode: u32) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(dir)
        .context(WriteFileSnafu { path: dir })
}

/// Write `data` to `path` via a temp file in the same directory, so readers
/// never observe a partial file.
pub(crate) fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    ensure_dir(parent, 0o755)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent).context(WriteFileSnafu { path })?;
    staged.write_all(data).context(WriteFileSnafu { path })?;
    staged.as_file().sync_all().context(WriteFileSnafu { path })?;
    staged
        .as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .context(WriteFileSnafu { path })?;
    staged
        .persist(path)
        .map_err(|e| e.error)
        .context(WriteFileSnafu { path })?;

    tracing::debug!(path = %path.display(), bytes = data.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parents_and_sets_mode() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("usr/local/bin/tool");

        write_atomic(&target, b"#!/bin/sh\n", 0o755).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"#!/bin/sh\n");
        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("docker.list");
        fs::write(&target, "old\n").unwrap();

        write_atomic(&target, b"new\n", 0o644).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
    }
}
