//! Fetches and pins Docker's repository signing key
//!
//! The key is only persisted once `gpg` confirms it carries the expected
//! fingerprint; a key that fails the check never reaches the keyring path.

use super::{Step, StepContext, ensure_dir, write_atomic};
use crate::apt;
use crate::error::{FingerprintMismatchSnafu, Result, WriteFileSnafu};
use crate::exec::{CommandRunner, Invocation};
use async_trait::async_trait;
use snafu::{ResultExt, ensure};
use std::io::Write;
use std::path::Path;

pub struct TrustKey;

/// Fingerprints of every key in an armored or binary key file
pub fn key_fingerprints(runner: &dyn CommandRunner, key_file: &Path) -> Result<Vec<String>> {
    let invocation = Invocation::new(
        "gpg",
        [
            "--batch".to_string(),
            "--show-keys".to_string(),
            "--with-colons".to_string(),
            "--with-fingerprint".to_string(),
            key_file.display().to_string(),
        ],
    );
    let output = runner.run_checked(&invocation)?;
    Ok(parse_fingerprints(&output.stdout))
}

// `fpr` records carry the fingerprint in field 10
fn parse_fingerprints(colons: &str) -> Vec<String> {
    colons
        .lines()
        .filter(|line| line.starts_with("fpr:"))
        .filter_map(|line| line.split(':').nth(9))
        .filter(|fpr| !fpr.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

pub(crate) fn normalize(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

#[async_trait]
impl Step for TrustKey {
    fn name(&self) -> &'static str {
        "trust-key"
    }

    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String> {
        let keyring = ctx.config.keyring_path.display();
        let mut lines = vec![format!(
            "download {} -> {keyring}",
            apt::key_url(ctx.config, ctx.host)
        )];
        match &ctx.config.key_fingerprint {
            Some(fpr) => lines.push(format!("verify key fingerprint {}", normalize(fpr))),
            None => lines.push("key fingerprint verification disabled".to_string()),
        }
        lines
    }

    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let path = ctx.host_path(&ctx.config.keyring_path);
        let non_empty = std::fs::metadata(&path).is_ok_and(|m| m.is_file() && m.len() > 0);
        if !non_empty {
            return Ok(false);
        }

        let Some(expected) = &ctx.config.key_fingerprint else {
            return Ok(true);
        };
        let expected = normalize(expected);
        // An unreadable or foreign key is replaced rather than reported
        match key_fingerprints(ctx.runner, &path) {
            Ok(found) => Ok(found.contains(&expected)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e.chain(), "existing key could not be inspected");
                Ok(false)
            }
        }
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let path = ctx.host_path(&ctx.config.keyring_path);
        let keyring_dir = path.parent().unwrap_or_else(|| Path::new("/"));
        ensure_dir(keyring_dir, 0o755)?;

        let url = apt::key_url(ctx.config, ctx.host);
        let key = ctx.fetcher.fetch(&url).await?;

        if let Some(expected) = &ctx.config.key_fingerprint {
            let expected = normalize(expected);
            let mut staged = tempfile::NamedTempFile::new_in(keyring_dir)
                .context(WriteFileSnafu { path: keyring_dir })?;
            staged
                .write_all(&key)
                .context(WriteFileSnafu { path: staged.path() })?;

            let found = key_fingerprints(ctx.runner, staged.path())?;
            ensure!(
                found.contains(&expected),
                FingerprintMismatchSnafu { expected, found }
            );
            tracing::debug!(fingerprint = %expected, "signing key verified");
        } else {
            tracing::warn!(url = %url, "installing signing key without fingerprint verification");
        }

        write_atomic(&path, &key, 0o644)?;
        tracing::info!(path = %path.display(), "installed repository signing key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::host::{Arch, Distro, HostInfo};
    use crate::testing::{ScriptedRunner, StaticFetcher};

    #[tokio::test]
    async fn test_empty_fingerprint_in_config_skips_gpg() {
        let root = tempfile::tempdir().unwrap();
        let mut config = ProvisionConfig::from_toml("key_fingerprint = \"\"\n").unwrap();
        config.root_dir = root.path().to_path_buf();
        let host = HostInfo {
            distro: Distro::Debian,
            codename: "bookworm".to_string(),
            arch: Arch::Arm64,
            user: "alice".to_string(),
            pretty_name: None,
        };
        let key = "-----BEGIN PGP PUBLIC KEY BLOCK-----\nmirror\n-----END PGP PUBLIC KEY BLOCK-----\n";
        let fetcher =
            StaticFetcher::new().serve("https://download.docker.com/linux/debian/gpg", key);
        let runner = ScriptedRunner::new();
        let ctx = StepContext {
            host: &host,
            config: &config,
            runner: &runner,
            fetcher: &fetcher,
        };

        assert!(!TrustKey.is_satisfied(&ctx).await.unwrap());
        TrustKey.apply(&ctx).await.unwrap();
        assert!(TrustKey.is_satisfied(&ctx).await.unwrap());

        let installed = std::fs::read_to_string(ctx.host_path(&config.keyring_path)).unwrap();
        assert_eq!(installed, key);
        assert!(runner.calls().is_empty(), "gpg must not run: {:?}", runner.calls());
    }

    #[test]
    fn test_parse_fingerprints() {
        let colons = "\
pub:-:4096:1:8D81803C0EBFCD88:1487788586:::-:::scESA::::::23::0:
fpr:::::::::9DC858229FC7DD38854AE2D88D81803C0EBFCD88:
uid:-::::1487792064::B5A08F01796E7F521861B449372CAEE3A7F63BA4::Docker Release (CE deb) <docker@docker.com>::::::::::0:
sub:-:4096:1:7EA0A9C3F273FCD8:1487788586::::::s::::::23:
fpr:::::::::D3306A018370199E527AE7317EA0A9C3F273FCD8:
";
        assert_eq!(
            parse_fingerprints(colons),
            vec![
                "9DC858229FC7DD38854AE2D88D81803C0EBFCD88".to_string(),
                "D3306A018370199E527AE7317EA0A9C3F273FCD8".to_string(),
            ]
        );
    }

    #[test]
    fn test_normalize_spaced_fingerprint() {
        assert_eq!(
            normalize("9dc8 5822 9fc7 dd38 854a  e2d8 8d81 803c 0ebf cd88"),
            "9DC858229FC7DD38854AE2D88D81803C0EBFCD88"
        );
    }
}
