//! Standalone Compose binary pinned to a release

use super::{Step, StepContext, write_atomic};
use crate::error::{MalformedChecksumSnafu, ProvisionError, ReadFileSnafu, Result};
use crate::fetch::{parse_checksum_file, sha256_hex, verify_sha256};
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};
use std::io::ErrorKind;
use tokio::sync::OnceCell;

#[derive(Default)]
pub struct ComposeBinary {
    expected_digest: OnceCell<String>,
}

impl ComposeBinary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release asset name, e.g. `docker-compose-linux-x86_64`
    pub fn asset_name(ctx: &StepContext<'_>) -> String {
        format!("docker-compose-linux-{}", ctx.host.arch.compose_name())
    }

    pub fn asset_url(ctx: &StepContext<'_>) -> String {
        format!(
            "{}/{}/{}",
            ctx.config.compose.release_base_url.trim_end_matches('/'),
            ctx.config.compose.release_tag(),
            Self::asset_name(ctx)
        )
    }

    /// Pinned digest from config, otherwise the published `.sha256` file.
    /// Fetched at most once per run.
    async fn expected_digest(&self, ctx: &StepContext<'_>) -> Result<&str> {
        let digest = self
            .expected_digest
            .get_or_try_init(|| async move {
                if let Some(pinned) = &ctx.config.compose.sha256 {
                    return Ok::<_, ProvisionError>(pinned.trim().to_ascii_lowercase());
                }
                let url = format!("{}.sha256", Self::asset_url(ctx));
                let body = ctx.fetcher.fetch(&url).await?;
                parse_checksum_file(&String::from_utf8_lossy(&body), &Self::asset_name(ctx))
                    .context(MalformedChecksumSnafu { url })
            })
            .await?;
        Ok(digest.as_str())
    }
}

#[async_trait]
impl Step for ComposeBinary {
    fn name(&self) -> &'static str {
        "compose-binary"
    }

    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String> {
        let verification = match &ctx.config.compose.sha256 {
            Some(digest) => format!("verify sha256 {digest}"),
            None => format!("verify sha256 from {}.sha256", Self::asset_url(ctx)),
        };
        vec![
            format!(
                "download {} -> {} (mode 0755)",
                Self::asset_url(ctx),
                ctx.config.compose.install_path.display()
            ),
            verification,
        ]
    }

    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let path = ctx.host_path(&ctx.config.compose.install_path);
        let installed = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context(ReadFileSnafu { path }),
        };

        let expected = self.expected_digest(ctx).await?;
        Ok(sha256_hex(&installed) == expected)
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let url = Self::asset_url(ctx);
        let expected = self.expected_digest(ctx).await?.to_string();

        let binary = ctx.fetcher.fetch(&url).await?;
        verify_sha256(&url, &binary, &expected)?;

        let path = ctx.host_path(&ctx.config.compose.install_path);
        write_atomic(&path, &binary, 0o755)?;
        tracing::info!(
            version = %ctx.config.compose.release_tag(),
            path = %path.display(),
            "installed Compose binary"
        );
        Ok(())
    }
}
