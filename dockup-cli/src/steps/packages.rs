//! Package-manager steps: prerequisites, index refresh, Docker packages

use super::{Step, StepContext};
use crate::apt;
use crate::error::Result;
use async_trait::async_trait;

/// Tools the trust-key and download steps rely on
pub struct Prerequisites;

#[async_trait]
impl Step for Prerequisites {
    fn name(&self) -> &'static str {
        "prerequisites"
    }

    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String> {
        vec![
            apt::update().to_string(),
            apt::install(&ctx.config.prerequisite_packages).to_string(),
        ]
    }

    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let missing = apt::missing_packages(ctx.runner, &ctx.config.prerequisite_packages)?;
        if !missing.is_empty() {
            tracing::debug!(?missing, "prerequisites missing");
        }
        Ok(missing.is_empty())
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.runner.run_checked(&apt::update())?;
        ctx.runner
            .run_checked(&apt::install(&ctx.config.prerequisite_packages))?;
        Ok(())
    }
}

/// `apt-get update` after the Docker repository is registered
pub struct RefreshIndex;

#[async_trait]
impl Step for RefreshIndex {
    fn name(&self) -> &'static str {
        "refresh-index"
    }

    fn describe(&self, _ctx: &StepContext<'_>) -> Vec<String> {
        vec![apt::update().to_string()]
    }

    // The index can always be stale; refreshing is cheap and harmless.
    async fn is_satisfied(&self, _ctx: &StepContext<'_>) -> Result<bool> {
        Ok(false)
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.runner.run_checked(&apt::update())?;
        Ok(())
    }
}

/// Engine, CLI, containerd and the buildx/compose plugins
pub struct DockerPackages;

#[async_trait]
impl Step for DockerPackages {
    fn name(&self) -> &'static str {
        "docker-packages"
    }

    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String> {
        vec![apt::install(&ctx.config.docker_packages).to_string()]
    }

    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(apt::missing_packages(ctx.runner, &ctx.config.docker_packages)?.is_empty())
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.runner
            .run_checked(&apt::install(&ctx.config.docker_packages))?;
        Ok(())
    }
}
