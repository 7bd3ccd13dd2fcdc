//! Registers Docker's APT repository

use super::{Step, StepContext, write_atomic};
use crate::apt;
use crate::error::{ReadFileSnafu, Result};
use async_trait::async_trait;
use snafu::ResultExt;
use std::io::ErrorKind;

pub struct RegisterRepository;

impl RegisterRepository {
    fn contents(ctx: &StepContext<'_>) -> String {
        format!("{}\n", apt::sources_line(ctx.config, ctx.host))
    }
}

#[async_trait]
impl Step for RegisterRepository {
    fn name(&self) -> &'static str {
        "repository"
    }

    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String> {
        vec![format!(
            "write {}: {}",
            ctx.config.sources_list_path.display(),
            apt::sources_line(ctx.config, ctx.host)
        )]
    }

    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let path = ctx.host_path(&ctx.config.sources_list_path);
        match std::fs::read_to_string(&path) {
            Ok(existing) => Ok(existing == Self::contents(ctx)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context(ReadFileSnafu { path }),
        }
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let path = ctx.host_path(&ctx.config.sources_list_path);
        write_atomic(&path, Self::contents(ctx).as_bytes(), 0o644)?;
        tracing::info!(path = %path.display(), "registered Docker repository");
        Ok(())
    }
}
