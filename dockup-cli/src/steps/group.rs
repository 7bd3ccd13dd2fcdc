//! Grants the invoking user non-root Docker access via the docker group

use super::{Step, StepContext};
use crate::error::Result;
use crate::exec::{CommandRunner, Invocation};
use async_trait::async_trait;

pub struct DockerGroup;

/// Members listed in the group database entry, or `None` if the group is
/// missing
pub fn group_members(runner: &dyn CommandRunner, group: &str) -> Result<Option<Vec<String>>> {
    let output = runner.run(&Invocation::new("getent", ["group", group]))?;
    if !output.success() {
        return Ok(None);
    }

    // name:password:gid:member1,member2
    let members = output
        .stdout
        .lines()
        .next()
        .and_then(|line| line.splitn(4, ':').nth(3))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(members))
}

fn is_root(user: &str) -> bool {
    user == "root"
}

#[async_trait]
impl Step for DockerGroup {
    fn name(&self) -> &'static str {
        "docker-group"
    }

    fn describe(&self, ctx: &StepContext<'_>) -> Vec<String> {
        let group = &ctx.config.docker_group;
        let mut lines = vec![format!("groupadd --system {group} (if missing)")];
        if !is_root(&ctx.host.user) {
            lines.push(format!("usermod -aG {group} {}", ctx.host.user));
        }
        lines
    }

    async fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let Some(members) = group_members(ctx.runner, &ctx.config.docker_group)? else {
            return Ok(false);
        };
        Ok(is_root(&ctx.host.user) || members.contains(&ctx.host.user))
    }

    async fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let group = ctx.config.docker_group.as_str();
        let user = ctx.host.user.as_str();

        let members = match group_members(ctx.runner, group)? {
            Some(members) => members,
            None => {
                ctx.runner
                    .run_checked(&Invocation::new("groupadd", ["--system", group]))?;
                tracing::info!(group, "created group");
                Vec::new()
            }
        };

        if is_root(user) {
            tracing::info!(group, "running as root, skipping group membership");
            return Ok(());
        }

        if !members.iter().any(|m| m == user) {
            ctx.runner
                .run_checked(&Invocation::new("usermod", ["-aG", group, user]))?;
            tracing::info!(group, user, "added user to group");
        }

        tracing::info!(
            "{user} must log out and back in (or run `newgrp {group}`) for the new group to take effect"
        );
        Ok(())
    }
}
