//! Host command execution
//!
//! Steps never spawn processes directly; they build an [`Invocation`] and
//! hand it to a [`CommandRunner`]. The system runner shells out through
//! `duct`, tests substitute a scripted one.

use crate::error::{CommandFailedSnafu, Result, SpawnSnafu};
use snafu::{ResultExt, ensure};
use std::fmt;

/// A single command line with optional environment overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Program and arguments without the environment prefix
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        f.write_str(&self.command_line())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs commands on the host. Returns the output whatever the exit status;
/// only a failure to spawn is an error.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run and turn a non-zero exit into [`ProvisionError::CommandFailed`].
    ///
    /// [`ProvisionError::CommandFailed`]: crate::error::ProvisionError::CommandFailed
    fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation)?;
        ensure!(
            output.success(),
            CommandFailedSnafu {
                command: invocation.to_string(),
                code: output.code,
                stderr: output.stderr.clone(),
            }
        );
        Ok(output)
    }
}

/// Runs commands for real via `duct`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation, "running");

        let mut expression = duct::cmd(&invocation.program, &invocation.args)
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        for (key, value) in &invocation.env {
            expression = expression.env(key, value);
        }

        let output = expression.run().context(SpawnSnafu {
            command: invocation.to_string(),
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(command = %invocation, code = ?result.code, "finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_display_includes_env_prefix() {
        let invocation = Invocation::new("apt-get", ["install", "-y", "curl"])
            .env("DEBIAN_FRONTEND", "noninteractive");
        assert_eq!(
            invocation.to_string(),
            "DEBIAN_FRONTEND=noninteractive apt-get install -y curl"
        );
        assert_eq!(invocation.command_line(), "apt-get install -y curl");
    }

    #[test]
    fn test_run_checked_reports_failure() {
        let runner = ScriptedRunner::new()
            .respond("groupadd --system docker", CommandOutput::failed(9, "group exists\n"));

        let err = runner
            .run_checked(&Invocation::new("groupadd", ["--system", "docker"]))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("groupadd --system docker"));
        assert!(message.contains("status 9"));
        assert!(message.contains("group exists"));
    }

    #[test]
    fn test_system_runner_captures_stdout() {
        let output = SystemRunner
            .run(&Invocation::new("sh", ["-c", "echo hello"]))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }
}
