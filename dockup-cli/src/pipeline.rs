//! Ordered step execution
//!
//! Runs steps in sequence, skipping those whose probe reports the host
//! already satisfied, and stops at the first failure. Steps after a
//! failure are recorded as not run so the report shows the whole sequence.

use crate::config::ProvisionConfig;
use crate::steps::{
    ComposeBinary, DockerGroup, DockerPackages, Prerequisites, RefreshIndex, RegisterRepository,
    Step, StepContext, TrustKey,
};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    AlreadySatisfied,
    Failed,
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn new(name: &str, status: StepStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            elapsed_ms: 0,
            error: None,
        }
    }

    pub fn failed(name: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(name, StepStatus::Failed)
        }
    }
}

/// A step with the actions it would take, as shown by `plan`
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub name: &'static str,
    pub actions: Vec<String>,
}

pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// The Docker install sequence, minus anything disabled in config
    pub fn standard(config: &ProvisionConfig) -> Self {
        let mut steps: Vec<Box<dyn Step>> = vec![
            Box::new(Prerequisites),
            Box::new(TrustKey),
            Box::new(RegisterRepository),
            Box::new(RefreshIndex),
            Box::new(DockerPackages),
        ];
        if config.compose.enabled {
            steps.push(Box::new(ComposeBinary::new()));
        }
        if config.grant_group {
            steps.push(Box::new(DockerGroup));
        }
        Self::new(steps)
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn plan(&self, ctx: &StepContext<'_>) -> Vec<PlannedStep> {
        self.steps
            .iter()
            .map(|step| PlannedStep {
                name: step.name(),
                actions: step.describe(ctx),
            })
            .collect()
    }

    pub async fn run(&self, ctx: &StepContext<'_>) -> Vec<StepRecord> {
        let mut records = Vec::with_capacity(self.steps.len());
        let mut failed = false;

        for step in &self.steps {
            let name = step.name();
            if failed {
                records.push(StepRecord::new(name, StepStatus::NotRun));
                continue;
            }

            let started = Instant::now();
            let outcome = match step.is_satisfied(ctx).await {
                Ok(true) => Ok(StepStatus::AlreadySatisfied),
                Ok(false) => {
                    tracing::info!(step = name, "applying");
                    step.apply(ctx).await.map(|()| StepStatus::Applied)
                }
                Err(e) => Err(e),
            };
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let record = match outcome {
                Ok(status) => {
                    tracing::info!(step = name, ?status, elapsed_ms, "step finished");
                    StepRecord {
                        elapsed_ms,
                        ..StepRecord::new(name, status)
                    }
                }
                Err(e) => {
                    let error = e.chain();
                    tracing::error!(step = name, error = %error, "step failed");
                    failed = true;
                    StepRecord {
                        elapsed_ms,
                        ..StepRecord::failed(name, error)
                    }
                }
            };
            records.push(record);
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProvisionError, Result};
    use crate::host::{Arch, Distro, HostInfo};
    use crate::testing::{ScriptedRunner, StaticFetcher};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        name: &'static str,
        satisfied: bool,
        fails: bool,
        applied: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str, satisfied: bool, fails: bool) -> Self {
            Self {
                name,
                satisfied,
                fails,
                applied: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Step for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn describe(&self, _ctx: &StepContext<'_>) -> Vec<String> {
            vec![format!("probe {}", self.name)]
        }

        async fn is_satisfied(&self, _ctx: &StepContext<'_>) -> Result<bool> {
            Ok(self.satisfied)
        }

        async fn apply(&self, _ctx: &StepContext<'_>) -> Result<()> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(ProvisionError::UnknownUser);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_failure() {
        let host = HostInfo {
            distro: Distro::Debian,
            codename: "bookworm".to_string(),
            arch: Arch::Arm64,
            user: "alice".to_string(),
            pretty_name: None,
        };
        let config = ProvisionConfig::default();
        let runner = ScriptedRunner::new();
        let fetcher = StaticFetcher::new();
        let ctx = StepContext {
            host: &host,
            config: &config,
            runner: &runner,
            fetcher: &fetcher,
        };

        let pipeline = Pipeline::new(vec![
            Box::new(Probe::new("one", true, false)),
            Box::new(Probe::new("two", false, false)),
            Box::new(Probe::new("three", false, true)),
            Box::new(Probe::new("four", false, false)),
        ]);

        let records = pipeline.run(&ctx).await;
        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::AlreadySatisfied,
                StepStatus::Applied,
                StepStatus::Failed,
                StepStatus::NotRun,
            ]
        );
        assert_eq!(
            records[2].error.as_deref(),
            Some("could not determine the invoking user")
        );
        assert!(records[3].error.is_none());
    }

    #[test]
    fn test_standard_pipeline_honours_toggles() {
        let full = Pipeline::standard(&ProvisionConfig::default());
        assert_eq!(
            full.step_names(),
            vec![
                "prerequisites",
                "trust-key",
                "repository",
                "refresh-index",
                "docker-packages",
                "compose-binary",
                "docker-group",
            ]
        );

        let mut config = ProvisionConfig::default();
        config.compose.enabled = false;
        config.grant_group = false;
        assert_eq!(Pipeline::standard(&config).step_names().len(), 5);
    }
}
