//! The provisioner: host detection followed by the install pipeline

use crate::config::ProvisionConfig;
use crate::exec::CommandRunner;
use crate::fetch::Fetcher;
use crate::host::{HostInfo, HostOverrides, detect_host};
use crate::pipeline::{Pipeline, PlannedStep, StepRecord, StepStatus};
use crate::report::ProvisionReport;
use crate::steps::StepContext;
use chrono::Utc;

pub const DETECT_STEP: &str = "detect-host";

pub struct Provisioner<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        runner: &'a dyn CommandRunner,
        fetcher: &'a dyn Fetcher,
    ) -> Self {
        Self {
            config,
            runner,
            fetcher,
        }
    }

    fn context<'h>(&self, host: &'h HostInfo) -> StepContext<'h>
    where
        'a: 'h,
    {
        StepContext {
            host,
            config: self.config,
            runner: self.runner,
            fetcher: self.fetcher,
        }
    }

    pub fn plan(&self, host: &HostInfo) -> Vec<PlannedStep> {
        Pipeline::standard(self.config).plan(&self.context(host))
    }

    /// Detect the host, then run every step. A detection failure is
    /// recorded as the first step and nothing else runs.
    pub async fn run(&self, overrides: &HostOverrides) -> ProvisionReport {
        let pipeline = Pipeline::standard(self.config);

        let host = match detect_host(self.runner, overrides) {
            Ok(host) => host,
            Err(e) => {
                let error = e.chain();
                tracing::error!(step = DETECT_STEP, error = %error, "step failed");
                let mut steps = vec![StepRecord::failed(DETECT_STEP, error)];
                steps.extend(
                    pipeline
                        .step_names()
                        .into_iter()
                        .map(|name| StepRecord::new(name, StepStatus::NotRun)),
                );
                return ProvisionReport::new(Utc::now().to_rfc3339(), None, steps);
            }
        };

        let mut steps = vec![StepRecord::new(DETECT_STEP, StepStatus::Applied)];
        steps.extend(pipeline.run(&self.context(&host)).await);

        ProvisionReport::new(Utc::now().to_rfc3339(), Some(host), steps)
    }
}
