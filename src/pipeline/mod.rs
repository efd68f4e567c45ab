//! Pipeline driver.
//!
//! Runs an ordered list of named stages. Each stage carries a skip flag
//! computed from the run configuration and an ignore-failure flag. The
//! first failing stage that is not ignored aborts the run; nothing is
//! retried and nothing is rolled back, re-running is the recovery path.

pub mod stages;

use anyhow::Result;
use std::fmt;
use tracing::{info, info_span, warn};

/// Action run by a stage.
pub type StageAction<'a> = Box<dyn Fn() -> Result<()> + 'a>;

/// One named unit of the pipeline.
pub struct Stage<'a> {
    pub name: &'static str,
    pub skip: bool,
    pub ignore_failure: bool,
    action: StageAction<'a>,
}

impl<'a> Stage<'a> {
    pub fn new(name: &'static str, action: impl Fn() -> Result<()> + 'a) -> Self {
        Self {
            name,
            skip: false,
            ignore_failure: false,
            action: Box::new(action),
        }
    }

    pub fn skip_if(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Log a failure of this stage and keep going.
    pub fn ignore_failure(mut self) -> Self {
        self.ignore_failure = true;
        self
    }
}

impl fmt::Debug for Stage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("skip", &self.skip)
            .field("ignore_failure", &self.ignore_failure)
            .finish_non_exhaustive()
    }
}

/// What happened to a stage during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Skipped,
    Completed,
    /// The action failed but the stage is marked ignore-failure.
    FailedIgnored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: &'static str,
    pub outcome: StageOutcome,
}

/// Run `stages` in order.
///
/// Returns one report per stage on success. On the first non-ignored
/// failure the remaining stages are not run and the error carries the
/// failing stage's name.
pub fn run_pipeline(stages: &[Stage<'_>]) -> Result<Vec<StageReport>> {
    let mut reports = Vec::with_capacity(stages.len());

    for stage in stages {
        let _span = info_span!("stage", name = stage.name).entered();
        info!("-----> Step {}", stage.name);

        let outcome = if stage.skip {
            info!("-------> Skip");
            StageOutcome::Skipped
        } else {
            info!("----------> Start");
            match (stage.action)() {
                Ok(()) => {
                    info!("----------> Finished {}", stage.name);
                    StageOutcome::Completed
                }
                Err(e) if stage.ignore_failure => {
                    warn!("----------> Ignoring failure: {e:#}");
                    StageOutcome::FailedIgnored
                }
                Err(e) => return Err(e.context(format!("{} failed", stage.name))),
            }
        };

        reports.push(StageReport {
            name: stage.name,
            outcome,
        });
    }

    Ok(reports)
}
