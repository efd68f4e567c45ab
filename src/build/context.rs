//! Build context shared by every stage.

use std::path::PathBuf;

use crate::config::RunConfig;
use crate::manifest::Manifest;
use crate::process::Runner;
use crate::workspace::Workspace;

/// Host identification file read by the dependency installer.
pub const OS_RELEASE: &str = "/etc/os-release";

/// Everything a stage needs, fixed for the duration of one run.
///
/// Stages borrow the context instead of reading global state, so tests can
/// build one around a temporary workspace and a recording runner.
pub struct BuildContext<'r> {
    pub config: RunConfig,
    pub manifest: Manifest,
    pub workspace: Workspace,
    /// Path to the os-release file used for host distribution detection.
    pub os_release: PathBuf,
    runner: &'r dyn Runner,
}

impl<'r> BuildContext<'r> {
    pub fn new(
        config: RunConfig,
        manifest: Manifest,
        workspace: Workspace,
        runner: &'r dyn Runner,
    ) -> Self {
        Self {
            config,
            manifest,
            workspace,
            os_release: PathBuf::from(OS_RELEASE),
            runner,
        }
    }

    pub fn with_os_release(mut self, path: impl Into<PathBuf>) -> Self {
        self.os_release = path.into();
        self
    }

    pub fn runner(&self) -> &'r dyn Runner {
        self.runner
    }

    /// `-j<jobs>` argument for native builds.
    pub fn jobs_arg(&self) -> String {
        format!("-j{}", self.config.jobs)
    }
}
