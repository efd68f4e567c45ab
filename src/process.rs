//! External process invocation.
//!
//! Every tool the builder drives (git, wget, make, package managers) goes
//! through [`Cmd`] and a [`Runner`]. The system runner wires the child's
//! stdin/stdout/stderr to the operator's terminal so long-running native
//! builds stay observable and interactive; tests swap in a recording runner
//! that never spawns anything.
//!
//! # Usage
//!
//! ```rust,ignore
//! use smm_builder::process::{Cmd, SystemRunner};
//!
//! Cmd::new("make")
//!     .args(["-j8"])
//!     .current_dir(&firmware_dir)
//!     .error_msg("coreboot build failed")
//!     .run(&SystemRunner)?;
//! ```

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// How the child's standard streams are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Inherit stdin/stdout/stderr from the builder.
    Interactive,
    /// Discard all streams. Used for status probes.
    Quiet,
}

/// A typed external command: executable, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    stdio: StdioMode,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            stdio: StdioMode::Interactive,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Discard the child's output (status checks only).
    pub fn quiet(mut self) -> Self {
        self.stdio = StdioMode::Quiet;
        self
    }

    /// Message used as the error headline when the command exits non-zero.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn stdio(&self) -> StdioMode {
        self.stdio
    }

    /// Run the command and fail unless it exits successfully.
    pub fn run(&self, runner: &dyn Runner) -> Result<()> {
        let outcome = runner
            .execute(self)
            .with_context(|| format!("executing `{}`", self))?;

        if !outcome.success() {
            match &self.error_msg {
                Some(msg) => bail!("{msg}: `{}` {outcome}", self),
                None => bail!("`{}` {outcome}", self),
            }
        }
        Ok(())
    }

    /// Run the command as a probe. Spawn errors count as failure.
    pub fn succeeds(&self, runner: &dyn Runner) -> bool {
        runner
            .execute(self)
            .map(|outcome| outcome.success())
            .unwrap_or(false)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of a finished external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl Outcome {
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exited with status {code}"),
            None => f.write_str("was terminated by a signal"),
        }
    }
}

/// Executes [`Cmd`]s.
pub trait Runner {
    /// Run `cmd` to completion. Returns `Err` only if the process could not
    /// be started; a non-zero exit is reported through [`Outcome`].
    fn execute(&self, cmd: &Cmd) -> Result<Outcome>;
}

/// Spawns real processes. No timeout is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn execute(&self, cmd: &Cmd) -> Result<Outcome> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(dir) = &cmd.dir {
            command.current_dir(dir);
        }
        match cmd.stdio {
            StdioMode::Interactive => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            StdioMode::Quiet => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
        }

        match &cmd.dir {
            Some(dir) => debug!(dir = %dir.display(), "running `{cmd}`"),
            None => debug!("running `{cmd}`"),
        }

        let status = command
            .status()
            .with_context(|| format!("failed to spawn '{}'", cmd.program))?;
        Ok(Outcome {
            code: status.code(),
        })
    }
}
