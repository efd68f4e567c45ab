//! Resolved run configuration.
//!
//! Built once from the command line and never mutated afterwards. Every
//! stage's skip predicate and branch reads from here.

use anyhow::{bail, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Headroom added to the processor count when sizing native build jobs.
pub const JOB_HEADROOM: usize = 4;

/// Where the firmware configuration fragment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Upstream Raptor Lake profile.
    Default,
    /// Upstream QEMU q35 profile for the selected bitness.
    Q35,
    /// Caller-supplied file linked into the firmware tree.
    Local(PathBuf),
}

impl FromStr for ConfigSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => bail!("configuration source must not be empty"),
            "default" => Ok(ConfigSource::Default),
            "q35" => Ok(ConfigSource::Q35),
            path => Ok(ConfigSource::Local(PathBuf::from(path))),
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("default"),
            ConfigSource::Q35 => f.write_str("q35"),
            ConfigSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Target instruction-set width of the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bitness {
    #[default]
    X86_32,
    X86_64,
}

impl Bitness {
    pub fn as_str(self) -> &'static str {
        match self {
            Bitness::X86_32 => "32",
            Bitness::X86_64 => "64",
        }
    }
}

impl FromStr for Bitness {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "32" => Ok(Bitness::X86_32),
            "64" => Ok(Bitness::X86_64),
            other => bail!("unsupported bitness '{}' (expected 32 or 64)", other),
        }
    }
}

impl fmt::Display for Bitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integration-testing scenario. `0` means a regular build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TestScenario(pub u32);

impl TestScenario {
    pub const NONE: TestScenario = TestScenario(0);

    pub fn is_enabled(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TestScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every flag the pipeline looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub install_deps: bool,
    pub fetch: bool,
    pub build_only: bool,
    pub config_source: ConfigSource,
    pub bitness: Bitness,
    pub smp: bool,
    /// Overlay directory copied into the firmware's `site-local`.
    pub overlay: Option<PathBuf>,
    pub testing: TestScenario,
    /// Parallelism handed to `make -j`.
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            install_deps: false,
            fetch: false,
            build_only: false,
            config_source: ConfigSource::Default,
            bitness: Bitness::default(),
            smp: false,
            overlay: None,
            testing: TestScenario::NONE,
            jobs: default_jobs(),
        }
    }
}

impl RunConfig {
    /// Whether the source retrieval stages run.
    pub fn fetches_sources(&self) -> bool {
        self.fetch && !self.build_only
    }

    /// Whether the compilation stages run.
    pub fn builds(&self) -> bool {
        !self.install_deps
    }
}

/// Available processors plus [`JOB_HEADROOM`].
pub fn default_jobs() -> usize {
    let cpus = match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            tracing::warn!("could not detect CPU count ({}), assuming 1", e);
            1
        }
    };
    cpus + JOB_HEADROOM
}

/// Accept the legacy `no` sentinel for "no overlay".
pub fn parse_overlay(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|path| path.as_os_str() != "no" && !path.as_os_str().is_empty())
}
