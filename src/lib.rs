//! Build orchestration for coreboot with a LinuxBoot SMM kernel payload.
//!
//! One invocation runs a fixed, ordered pipeline:
//!
//! ```text
//! Install dependencies ─┐   (--depinstall)
//! Check host tools      │
//! Download coreboot     ├── (--fetch, unless --build)
//! Download kernel       │
//! Build kernel ─────────┤   bzImage copied into the LinuxBoot payload slot
//! Build coreboot ───────┘   build/coreboot.rom
//! ```
//!
//! Every external effect goes through a [`process::Runner`], so the stages
//! can be driven against a temporary workspace in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use smm_builder::{BuildContext, Manifest, RunConfig, SystemRunner, Workspace};
//!
//! let runner = SystemRunner;
//! let config = RunConfig { fetch: true, ..RunConfig::default() };
//! let ctx = BuildContext::new(config, Manifest::default(), Workspace::new("."), &runner);
//! smm_builder::pipeline::stages::run(&ctx)?;
//! ```

pub mod build;
pub mod config;
pub mod deps;
pub mod manifest;
pub mod patches;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod workspace;

pub use build::context::BuildContext;
pub use config::{Bitness, ConfigSource, RunConfig, TestScenario};
pub use manifest::Manifest;
pub use pipeline::{run_pipeline, Stage, StageOutcome, StageReport};
pub use process::{Cmd, Runner, SystemRunner};
pub use workspace::Workspace;
