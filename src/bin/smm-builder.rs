//! # smm-builder
//!
//! Fetch, patch and build coreboot with a LinuxBoot SMM kernel payload.
//!
//! ## Usage
//!
//! ```bash
//! smm-builder --depinstall           # Install host packages only
//! smm-builder --fetch                # Fetch both trees, then build
//! smm-builder --fetch --config q35 -b 64 --smp
//! smm-builder --build --testing 2    # Rebuild a testing scenario
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use smm_builder::config::{default_jobs, parse_overlay};
use smm_builder::pipeline::stages;
use smm_builder::{
    Bitness, BuildContext, ConfigSource, Manifest, RunConfig, SystemRunner, TestScenario,
    Workspace,
};

#[derive(Parser, Debug)]
#[command(
    name = "smm-builder",
    version,
    about = "Build coreboot with a LinuxBoot SMM kernel payload"
)]
struct Cli {
    /// Install host build dependencies
    #[arg(long)]
    depinstall: bool,

    /// Fetch the coreboot and kernel sources
    #[arg(long)]
    fetch: bool,

    /// Build only, never fetch
    #[arg(long)]
    build: bool,

    /// Firmware configuration: `default`, `q35` or a path to a defconfig
    #[arg(long, default_value = "default")]
    config: String,

    /// Target bitness (32 or 64)
    #[arg(short = 'b', default_value = "32")]
    bitness: String,

    /// Use the SMP kernel configuration
    #[arg(long)]
    smp: bool,

    /// Directory copied into coreboot's site-local (`no` for none)
    #[arg(long, value_name = "DIR")]
    blobs: Option<PathBuf>,

    /// Testing scenario (0 disables testing)
    #[arg(long, default_value_t = 0)]
    testing: u32,

    /// Directory holding both source trees
    #[arg(long, value_name = "DIR", default_value = ".")]
    workdir: PathBuf,

    /// TOML file overriding repositories, patches and URLs
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Parallel make jobs (defaults to CPU count + 4)
    #[arg(long)]
    jobs: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let config_source: ConfigSource = self.config.parse()?;
        let bitness: Bitness = self.bitness.parse()?;

        Ok(RunConfig {
            install_deps: self.depinstall,
            fetch: self.fetch,
            build_only: self.build,
            config_source,
            bitness,
            smp: self.smp,
            overlay: parse_overlay(self.blobs.clone()),
            testing: TestScenario(self.testing),
            jobs: self.jobs.filter(|&n| n > 0).unwrap_or_else(default_jobs),
        })
    }

    fn manifest(&self) -> Result<Manifest> {
        match &self.manifest {
            Some(path) => Manifest::load(path)
                .with_context(|| format!("loading manifest {}", path.display())),
            None => Ok(Manifest::default()),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.run_config()?;
    let manifest = cli.manifest()?;
    let workspace = Workspace::new(&cli.workdir);

    info!("Using patched kernel for LinuxBootSMM");
    info!(
        config = %config.config_source,
        bitness = %config.bitness,
        smp = config.smp,
        testing = %config.testing,
        jobs = config.jobs,
        "workspace {}",
        workspace.root().display()
    );

    let runner = SystemRunner;
    let ctx = BuildContext::new(config, manifest, workspace, &runner);
    stages::run(&ctx)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => {
            info!("execution completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
