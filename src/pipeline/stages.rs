//! The builder's stage table.

use anyhow::Result;

use super::{run_pipeline, Stage, StageReport};
use crate::build::context::BuildContext;
use crate::build::{firmware, kernel};
use crate::{deps, preflight};

pub const INSTALL_DEPENDENCIES: &str = "Install dependencies";
pub const CHECK_HOST_TOOLS: &str = "Check host tools";
pub const DOWNLOAD_COREBOOT: &str = "Download coreboot";
pub const DOWNLOAD_KERNEL: &str = "Download kernel sources";
pub const BUILD_KERNEL: &str = "Build kernel";
pub const BUILD_COREBOOT: &str = "Build coreboot";

/// Build the ordered stage list for `ctx`'s run configuration.
pub fn stages<'a>(ctx: &'a BuildContext<'_>) -> Vec<Stage<'a>> {
    let config = &ctx.config;
    let fetching = config.fetches_sources();
    let building = config.builds();

    vec![
        Stage::new(INSTALL_DEPENDENCIES, move || deps::install_dependencies(ctx))
            .skip_if(!config.install_deps),
        Stage::new(CHECK_HOST_TOOLS, preflight::check_host_tools)
            .skip_if(!fetching && !building),
        Stage::new(DOWNLOAD_COREBOOT, move || firmware::fetch_firmware(ctx))
            .skip_if(!fetching),
        Stage::new(DOWNLOAD_KERNEL, move || kernel::fetch_kernel(ctx))
            .skip_if(!fetching),
        Stage::new(BUILD_KERNEL, move || kernel::build_kernel(ctx))
            .skip_if(!building),
        Stage::new(BUILD_COREBOOT, move || firmware::build_firmware(ctx))
            .skip_if(!building),
    ]
}

/// Run the full pipeline for `ctx`.
pub fn run(ctx: &BuildContext<'_>) -> Result<Vec<StageReport>> {
    run_pipeline(&stages(ctx))
}
