//! coreboot retrieval, configuration and compilation.

use anyhow::{bail, Context, Result};
use std::fs;
use tracing::info;

use crate::build::context::BuildContext;
use crate::build::defconfig::{discard_baseline, prepare_defconfig};
use crate::build::filesystem::{copy_tree, replace_with_copy};
use crate::config::ConfigSource;
use crate::patches::{self, PatchTarget};
use crate::process::Cmd;
use crate::workspace::FIRMWARE_DIR;

/// File name the testing defconfig lines load the module under.
pub const TESTING_MODULE: &str = "smi.ko";

/// Clone coreboot, build its toolchain, fetch the configuration fragment,
/// lay down the overlay, patch and configure.
pub fn fetch_firmware(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;

    info!("cloning coreboot from {}", ctx.manifest.firmware_repo);
    Cmd::new("git")
        .args(["clone", ctx.manifest.firmware_repo.as_str(), FIRMWARE_DIR])
        .current_dir(ws.root())
        .error_msg("cloning coreboot failed")
        .run(ctx.runner())?;

    info!("building coreboot toolchain ({})", ctx.manifest.toolchain_target);
    Cmd::new("make")
        .arg(ctx.jobs_arg())
        .arg(ctx.manifest.toolchain_target.as_str())
        .arg(format!("CPUS={}", ctx.config.jobs))
        .current_dir(ws.firmware_dir())
        .error_msg("toolchain build failed")
        .run(ctx.runner())?;

    obtain_defconfig(ctx)?;
    prepare_overlay(ctx)?;

    patches::apply(ctx, PatchTarget::Firmware)?;
    if ctx.config.testing.is_enabled() {
        patches::apply(ctx, PatchTarget::Testing)?;
    }

    prepare_defconfig(ctx)
}

/// Put the selected configuration fragment at `coreboot-git/defconfig`.
fn obtain_defconfig(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;
    let url = match &ctx.config.config_source {
        ConfigSource::Default => ctx.manifest.default_defconfig_url.clone(),
        ConfigSource::Q35 => ctx.manifest.q35_defconfig_url(ctx.config.bitness),
        ConfigSource::Local(path) => {
            info!("using local defconfig {}", path.display());
            replace_with_copy(path, &ws.defconfig())
                .with_context(|| format!("copying defconfig from {}", path.display()))?;
            return discard_baseline(ws);
        }
    };

    info!("fetching defconfig from {url}");
    Cmd::new("wget")
        .args(["-O", "defconfig", url.as_str()])
        .current_dir(ws.firmware_dir())
        .error_msg("obtaining coreboot config failed")
        .run(ctx.runner())?;
    discard_baseline(ws)
}

/// Copy the caller's overlay into `site-local`, or make sure an empty one exists.
fn prepare_overlay(ctx: &BuildContext<'_>) -> Result<()> {
    let site_local = ctx.workspace.site_local();
    match &ctx.config.overlay {
        Some(overlay) => {
            info!("copying site-local overlay from {}", overlay.display());
            copy_tree(overlay, &site_local).context("copying custom site-local failed")
        }
        None => fs::create_dir_all(&site_local)
            .with_context(|| format!("creating {}", site_local.display())),
    }
}

/// Discard every local commit in the firmware tree.
pub fn reset_tree(ctx: &BuildContext<'_>) -> Result<()> {
    Cmd::new("git")
        .args(["reset", "--hard", ctx.manifest.firmware_reset_ref.as_str()])
        .current_dir(ctx.workspace.firmware_dir())
        .error_msg("resetting coreboot tree failed")
        .run(ctx.runner())
}

/// Fetch the test kernel module into `site-local` and reconfigure.
pub fn include_testing_module(ctx: &BuildContext<'_>) -> Result<()> {
    let site_local = ctx.workspace.site_local();
    fs::create_dir_all(&site_local)
        .with_context(|| format!("creating {}", site_local.display()))?;

    patches::obtain_file(ctx, &site_local, TESTING_MODULE, &ctx.manifest.testing_module_url)
        .context("obtaining testing module failed")?;

    prepare_defconfig(ctx)
}

/// Reset the tree and reapply exactly the patches the current flags ask for.
///
/// Nothing records which patches a tree already carries, so the only way to
/// get a deterministic state is to drop them all and start over.
pub fn rebuild_reset(ctx: &BuildContext<'_>) -> Result<()> {
    reset_tree(ctx)?;
    patches::apply(ctx, PatchTarget::Firmware)?;

    if ctx.config.testing.is_enabled() {
        include_testing_module(ctx)?;
        patches::apply(ctx, PatchTarget::Testing)?;
    } else {
        prepare_defconfig(ctx)?;
    }
    Ok(())
}

/// Clean, reset, reconfigure and compile coreboot, then check the ROM exists.
pub fn build_firmware(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;
    let config = ws.firmware_config();
    if !config.is_file() {
        bail!(
            "coreboot is not configured ({} missing)\nRun with --fetch first.",
            config.display()
        );
    }

    // coreboot skips u-root generation when a stale initramfs is present
    Cmd::new("make")
        .arg("clean")
        .current_dir(ws.firmware_dir())
        .error_msg("cleaning coreboot failed")
        .run(ctx.runner())?;

    rebuild_reset(ctx)?;

    info!("building coreboot");
    Cmd::new("make")
        .arg(ctx.jobs_arg())
        .current_dir(ws.firmware_dir())
        .error_msg("coreboot build failed")
        .run(ctx.runner())?;

    let rom = ws.firmware_rom();
    if !rom.is_file() {
        bail!(
            "coreboot build reported success but {} is missing",
            rom.display()
        );
    }
    info!("{} created", rom.display());
    Ok(())
}
