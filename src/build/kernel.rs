//! Kernel retrieval, configuration and compilation.
//!
//! The kernel is cloned into `linux-smm`, patched with the kernel-owned SMI
//! handler series, configured from a remote fragment and built in place.
//! The resulting `bzImage` becomes coreboot's LinuxBoot payload.
//!
//! # Usage
//!
//! ```rust,ignore
//! use smm_builder::build::kernel::{build_kernel, fetch_kernel};
//!
//! fetch_kernel(&ctx)?;
//! build_kernel(&ctx)?;
//! ```

use anyhow::{Context, Result};
use tracing::info;

use crate::build::context::BuildContext;
use crate::build::filesystem::{copy_file, fingerprint};
use crate::patches::{self, PatchTarget};
use crate::process::Cmd;
use crate::workspace::KERNEL_DIR;

/// Clone, patch and configure the kernel tree.
///
/// A failed clone is fatal: patching a missing or stale tree would only
/// produce confusing errors further down.
pub fn fetch_kernel(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;

    info!("cloning kernel from {}", ctx.manifest.kernel_repo);
    Cmd::new("git")
        .args(["clone", ctx.manifest.kernel_repo.as_str(), KERNEL_DIR])
        .current_dir(ws.root())
        .error_msg("cloning the kernel failed")
        .run(ctx.runner())?;

    patches::apply(ctx, PatchTarget::Kernel)?;

    let url = ctx.manifest.kernel_config_url(ctx.config.smp);
    info!(smp = ctx.config.smp, "fetching kernel config from {url}");
    Cmd::new("wget")
        .args(["-O", ".config", url])
        .current_dir(ws.kernel_dir())
        .error_msg("obtaining kernel config failed")
        .run(ctx.runner())?;

    info!("resolving kernel config");
    Cmd::new("make")
        .arg("olddefconfig")
        .current_dir(ws.kernel_dir())
        .error_msg("make olddefconfig failed")
        .run(ctx.runner())?;

    let config = ws.kernel_config();
    if config.is_file() {
        info!("kernel .config sha256={}", fingerprint(&config)?);
    }
    Ok(())
}

/// Build the kernel and install its boot image as the coreboot payload.
pub fn build_kernel(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;

    info!("building kernel with {}", ctx.jobs_arg());
    Cmd::new("make")
        .arg(ctx.jobs_arg())
        .current_dir(ws.kernel_dir())
        .error_msg("kernel build failed")
        .run(ctx.runner())?;

    let image = ws.kernel_image();
    let payload = ws.payload_image();
    copy_file(&image, &payload).context("installing kernel image as LinuxBoot payload")?;
    info!("kernel image installed at {}", payload.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::manifest::Manifest;
    use crate::process::testing::RecordingRunner;
    use crate::workspace::Workspace;
    use std::fs;
    use tempfile::TempDir;

    fn ctx_with(runner: &RecordingRunner, ws: Workspace, smp: bool) -> BuildContext<'_> {
        let config = RunConfig {
            fetch: true,
            smp,
            jobs: 12,
            ..RunConfig::default()
        };
        BuildContext::new(config, Manifest::default(), ws, runner)
    }

    #[test]
    fn test_fetch_kernel_order() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ctx_with(&runner, Workspace::new(temp.path()), false);

        fetch_kernel(&ctx).unwrap();

        let lines = runner.lines();
        assert_eq!(
            lines[0],
            "git clone https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git linux-smm"
        );
        let patch_count = ctx.manifest.kernel_patches.len();
        assert!(lines[1..=patch_count * 2]
            .iter()
            .step_by(2)
            .all(|l| l.starts_with("wget -O 000")));
        assert!(lines[patch_count * 2 + 1].ends_with("/defconfig-linux"));
        assert_eq!(lines.last().unwrap(), "make olddefconfig");
    }

    #[test]
    fn test_fetch_kernel_smp_config() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ctx_with(&runner, Workspace::new(temp.path()), true);

        fetch_kernel(&ctx).unwrap();

        assert!(runner
            .lines()
            .iter()
            .any(|l| l.starts_with("wget -O .config") && l.ends_with("defconfig-linux-smp")));
    }

    #[test]
    fn test_failed_kernel_clone_is_fatal() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new().failing_when(|cmd| {
            cmd.program() == "git" && cmd.get_args().first().map(String::as_str) == Some("clone")
        });
        let ctx = ctx_with(&runner, Workspace::new(temp.path()), false);

        let err = fetch_kernel(&ctx).unwrap_err();
        assert!(err.to_string().contains("cloning the kernel failed"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_build_kernel_installs_payload() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        let image = ws.kernel_image();
        let runner = RecordingRunner::new().with_effect(move |cmd| {
            if cmd.program() == "make" {
                fs::create_dir_all(image.parent().unwrap()).unwrap();
                fs::write(&image, "bzImage").unwrap();
            }
        });
        let ctx = ctx_with(&runner, ws.clone(), false);

        build_kernel(&ctx).unwrap();

        assert_eq!(runner.lines(), vec!["make -j12".to_string()]);
        assert_eq!(fs::read_to_string(ws.payload_image()).unwrap(), "bzImage");
    }

    #[test]
    fn test_build_kernel_without_image_fails() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let ctx = ctx_with(&runner, Workspace::new(temp.path()), false);

        let err = build_kernel(&ctx).unwrap_err();
        assert!(format!("{err:#}").contains("bzImage"));
    }
}
