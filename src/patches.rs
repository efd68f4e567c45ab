//! Patch set download and application.
//!
//! Patches are opaque mailbox files fetched from a remote base URL and
//! applied with `git am`, strictly in list order. No dependency resolution
//! is performed: a later patch may rely on an earlier one.
//!
//! Downloaded patches are untracked files, so they survive `git reset --hard`.
//! A run that does not fetch applies those copies and never goes to the
//! network.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::build::context::BuildContext;
use crate::process::Cmd;

/// Which patch list to apply, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    /// Base LinuxBoot MM support for coreboot.
    Firmware,
    /// Kernel-owned SMI handler support.
    Kernel,
    /// Scenario-specific coreboot patches for integration tests.
    Testing,
}

impl fmt::Display for PatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchTarget::Firmware => write!(f, "coreboot"),
            PatchTarget::Kernel => write!(f, "kernel"),
            PatchTarget::Testing => write!(f, "testing"),
        }
    }
}

/// A resolved patch list for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSet<'a> {
    pub base_url: &'a str,
    pub files: &'a [String],
    /// Working tree the patches are downloaded into and applied to.
    pub dir: PathBuf,
}

impl PatchSet<'_> {
    pub fn url(&self, file: &str) -> String {
        format!("{}{}", self.base_url, file)
    }
}

/// Resolve the patch list for `target` under the current run configuration.
pub fn patch_set<'a>(ctx: &'a BuildContext<'_>, target: PatchTarget) -> PatchSet<'a> {
    let manifest = &ctx.manifest;
    match target {
        PatchTarget::Firmware => PatchSet {
            base_url: &manifest.firmware_patch_base,
            files: &manifest.firmware_patches,
            dir: ctx.workspace.firmware_dir(),
        },
        PatchTarget::Kernel => PatchSet {
            base_url: &manifest.kernel_patch_base,
            files: &manifest.kernel_patches,
            dir: ctx.workspace.kernel_dir(),
        },
        PatchTarget::Testing => PatchSet {
            base_url: &manifest.testing_patch_base,
            files: manifest.scenario_patches(ctx.config.testing),
            dir: ctx.workspace.firmware_dir(),
        },
    }
}

/// Fetch and `git am` every patch of `target`, in order.
///
/// The first failing fetch or apply aborts; later patches are not tried.
pub fn apply_patches(ctx: &BuildContext<'_>, target: PatchTarget) -> Result<()> {
    let set = patch_set(ctx, target);
    if set.files.is_empty() {
        info!("no {target} patches to apply");
        return Ok(());
    }

    info!("applying {} {target} patch(es)", set.files.len());
    for file in set.files {
        obtain_file(ctx, &set.dir, file, &set.url(file))
            .with_context(|| format!("obtaining patch {file} failed"))?;

        Cmd::new("git")
            .args(["am", file.as_str()])
            .current_dir(&set.dir)
            .error_msg(format!("applying patch {file} failed"))
            .run(ctx.runner())?;
        info!("  applied {file}");
    }

    Ok(())
}

/// Download `url` to `dir/file`, overwriting any earlier copy.
///
/// When the run does not fetch sources the existing copy is used as is; a
/// missing one is an error.
pub fn obtain_file(ctx: &BuildContext<'_>, dir: &Path, file: &str, url: &str) -> Result<()> {
    if !ctx.config.fetches_sources() {
        let local = dir.join(file);
        if !local.is_file() {
            bail!(
                "{} not found and this run does not fetch\nRun with --fetch first.",
                local.display()
            );
        }
        debug!("reusing {}", local.display());
        return Ok(());
    }

    Cmd::new("wget")
        .args(["-O", file, url])
        .current_dir(dir)
        .run(ctx.runner())
}

/// [`apply_patches`] with the target named in the error.
pub fn apply(ctx: &BuildContext<'_>, target: PatchTarget) -> Result<()> {
    apply_patches(ctx, target).with_context(|| format!("applying {target} patches"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunConfig, TestScenario};
    use crate::manifest::Manifest;
    use crate::process::testing::RecordingRunner;
    use crate::workspace::Workspace;
    use std::fs;
    use tempfile::TempDir;

    fn context(runner: &RecordingRunner, testing: u32) -> BuildContext<'_> {
        let config = RunConfig {
            fetch: true,
            testing: TestScenario(testing),
            jobs: 8,
            ..RunConfig::default()
        };
        BuildContext::new(config, Manifest::default(), Workspace::new("/work"), runner)
    }

    #[test]
    fn test_firmware_patches_fetch_then_apply_in_order() {
        let runner = RecordingRunner::new();
        let ctx = context(&runner, 0);

        apply_patches(&ctx, PatchTarget::Firmware).unwrap();

        let calls = runner.calls();
        let patches = &ctx.manifest.firmware_patches;
        assert_eq!(calls.len(), patches.len() * 2);
        for (pair, patch) in calls.chunks(2).zip(patches) {
            assert_eq!(pair[0].program(), "wget");
            assert_eq!(
                pair[0].get_args().last().unwrap(),
                &format!("{}{}", ctx.manifest.firmware_patch_base, patch)
            );
            assert_eq!(pair[1].to_string(), format!("git am {patch}"));
            assert_eq!(pair[1].dir(), Some(std::path::Path::new("/work/coreboot-git")));
        }
    }

    #[test]
    fn test_kernel_patches_run_in_kernel_tree() {
        let runner = RecordingRunner::new();
        let ctx = context(&runner, 0);

        apply_patches(&ctx, PatchTarget::Kernel).unwrap();

        assert_eq!(runner.calls().len(), ctx.manifest.kernel_patches.len() * 2);
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.dir() == Some(std::path::Path::new("/work/linux-smm"))));
    }

    #[test]
    fn test_failure_aborts_remaining_patches() {
        let runner = RecordingRunner::new().failing_when(|cmd| {
            cmd.program() == "git"
                && cmd.get_args().get(1).map(String::as_str)
                    == Some("0002-drivers-payload_mm_interface-Implement-payload-MM-co.patch")
        });
        let ctx = context(&runner, 0);

        let err = apply(&ctx, PatchTarget::Firmware).unwrap_err();

        // wget+am for the first patch, wget+failing am for the second
        assert_eq!(runner.calls().len(), 4);
        let msg = format!("{err:#}");
        assert!(msg.contains("applying coreboot patches"));
        assert!(msg.contains("0002-drivers-payload_mm_interface"));
    }

    #[test]
    fn test_fetch_failure_skips_apply() {
        let runner = RecordingRunner::new().failing_when(|cmd| cmd.program() == "wget");
        let ctx = context(&runner, 0);

        assert!(apply_patches(&ctx, PatchTarget::Kernel).is_err());
        assert_eq!(runner.lines().len(), 1);
    }

    #[test]
    fn test_testing_patches_follow_scenario() {
        let runner = RecordingRunner::new();
        let ctx = context(&runner, 3);

        apply_patches(&ctx, PatchTarget::Testing).unwrap();

        assert_eq!(
            runner.lines()[1],
            "git am 0002-drivers-payload_mm_interface-triggering-post-ep-check.patch"
        );
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_scenario_without_patches_is_noop() {
        let runner = RecordingRunner::new();
        let ctx = context(&runner, 1);

        apply_patches(&ctx, PatchTarget::Testing).unwrap();

        assert!(runner.calls().is_empty());
    }

    fn offline_context<'r>(runner: &'r RecordingRunner, ws: &Workspace) -> BuildContext<'r> {
        let config = RunConfig {
            build_only: true,
            jobs: 8,
            ..RunConfig::default()
        };
        BuildContext::new(config, Manifest::default(), ws.clone(), runner)
    }

    #[test]
    fn test_build_only_reuses_downloaded_patches() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        fs::create_dir_all(ws.firmware_dir()).unwrap();
        let runner = RecordingRunner::new();
        let ctx = offline_context(&runner, &ws);
        for patch in &ctx.manifest.firmware_patches {
            fs::write(ws.firmware_dir().join(patch), "From: someone\n").unwrap();
        }

        apply_patches(&ctx, PatchTarget::Firmware).unwrap();

        let lines = runner.lines();
        assert!(lines.iter().all(|l| l.starts_with("git am ")));
        assert_eq!(lines.len(), ctx.manifest.firmware_patches.len());
    }

    #[test]
    fn test_build_only_with_missing_patch_fails_without_download() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        fs::create_dir_all(ws.firmware_dir()).unwrap();
        let runner = RecordingRunner::new();
        let ctx = offline_context(&runner, &ws);

        let err = apply(&ctx, PatchTarget::Firmware).unwrap_err();

        assert!(runner.calls().is_empty());
        let msg = format!("{err:#}");
        assert!(msg.contains("0001-drivers-payload_mm_interface"));
        assert!(msg.contains("--fetch"));
    }
}
