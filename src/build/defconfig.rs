//! Firmware defconfig mutation.
//!
//! Testing builds append a few lines to coreboot's `defconfig` so the
//! payload ships the test module and loads it from a custom bootloader
//! command. The untouched fragment is kept in `defconfig.bak`; every run
//! starts from that baseline, so appends never stack up and a regular build
//! always gets the pristine fragment back.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::build::context::BuildContext;
use crate::build::filesystem::fingerprint;
use crate::process::Cmd;
use crate::workspace::Workspace;

/// Bring `defconfig` in line with the run's testing scenario and regenerate
/// the full `.config` from it.
pub fn prepare_defconfig(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;
    if ctx.config.testing.is_enabled() {
        take_baseline(ws)?;
        append_lines(&ws.defconfig(), &ctx.manifest.testing_defconfig)?;
        info!("defconfig prepared for testing scenario {}", ctx.config.testing);
    } else {
        restore_defconfig(ws)?;
    }

    regenerate_config(ctx)
}

/// Run `make defconfig` on the current fragment and log the result's hash.
pub fn regenerate_config(ctx: &BuildContext<'_>) -> Result<()> {
    let ws = &ctx.workspace;
    Cmd::new("make")
        .args(["defconfig", "KBUILD_DEFCONFIG=defconfig"])
        .current_dir(ws.firmware_dir())
        .error_msg("generating coreboot config failed")
        .run(ctx.runner())?;

    let config = ws.firmware_config();
    if config.is_file() {
        info!("coreboot .config sha256={}", fingerprint(&config)?);
    }
    Ok(())
}

/// Put the backed-up fragment back, if there is one.
pub fn restore_defconfig(ws: &Workspace) -> Result<()> {
    let backup = ws.defconfig_backup();
    if !backup.is_file() {
        debug!("no defconfig backup, nothing to restore");
        return Ok(());
    }
    fs::copy(&backup, ws.defconfig())
        .with_context(|| format!("restoring defconfig from {}", backup.display()))?;
    debug!("defconfig restored from {}", backup.display());
    Ok(())
}

/// Forget the current baseline. Called when a fresh fragment is fetched.
pub fn discard_baseline(ws: &Workspace) -> Result<()> {
    let backup = ws.defconfig_backup();
    if backup.is_file() {
        fs::remove_file(&backup)
            .with_context(|| format!("removing stale {}", backup.display()))?;
    }
    Ok(())
}

/// Restore from the backup if it exists, otherwise create it.
fn take_baseline(ws: &Workspace) -> Result<()> {
    let defconfig = ws.defconfig();
    let backup = ws.defconfig_backup();
    if backup.is_file() {
        return restore_defconfig(ws);
    }
    fs::copy(&defconfig, &backup).with_context(|| {
        format!("backing up {} to {}", defconfig.display(), backup.display())
    })?;
    Ok(())
}

fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    let existing = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))?;

    let mut chunk = String::new();
    if !existing.is_empty() && !existing.ends_with(b"\n") {
        chunk.push('\n');
    }
    for line in lines {
        chunk.push_str(line);
        chunk.push('\n');
    }
    file.write_all(chunk.as_bytes())
        .with_context(|| format!("appending to {}", path.display()))?;
    Ok(())
}
