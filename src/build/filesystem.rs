//! Filesystem helpers used while preparing the source trees.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Merge the directory tree at `src` into `dst`.
///
/// Existing files in `dst` are overwritten, files only present in `dst`
/// are left alone. Symlinks are recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        bail!("overlay directory not found: {}", src.display());
    }

    fs::create_dir_all(dst).with_context(|| format!("creating {}", dst.display()))?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing {}", entry.path().display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.is_symlink() || target.exists() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)
                .with_context(|| format!("linking {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "copying {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }

    Ok(())
}

/// Put an independent copy of `src` at `dst`.
///
/// `dst` is unlinked first, so a hard link or symlink left there by an
/// earlier run never carries writes back into the caller's file.
pub fn replace_with_copy(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        bail!("configuration file not found: {}", src.display());
    }
    if dst.is_symlink() || dst.exists() {
        fs::remove_file(dst).with_context(|| format!("removing {}", dst.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Copy a single file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        bail!("file not found: {}", src.display());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Hex SHA-256 of a file's contents.
pub fn fingerprint(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
