//! Working directories driven by the builder.
//!
//! The builder never owns the contents of the two checkouts; it only knows
//! where they live and which well-known files inside them it reads or
//! touches.

use std::path::{Path, PathBuf};

/// Checkout directory of the firmware tree, relative to the workspace root.
pub const FIRMWARE_DIR: &str = "coreboot-git";

/// Checkout directory of the kernel tree, relative to the workspace root.
pub const KERNEL_DIR: &str = "linux-smm";

/// Location of the two source trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn firmware_dir(&self) -> PathBuf {
        self.root.join(FIRMWARE_DIR)
    }

    pub fn kernel_dir(&self) -> PathBuf {
        self.root.join(KERNEL_DIR)
    }

    /// Configuration fragment fed to `make defconfig`.
    pub fn defconfig(&self) -> PathBuf {
        self.firmware_dir().join("defconfig")
    }

    /// Pristine copy of [`Self::defconfig`] taken before testing lines are appended.
    pub fn defconfig_backup(&self) -> PathBuf {
        self.firmware_dir().join("defconfig.bak")
    }

    /// Full firmware configuration generated from the fragment.
    pub fn firmware_config(&self) -> PathBuf {
        self.firmware_dir().join(".config")
    }

    /// Overlay directory merged into the firmware tree.
    pub fn site_local(&self) -> PathBuf {
        self.firmware_dir().join("site-local")
    }

    pub fn kernel_config(&self) -> PathBuf {
        self.kernel_dir().join(".config")
    }

    pub fn kernel_image(&self) -> PathBuf {
        self.kernel_dir().join("arch/x86/boot/bzImage")
    }

    /// Where coreboot's LinuxBoot payload picks up a prebuilt kernel.
    pub fn payload_image(&self) -> PathBuf {
        self.firmware_dir().join("payloads/external/LinuxBoot/build/Image")
    }

    pub fn firmware_rom(&self) -> PathBuf {
        self.firmware_dir().join("build/coreboot.rom")
    }
}
