//! Static configuration tables.
//!
//! Repository URLs, patch lists, configuration fragment locations and
//! package lists live here, apart from the orchestration logic. The built-in
//! [`Manifest::default`] reproduces the upstream LinuxBootSMM setup; a TOML
//! file may override any subset of the fields:
//!
//! ```toml
//! firmware_repo = "https://mirror.example/coreboot.git"
//! kernel_patches = ["0001-local-tweak.patch"]
//!
//! [[scenarios]]
//! id = 4
//! patches = ["0003-extra-scenario.patch"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::{Bitness, TestScenario};

const LINUXBOOT_SMM_RAW: &str =
    "https://raw.githubusercontent.com/9elements/LinuxBootSMM/refs/heads/main";

/// Placeholder substituted with `32` or `64` in [`Manifest::q35_defconfig_url`].
pub const BITNESS_PLACEHOLDER: &str = "{bitness}";

/// Extra patches applied for one testing scenario.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioPatches {
    pub id: u32,
    pub patches: Vec<String>,
}

/// Host packages required to build coreboot and the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageLists {
    pub apt: Vec<String>,
    pub dnf: Vec<String>,
    pub pacman: Vec<String>,
}

impl Default for PackageLists {
    fn default() -> Self {
        Self {
            apt: strings(&[
                "bison",
                "git",
                "golang",
                "build-essential",
                "curl",
                "gnat",
                "flex",
                "libncurses-dev",
                "libssl-dev",
                "zlib1g-dev",
                "pkgconf",
                "qemu-system-x86",
                "wget",
            ]),
            dnf: strings(&[
                "git",
                "make",
                "gcc-gnat",
                "flex",
                "bison",
                "xz",
                "bzip2",
                "gcc",
                "g++",
                "ncurses-devel",
                "wget",
                "zlib-devel",
                "patch",
                "qemu",
            ]),
            pacman: strings(&[
                "base-devel",
                "curl",
                "git",
                "gcc-ada",
                "ncurses",
                "zlib",
                "qemu-full",
                "wget",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub firmware_repo: String,
    pub kernel_repo: String,
    /// Ref the firmware tree is hard-reset to before every rebuild.
    pub firmware_reset_ref: String,
    /// `make` target building coreboot's cross toolchain.
    pub toolchain_target: String,

    pub firmware_patch_base: String,
    pub kernel_patch_base: String,
    pub testing_patch_base: String,
    pub firmware_patches: Vec<String>,
    pub kernel_patches: Vec<String>,
    pub scenarios: Vec<ScenarioPatches>,

    pub default_defconfig_url: String,
    /// Must contain [`BITNESS_PLACEHOLDER`].
    pub q35_defconfig_url: String,
    pub kernel_config_url: String,
    pub kernel_smp_config_url: String,

    /// Kernel module loaded by the testing bootloader command.
    pub testing_module_url: String,
    /// Lines appended to the firmware defconfig for testing builds.
    pub testing_defconfig: Vec<String>,

    pub packages: PackageLists,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            firmware_repo: "https://review.coreboot.org/coreboot.git".into(),
            kernel_repo: "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git"
                .into(),
            firmware_reset_ref: "origin/main".into(),
            toolchain_target: "crossgcc-i386".into(),

            firmware_patch_base: format!("{LINUXBOOT_SMM_RAW}/poc/patches/coreboot/"),
            kernel_patch_base: format!("{LINUXBOOT_SMM_RAW}/poc/patches/linux/"),
            testing_patch_base: format!(
                "{LINUXBOOT_SMM_RAW}/builder/integration/testing_patches/"
            ),
            firmware_patches: strings(&[
                "0001-drivers-payload_mm_interface-Add-payload-MM-config-s.patch",
                "0002-drivers-payload_mm_interface-Implement-payload-MM-co.patch",
                "0003-cpu-x86-smm-Add-SMM-implementations-of-smm_-region.patch",
                "0004-cpu-x86-smm-Conditionally-reserve-an-SMRAM-area-for-.patch",
                "0005-fix-Kconfig-for-MM-payload-from-later-patches.patch",
                "0006-drivers-payload_mm_interface-implement-no-unlock-MM-.patch",
                "0007-mb-emulation-qemu-q35-hook-up-LinuxBoot-MM-to-SMI-ha.patch",
            ]),
            kernel_patches: strings(&[
                "0001-drivers-firmware-add-passing-MM-payload-info-from-co.patch",
                "0002-drivers-firmware-add-kernel-owned-SMI-handler.patch",
                "0003-drivers-firmware-loader-for-kernel-owned-SMI-handler.patch",
                "0004-driver-firmware-ACPI-management-in-SMI-handler.patch",
            ]),
            scenarios: vec![
                ScenarioPatches {
                    id: 2,
                    patches: strings(&[
                        "0001-drivers-payload_mm_interface-triggering-test-case-fo.patch",
                    ]),
                },
                ScenarioPatches {
                    id: 3,
                    patches: strings(&[
                        "0002-drivers-payload_mm_interface-triggering-post-ep-check.patch",
                    ]),
                },
            ],

            default_defconfig_url: format!("{LINUXBOOT_SMM_RAW}/builder/defconfig-raptorlake"),
            q35_defconfig_url: format!(
                "{LINUXBOOT_SMM_RAW}/builder/defconfig-qemu{BITNESS_PLACEHOLDER}"
            ),
            kernel_config_url: "https://raw.githubusercontent.com/micgor32/linuxbootsmm-builder/refs/heads/master/defconfig-linux".into(),
            kernel_smp_config_url: "https://raw.githubusercontent.com/micgor32/linuxbootsmm-builder/refs/heads/master/defconfig-linux-smp".into(),

            testing_module_url: "https://github.com/9elements/LinuxBootSMM/raw/refs/heads/main/builder/integration/handler-test/smi.ko".into(),
            testing_defconfig: strings(&[
                "CONFIG_LINUXBOOT_UROOT_FILES=\"site-local/smi.ko:smi.ko\"",
                "CONFIG_SPECIFIC_BOOTLOADER_CUSTOM=y",
                "CONFIG_SPECIFIC_BOOTLOADER_CUSTOM_CMD=\"'insmod ./smi.ko'\"",
            ]),

            packages: PackageLists::default(),
        }
    }
}

impl Manifest {
    /// Load overrides from a TOML file on top of the built-in tables.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing manifest '{}'", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject tables the orchestration cannot work with.
    pub fn validate(&self) -> Result<()> {
        let named_lists = [
            ("firmware_patches", &self.firmware_patches),
            ("kernel_patches", &self.kernel_patches),
        ];
        for (field, patches) in named_lists {
            for patch in patches {
                check_patch_name(field, patch)?;
            }
        }
        for scenario in &self.scenarios {
            if scenario.id == 0 {
                bail!("scenarios: id 0 is reserved for regular builds");
            }
            for patch in &scenario.patches {
                check_patch_name("scenarios.patches", patch)?;
            }
        }
        if !self.q35_defconfig_url.contains(BITNESS_PLACEHOLDER) {
            bail!(
                "q35_defconfig_url must contain '{}', got '{}'",
                BITNESS_PLACEHOLDER,
                self.q35_defconfig_url
            );
        }
        Ok(())
    }

    pub fn q35_defconfig_url(&self, bitness: Bitness) -> String {
        self.q35_defconfig_url
            .replace(BITNESS_PLACEHOLDER, bitness.as_str())
    }

    pub fn kernel_config_url(&self, smp: bool) -> &str {
        if smp {
            &self.kernel_smp_config_url
        } else {
            &self.kernel_config_url
        }
    }

    /// Extra patches for `scenario`; empty when the scenario has none.
    pub fn scenario_patches(&self, scenario: TestScenario) -> &[String] {
        self.scenarios
            .iter()
            .find(|s| s.id == scenario.0)
            .map(|s| s.patches.as_slice())
            .unwrap_or(&[])
    }
}

fn check_patch_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("{field}: patch file name must not be empty");
    }
    if name.contains('/') {
        bail!("{field}: patch '{name}' must be a bare file name");
    }
    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
