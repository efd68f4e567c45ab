//! Host dependency installation.
//!
//! The host distribution is read from os-release and mapped to its native
//! package manager. Each package is probed quietly; whatever is missing is
//! installed with a single `sudo` invocation so the operator can answer the
//! password prompt.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::build::context::BuildContext;
use crate::manifest::PackageLists;
use crate::process::{Cmd, Runner};

/// Native package managers the installer can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
}

impl PackageManager {
    /// Map an os-release `ID` to its package manager.
    pub fn for_distro(os_id: &str) -> Option<Self> {
        match os_id {
            "fedora" | "rhel" => Some(PackageManager::Dnf),
            "debian" | "ubuntu" => Some(PackageManager::Apt),
            "arch" => Some(PackageManager::Pacman),
            _ => None,
        }
    }

    pub fn packages<'a>(&self, lists: &'a PackageLists) -> &'a [String] {
        match self {
            PackageManager::Apt => &lists.apt,
            PackageManager::Dnf => &lists.dnf,
            PackageManager::Pacman => &lists.pacman,
        }
    }

    /// Quiet command whose success means `package` is installed.
    pub fn probe(&self, package: &str) -> Cmd {
        let cmd = match self {
            PackageManager::Apt => Cmd::new("dpkg").args(["-s", package]),
            PackageManager::Dnf => Cmd::new("dnf").args(["info", package]),
            PackageManager::Pacman => Cmd::new("pacman").args(["-Ql", package]),
        };
        cmd.quiet()
    }

    /// Interactive `sudo` command installing every package in `missing`.
    pub fn install(&self, missing: &[String]) -> Cmd {
        let cmd = match self {
            PackageManager::Apt => Cmd::new("sudo").args(["apt-get", "-y", "install"]),
            PackageManager::Dnf => Cmd::new("sudo").args(["dnf", "-y", "install"]),
            PackageManager::Pacman => Cmd::new("sudo").args(["pacman", "-S", "--noconfirm"]),
        };
        cmd.args(missing.iter().map(String::as_str))
            .error_msg(format!("installing dependencies with {self} failed"))
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Apt => write!(f, "apt-get"),
            PackageManager::Dnf => write!(f, "dnf"),
            PackageManager::Pacman => write!(f, "pacman"),
        }
    }
}

/// Extract `ID` from os-release content. Quotes are stripped.
pub fn parse_os_id(os_release: &str) -> Option<String> {
    os_release.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Read os-release and resolve the package manager, if the distribution is known.
pub fn detect_package_manager(os_release: &Path) -> Result<(String, Option<PackageManager>)> {
    let content = fs::read_to_string(os_release)
        .with_context(|| format!("reading {}", os_release.display()))?;
    let os_id = parse_os_id(&content).unwrap_or_default();
    let manager = PackageManager::for_distro(&os_id);
    Ok((os_id, manager))
}

/// Packages from `packages` whose probe fails.
pub fn missing_packages(
    manager: PackageManager,
    packages: &[String],
    runner: &dyn Runner,
) -> Vec<String> {
    packages
        .iter()
        .filter(|package| !manager.probe(package).succeeds(runner))
        .cloned()
        .collect()
}

/// Install whatever `manager` reports missing.
pub fn install_with(
    manager: PackageManager,
    packages: &[String],
    runner: &dyn Runner,
) -> Result<()> {
    let missing = missing_packages(manager, packages, runner);
    if missing.is_empty() {
        info!("no missing dependencies to install");
        return Ok(());
    }

    info!("using {manager} to get {}", missing.join(" "));
    manager.install(&missing).run(runner)
}

/// Stage entry point.
///
/// An unrecognized (or unreadable) host distribution terminates the process:
/// there is nothing sensible to install and nothing to recover to.
pub fn install_dependencies(ctx: &BuildContext<'_>) -> Result<()> {
    let (os_id, manager) = match detect_package_manager(&ctx.os_release) {
        Ok(found) => found,
        Err(e) => {
            error!("{e:#}");
            (String::new(), None)
        }
    };

    let Some(manager) = manager else {
        error!("no matching OS found (ID='{os_id}')");
        std::process::exit(1);
    };

    info!("host distribution '{os_id}' uses {manager}");
    install_with(manager, manager.packages(&ctx.manifest.packages), ctx.runner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingRunner;

    #[test]
    fn test_parse_os_id_variants() {
        assert_eq!(parse_os_id("NAME=Fedora\nID=fedora\n").as_deref(), Some("fedora"));
        assert_eq!(parse_os_id("ID=\"ubuntu\"\nID_LIKE=debian\n").as_deref(), Some("ubuntu"));
        assert_eq!(parse_os_id("ID_LIKE=debian\n"), None);
        assert_eq!(parse_os_id("ID=\n"), None);
    }

    #[test]
    fn test_distro_mapping() {
        assert_eq!(PackageManager::for_distro("rhel"), Some(PackageManager::Dnf));
        assert_eq!(PackageManager::for_distro("debian"), Some(PackageManager::Apt));
        assert_eq!(PackageManager::for_distro("arch"), Some(PackageManager::Pacman));
        assert_eq!(PackageManager::for_distro("gentoo"), None);
        assert_eq!(PackageManager::for_distro(""), None);
    }

    #[test]
    fn test_unknown_distro_detected_without_invocations() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("os-release");
        fs::write(&path, "NAME=\"Alpine Linux\"\nID=alpine\n").unwrap();

        let (os_id, manager) = detect_package_manager(&path).unwrap();

        assert_eq!(os_id, "alpine");
        assert_eq!(manager, None);
    }

    #[test]
    fn test_only_missing_packages_installed_once() {
        let runner = RecordingRunner::new().failing_when(|cmd| {
            cmd.program() == "dpkg" && matches!(cmd.get_args()[1].as_str(), "flex" | "gnat")
        });
        let packages: Vec<String> = ["git", "flex", "gnat"].map(String::from).to_vec();

        install_with(PackageManager::Apt, &packages, &runner).unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "sudo apt-get -y install flex gnat");
    }

    #[test]
    fn test_nothing_missing_skips_install() {
        let runner = RecordingRunner::new();
        let packages: Vec<String> = ["git", "make"].map(String::from).to_vec();

        install_with(PackageManager::Pacman, &packages, &runner).unwrap();

        assert!(runner.lines().iter().all(|l| l.starts_with("pacman -Ql")));
    }

    #[test]
    fn test_install_failure_propagates() {
        let runner = RecordingRunner::new()
            .failing_when(|cmd| cmd.program() == "dnf" || cmd.program() == "sudo");
        let packages: Vec<String> = vec!["qemu".to_string()];

        let err = install_with(PackageManager::Dnf, &packages, &runner).unwrap_err();
        assert!(err.to_string().contains("installing dependencies with dnf failed"));
    }

    #[test]
    fn test_stage_uses_host_package_manager() {
        use crate::config::RunConfig;
        use crate::manifest::Manifest;
        use crate::workspace::Workspace;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("os-release");
        fs::write(&path, "NAME=\"Fedora Linux\"\nID=fedora\n").unwrap();
        let runner = RecordingRunner::new().failing_when(|cmd| {
            cmd.program() == "dnf" && cmd.get_args()[1] == "qemu"
        });
        let ctx = BuildContext::new(
            RunConfig::default(),
            Manifest::default(),
            Workspace::new(temp.path()),
            &runner,
        )
        .with_os_release(&path);

        install_dependencies(&ctx).unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), ctx.manifest.packages.dnf.len() + 1);
        assert!(lines[..lines.len() - 1].iter().all(|l| l.starts_with("dnf info ")));
        assert_eq!(lines.last().unwrap(), "sudo dnf -y install qemu");
    }

    const CHILD_OS_RELEASE: &str = "SMM_BUILDER_TEST_OS_RELEASE";

    /// Runs the stage in a child copy of this test binary, since it ends
    /// the process.
    fn installer_exit_code(os_release: &std::path::Path) -> Option<i32> {
        let exe = std::env::current_exe().unwrap();
        std::process::Command::new(exe)
            .args([
                "deps::tests::test_unrecognized_host_exits_with_status_1",
                "--exact",
                "--nocapture",
            ])
            .env(CHILD_OS_RELEASE, os_release)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap()
            .code()
    }

    #[test]
    fn test_unrecognized_host_exits_with_status_1() {
        use crate::config::RunConfig;
        use crate::manifest::Manifest;
        use crate::workspace::Workspace;

        if let Some(path) = std::env::var_os(CHILD_OS_RELEASE) {
            // Any package manager invocation panics, which exits with 101.
            let runner = RecordingRunner::new().with_effect(|cmd| panic!("ran `{cmd}`"));
            let ctx = BuildContext::new(
                RunConfig::default(),
                Manifest::default(),
                Workspace::new("/nonexistent"),
                &runner,
            )
            .with_os_release(path);
            let _ = install_dependencies(&ctx);
            panic!("install_dependencies returned for an unrecognized host");
        }

        let temp = tempfile::tempdir().unwrap();
        let alpine = temp.path().join("os-release");
        fs::write(&alpine, "NAME=\"Alpine Linux\"\nID=alpine\n").unwrap();
        assert_eq!(installer_exit_code(&alpine), Some(1));

        let unreadable = temp.path().join("missing-os-release");
        assert_eq!(installer_exit_code(&unreadable), Some(1));
    }

    #[test]
    fn test_probes_are_quiet() {
        let cmd = PackageManager::Dnf.probe("git");
        assert_eq!(cmd.to_string(), "dnf info git");
        assert_eq!(cmd.stdio(), crate::process::StdioMode::Quiet);
    }
}
