//! Host tool checks run before the fetch and build stages.
//!
//! Every stage after dependency installation shells out to `git`, `make`
//! or `wget`. Checking them up front turns a missing `wget` into one
//! message naming the package, instead of a spawn error in the middle of
//! a patch series.
//!
//! # Example
//!
//! ```rust
//! use smm_builder::preflight::{check_required_tools, REQUIRED_TOOLS};
//!
//! match check_required_tools(REQUIRED_TOOLS) {
//!     Ok(()) => println!("host is ready to fetch and build"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

use anyhow::{bail, Result};

/// Whether `cmd` resolves to an executable, either on `PATH` or as a path.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools invoked by the fetch and build stages, as (command, package).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("git", "git"),
    ("make", "make / build-essential"),
    ("wget", "wget"),
];

/// Fail with a single error naming every tool in `tools` that is missing.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {tool} (install: {package})"))
        .collect();

    if !missing.is_empty() {
        bail!(
            "Missing required host tools:\n{}\nRun with --depinstall to install them.",
            missing.join("\n")
        );
    }
    Ok(())
}

pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}
