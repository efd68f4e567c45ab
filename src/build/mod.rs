//! Source retrieval and compilation for the two trees.
//!
//! - [`context`] - Build context shared by every stage
//! - [`defconfig`] - Testing-scenario defconfig mutation
//! - [`filesystem`] - Tree copies, payload install, config fingerprints
//! - [`firmware`] - coreboot fetch, rebuild reset and build
//! - [`kernel`] - Kernel fetch and build

pub mod context;
pub mod defconfig;
pub mod filesystem;
pub mod firmware;
pub mod kernel;
