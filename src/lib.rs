//! xbe - command-line client for the XBE platform
//!
//! Commands have the shape `xbe <do|view> <resource> <action> [id] [--flags]`.
//! Each resource is described by an embedded schema; flags, validation,
//! request bodies and output all derive from it.

pub mod api;
pub mod config;
pub mod error;
pub mod output;
pub mod resource;

/// Version injected at compile time via XBE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("XBE_VERSION") {
    Some(v) => v,
    None => "dev",
};
