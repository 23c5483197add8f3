// Build identity reported by /version and in the startup log

use serde::Serialize;

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Target OS; kernel counter collection only works on linux.
    pub os: &'static str,
}

pub fn info() -> VersionInfo {
    VersionInfo {
        name: NAME,
        version: VERSION,
        os: std::env::consts::OS,
    }
}
