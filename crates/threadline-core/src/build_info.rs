//! Facts about the build, reported by `threadline version`.

use serde::Serialize;

/// Short commit hash, suffixed `-dirty` for uncommitted changes, or `"unknown"`.
pub const GIT_COMMIT: &str = env!("THREADLINE_GIT_COMMIT");

/// Seconds since the Unix epoch when the build script ran.
pub const BUILT_AT: &str = env!("THREADLINE_BUILT_AT");

/// Cargo profile (`debug` or `release`).
pub const PROFILE: &str = env!("THREADLINE_PROFILE");

/// Target triple the crate was compiled for.
pub const TARGET: &str = env!("THREADLINE_TARGET");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build metadata as one serializable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: u64,
    pub profile: &'static str,
    pub target: &'static str,
    /// Longest context chain kept before compaction.
    pub max_chain_depth: usize,
}

impl BuildInfo {
    /// Metadata of the running binary.
    pub fn current() -> Self {
        Self {
            version: VERSION,
            commit: GIT_COMMIT,
            built_at: BUILT_AT.parse().unwrap_or(0),
            profile: PROFILE,
            target: TARGET,
            max_chain_depth: crate::context::MAX_CHAIN_DEPTH,
        }
    }
}

/// One-line summary, e.g. `"0.1.0 (abc1234, debug, x86_64-unknown-linux-gnu)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_COMMIT}, {PROFILE}, {TARGET})")
}
