#![deny(unsafe_code)]

//! Shared test utilities for the threadline workspace.
//!
//! Provides spy tokens, config builders, and tracing helpers so that
//! individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! threadline-test-utils = { workspace = true }
//! ```
//!
//! Unit tests inside `threadline-core` cannot use these spies: the dev
//! dependency links a separate copy of the core crate. Use them from
//! integration tests under `tests/` instead.

pub mod config;
pub mod spy;
pub mod tracing_setup;

pub use spy::{FailingToken, SpyToken};
