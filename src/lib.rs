//! Workspace facade crate.
//!
//! Re-exports the member crates so hosts can depend on a single package:
//! - [`bridge_traits`] for the collaborator boundary
//! - [`core_runtime`] for logging, events and the bridge bundle
//! - [`core_decoder`] for the decode pipeline itself
//!
//! The `loopback` feature additionally exposes the in-memory bridge
//! implementations used for host-less runs.

pub use bridge_traits;
pub use core_decoder;
pub use core_runtime;

#[cfg(feature = "loopback")]
pub use bridge_loopback;
