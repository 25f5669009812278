//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the audio decode core:
//! - Logging and tracing infrastructure
//! - Bridge bundle configuration with fail-fast validation
//! - Decoder event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that `core-decoder` depends on.
//! It establishes the logging conventions, the set of host capabilities a
//! decoder needs, and the broadcast channel used to observe decoder activity.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
