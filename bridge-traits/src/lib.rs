//! # Host Bridge Traits
//!
//! Hardware and host abstraction traits that every deployment of the decode
//! core must implement.
//!
//! ## Overview
//!
//! The decode core only orchestrates: it never touches the DMA'd bitstream
//! FIFO, the PTS/PCR registers, or the PCM sink directly. Each of those is a
//! capability described here and injected at construction time.
//!
//! ## Traits
//!
//! ### Bitstream & Clocks
//! - [`BitstreamSource`](bitstream::BitstreamSource) - Compressed bytes from the demux FIFO
//! - [`HardwareClock`](clock::HardwareClock) - PTS lookup, program clock, first-checkin flags
//! - [`SyncEventSink`](clock::SyncEventSink) - Textual notifications for the video/sync subsystem
//!
//! ### Output
//! - [`AudioOutput`](audio::AudioOutput) - PCM sink lifecycle, mute, volume, latency
//! - [`AudioRouting`](audio::AudioRouting) - Channel swap / mono routing on the output path
//!
//! ### Utilities
//! - [`LoggerSink`](log::LoggerSink) - Mirror core log records into host logging
//!
//! ## Fail-Fast Strategy
//!
//! The runtime refuses to build a configuration when a required capability is
//! missing:
//!
//! ```ignore
//! let clock = builder.clock
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HardwareClock".to_string(),
//!         message: "No hardware clock provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All fallible bridge calls return [`BridgeError`](error::BridgeError).
//! `BridgeError::NotAvailable` has a specific meaning for
//! [`HardwareClock::lookup_pts`](clock::HardwareClock::lookup_pts): the
//! stream is decoded in software and PTS must be derived from PCM counters.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`. The reader, decoder and command
//! threads each hold an `Arc` to the same implementation.

pub mod audio;
pub mod bitstream;
pub mod clock;
pub mod error;
pub mod log;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use audio::{AudioOutput, AudioRouting, OutputPosition, PcmFormat, RoutingMode};
pub use bitstream::BitstreamSource;
pub use clock::{HardwareClock, SyncEventSink};
pub use log::{LogLevel, LogRecord, LoggerSink, StderrLogger};
