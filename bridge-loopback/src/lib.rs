//! # Loopback Bridge Implementations
//!
//! In-memory implementations of every bridge trait, for running the decode
//! core without hardware.
//!
//! ## Overview
//!
//! - `ScriptedBitstream`: byte FIFO fed by the test or host, with an
//!   optional cap on bytes per read to simulate short DMA reads
//! - `SimulatedClock`: PTS checkin table, program clock, video PTS and
//!   checkin flags, all settable
//! - `RecordingOutput` / `RecordingRouting`: record every call for assertions
//! - `CollectingSyncSink`: keeps every sync-event line
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_loopback::{ScriptedBitstream, SimulatedClock};
//!
//! let source = ScriptedBitstream::new();
//! source.push(&[0u8; 512]);
//!
//! let clock = SimulatedClock::new();
//! clock.check_in(0, 90_000);
//! clock.set_first_audio_checked_in(true);
//! ```

mod bitstream;
mod clock;
mod output;
mod sync;

pub use bitstream::ScriptedBitstream;
pub use clock::SimulatedClock;
pub use output::{OutputCall, RecordingOutput, RecordingRouting};
pub use sync::CollectingSyncSink;
