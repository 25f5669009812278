//! # Audio Decode Core
//!
//! Turns a compressed elementary audio stream into timestamped PCM for an
//! output device, and keeps that PCM aligned with the video and program
//! clocks.
//!
//! ## Overview
//!
//! Each decoder instance runs three threads:
//! - **Reader**: sizes access units from the bitstream source and queues them
//!   (`reader`, `frame_sizer`, `packet_queue`)
//! - **Decoder**: feeds queued units to a codec backend and writes PCM into
//!   the output ring (`decode_loop`, `codec`, `ring`, `mixer`)
//! - **Command loop**: executes host commands and refreshes the audio PTS
//!   (`state_machine`, `pts`)
//!
//! The host audio device pulls PCM through an [`OutputPort`], which applies
//! clock-drift resampling, gain and mute on the way out.
//!
//! ## Usage
//!
//! ```ignore
//! use core_decoder::{CodecParams, CodecRegistry, Command, DecoderConfig, DecoderStateMachine};
//!
//! let registry = CodecRegistry::with_builtin();
//! let params = CodecParams::new(CodecFormat::PcmS16Le, 2, 48_000);
//! let machine = DecoderStateMachine::new(core, DecoderConfig::default(), params, &registry)?;
//! let handle = machine.spawn()?;
//! handle.send(Command::Start)?;
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod decode_loop;
pub mod error;
pub mod exit;
pub mod format;
pub mod frame_sizer;
pub mod mixer;
pub mod output_stage;
pub mod packet;
pub mod packet_queue;
pub mod pts;
pub mod reader;
pub mod resampler;
pub mod ring;
pub mod state_machine;

pub use codec::{CodecAdapter, CodecInfo, CodecParams, CodecRegistry, DecodeOutcome};
pub use config::{DecoderConfig, PtsVariant, SyncMode};
pub use context::StreamStatus;
pub use error::{DecoderError, Result};
pub use exit::ExitFlag;
pub use format::CodecFormat;
pub use output_stage::OutputPort;
pub use packet::Packet;
pub use packet_queue::PacketQueue;
pub use pts::{PtsTracker, RefreshOutcome, ResyncOutcome, SyncEvent};
pub use resampler::ClockDriftResampler;
pub use ring::OutputRing;
pub use state_machine::{Command, DecoderHandle, DecoderState, DecoderStateMachine, DecoderStatus};
