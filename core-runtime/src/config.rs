//! # Core Configuration Module
//!
//! Bundles the host capabilities a decoder instance needs.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `CoreConfig` holding every bridge implementation plus the event bus. It
//! enforces fail-fast validation so a decoder is never started with a
//! missing collaborator.
//!
//! ## Required Dependencies
//!
//! - `BitstreamSource` - Compressed bytes for the main stream
//! - `HardwareClock` - PTS lookup and program clock access
//! - `AudioOutput` - PCM sink
//! - `SyncEventSink` - Textual sync notifications
//!
//! ## Optional Dependencies
//!
//! - `AudioRouting` - Hardware channel routing (routing commands are ignored without it)
//! - Associated `BitstreamSource` - Secondary audio description stream
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .bitstream(Arc::new(MyDemuxFifo::open()?))
//!     .clock(Arc::new(MyTsyncRegisters::new()))
//!     .audio_output(Arc::new(MyAlsaSink::new()))
//!     .sync_events(Arc::new(MyTsyncEventFile::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use bridge_traits::{AudioOutput, AudioRouting, BitstreamSource, HardwareClock, SyncEventSink};
use std::sync::Arc;

/// Upper bound for the event bus buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Host capabilities for one decoder instance.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Main compressed bitstream (required)
    pub bitstream: Arc<dyn BitstreamSource>,

    /// Associated (audio description) bitstream (optional)
    pub associated_bitstream: Option<Arc<dyn BitstreamSource>>,

    /// Hardware PTS/PCR access (required)
    pub clock: Arc<dyn HardwareClock>,

    /// PCM output device (required)
    pub audio_output: Arc<dyn AudioOutput>,

    /// Sync event channel (required)
    pub sync_events: Arc<dyn SyncEventSink>,

    /// Hardware routing (optional)
    pub routing: Option<Arc<dyn AudioRouting>>,

    /// Broadcast channel for decoder events
    pub event_bus: EventBus,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("bitstream", &"BitstreamSource { ... }")
            .field(
                "associated_bitstream",
                &self
                    .associated_bitstream
                    .as_ref()
                    .map(|_| "BitstreamSource { ... }"),
            )
            .field("clock", &"HardwareClock { ... }")
            .field("audio_output", &"AudioOutput { ... }")
            .field("sync_events", &"SyncEventSink { ... }")
            .field("routing", &self.routing.as_ref().map(|_| "AudioRouting { ... }"))
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Whether an associated audio stream can be decoded.
    pub fn has_associated_stream(&self) -> bool {
        self.associated_bitstream.is_some()
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    bitstream: Option<Arc<dyn BitstreamSource>>,
    associated_bitstream: Option<Arc<dyn BitstreamSource>>,
    clock: Option<Arc<dyn HardwareClock>>,
    audio_output: Option<Arc<dyn AudioOutput>>,
    sync_events: Option<Arc<dyn SyncEventSink>>,
    routing: Option<Arc<dyn AudioRouting>>,
    event_bus: Option<EventBus>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the main compressed bitstream source.
    pub fn bitstream(mut self, source: Arc<dyn BitstreamSource>) -> Self {
        self.bitstream = Some(source);
        self
    }

    /// Sets the associated (audio description) bitstream source.
    pub fn associated_bitstream(mut self, source: Arc<dyn BitstreamSource>) -> Self {
        self.associated_bitstream = Some(source);
        self
    }

    /// Sets the hardware clock interface.
    pub fn clock(mut self, clock: Arc<dyn HardwareClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the PCM output device.
    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    /// Sets the sync event channel.
    pub fn sync_events(mut self, sink: Arc<dyn SyncEventSink>) -> Self {
        self.sync_events = Some(sink);
        self
    }

    /// Sets the hardware routing collaborator.
    pub fn routing(mut self, routing: Arc<dyn AudioRouting>) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Reuse an existing event bus instead of creating one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Buffer size for a newly created event bus.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` when a required bridge was not provided
    /// - `Error::Config` when the event buffer size is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let bitstream = self.bitstream.ok_or_else(|| {
            capability_missing(
                "BitstreamSource",
                "A bitstream source is required to feed the decoder. \
                 Inject the demux FIFO reader for this stream.",
            )
        })?;

        let clock = self.clock.ok_or_else(|| {
            capability_missing(
                "HardwareClock",
                "A hardware clock is required for PTS lookup and A/V sync. \
                 Inject the TSYNC register interface.",
            )
        })?;

        let audio_output = self.audio_output.ok_or_else(|| {
            capability_missing(
                "AudioOutput",
                "An audio output device is required to render decoded PCM.",
            )
        })?;

        let sync_events = self.sync_events.ok_or_else(|| {
            capability_missing(
                "SyncEventSink",
                "A sync event sink is required to notify the video/sync subsystem.",
            )
        })?;

        let event_bus = match self.event_bus {
            Some(bus) => bus,
            None => {
                let size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
                if size == 0 || size > MAX_EVENT_BUFFER_SIZE {
                    return Err(Error::Config(format!(
                        "Event buffer size must be between 1 and {}, got {}",
                        MAX_EVENT_BUFFER_SIZE, size
                    )));
                }
                EventBus::new(size)
            }
        };

        Ok(CoreConfig {
            bitstream,
            associated_bitstream: self.associated_bitstream,
            clock,
            audio_output,
            sync_events,
            routing: self.routing,
            event_bus,
        })
    }
}
