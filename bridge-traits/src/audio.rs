//! Audio output bridge traits and supporting PCM types.
//!
//! These abstractions let the decode core drive a platform PCM sink (ALSA,
//! AudioTrack, a hardware I2S FIFO) without knowing which one it is. The core
//! pulls decoded PCM from its output ring on the sink's behalf; the sink only
//! has to honour lifecycle, volume and latency queries.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interleaved PCM layout delivered to the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Create a new PCM format description.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes occupied by one frame (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Bytes produced per second of audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::new(48_000, 2, 16)
    }
}

/// Playback position reported by an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPosition {
    /// Frames rendered by the device since it was started.
    pub frames_played: u64,
    /// Time elapsed since the device sampled `frames_played`.
    pub age: Duration,
}

/// Hardware routing applied on the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Normal left/right routing.
    Stereo,
    /// Left channel on both outputs.
    LeftMono,
    /// Right channel on both outputs.
    RightMono,
    /// Swap left and right.
    SwapChannels,
}

/// PCM sink driven by the decoder state machine.
pub trait AudioOutput: Send + Sync {
    /// Open the device for `format` and start consuming PCM.
    fn start(&self, format: PcmFormat) -> Result<()>;

    /// Pause consumption without discarding device buffers.
    fn pause(&self) -> Result<()>;

    /// Resume after [`AudioOutput::pause`].
    fn resume(&self) -> Result<()>;

    /// Stop the device and drop any buffered audio.
    fn stop(&self) -> Result<()>;

    fn mute(&self, muted: bool) -> Result<()>;

    /// Set a common volume, normalized to `0.0..=1.0`.
    fn set_volume(&self, volume: f32) -> Result<()>;

    /// Set per-channel volumes, normalized to `0.0..=1.0`.
    fn set_lr_volume(&self, left: f32, right: f32) -> Result<()>;

    /// Audio already accepted by the device but not yet audible.
    fn latency(&self) -> Duration;

    /// Rendered-frame counter, for devices that expose one.
    fn output_position(&self) -> Option<OutputPosition> {
        None
    }

    /// Current playback speed multiplier.
    fn playback_rate(&self) -> f32 {
        1.0
    }

    /// Apply a new PCM layout after a decoder format change.
    ///
    /// The default restarts the device.
    fn reconfigure(&self, format: PcmFormat) -> Result<()> {
        self.stop()?;
        self.start(format)
    }
}

/// External audio-routing collaborator (hardware channel matrix).
pub trait AudioRouting: Send + Sync {
    fn apply(&self, mode: RoutingMode) -> Result<()>;
}
