//! # Codec Adapters
//!
//! Uniform capability interface over pluggable codec backends.
//!
//! The decode loop only ever talks to [`CodecAdapter`]. Backends are picked
//! per stream from a [`CodecRegistry`] keyed by [`CodecFormat`]; formats
//! without a registered backend fall back to [`PassthroughAdapter`].

mod passthrough;
mod pcm;
mod registry;

pub use passthrough::PassthroughAdapter;
pub use pcm::PcmAdapter;
pub use registry::{AdapterFactory, CodecRegistry};

use crate::error::Result;
use crate::format::CodecFormat;
use bridge_traits::PcmFormat;
use bytes::Bytes;

/// Parameters handed to [`CodecAdapter::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParams {
    pub format: CodecFormat,
    /// Channel count announced by the container, 0 if unknown.
    pub channels: u16,
    /// Sample rate announced by the container, 0 if unknown.
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Codec-specific configuration (e.g. AAC AudioSpecificConfig).
    pub extradata: Bytes,
}

impl CodecParams {
    pub fn new(format: CodecFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
            bits_per_sample: 16,
            extradata: Bytes::new(),
        }
    }

    pub fn with_extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = extradata.into();
        self
    }

    pub fn with_bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = bits;
        self
    }

    /// Copy with the channel count clamped for the backend.
    pub fn clamped(&self) -> Self {
        let mut params = self.clone();
        params.channels = self.format.clamp_init_channels(self.channels);
        params
    }
}

/// Stream properties reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Decode errors the backend has seen.
    pub error_count: u32,
}

impl CodecInfo {
    /// Output format, if the backend has reported one.
    pub fn pcm_format(&self) -> Option<PcmFormat> {
        if self.channels == 0 || self.sample_rate == 0 {
            return None;
        }
        let bits = if self.bits_per_sample == 0 {
            16
        } else {
            self.bits_per_sample
        };
        Some(PcmFormat::new(self.sample_rate, self.channels, bits))
    }
}

/// Result of one decode call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Input bytes the backend consumed.
    pub consumed: usize,
    /// Output bytes written to the output buffer.
    pub produced: usize,
}

impl DecodeOutcome {
    pub fn new(consumed: usize, produced: usize) -> Self {
        Self { consumed, produced }
    }

    /// Nothing consumed and nothing produced.
    pub fn is_failure(&self) -> bool {
        self.consumed == 0 && self.produced == 0
    }
}

/// A codec backend.
///
/// `decode` is called repeatedly over one packet's payload. It must never
/// report more consumed bytes than it was given or more produced bytes than
/// fit in `out`.
pub trait CodecAdapter: Send {
    /// Backend name for logs.
    fn name(&self) -> &str;

    fn init(&mut self, params: &CodecParams) -> Result<()>;

    fn decode(&mut self, out: &mut [u8], input: &[u8]) -> DecodeOutcome;

    fn release(&mut self);

    fn info(&self) -> CodecInfo;

    /// Bitstream offset of the last decoded frame, for backends that track it.
    fn reported_offset(&self) -> Option<u64> {
        None
    }

    /// Input size this backend prefers per read.
    fn preferred_read_size(&self) -> Option<usize> {
        None
    }
}
