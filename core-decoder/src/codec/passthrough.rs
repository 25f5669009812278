//! Copy-through adapter for compressed passthrough and unknown formats.

use super::{CodecAdapter, CodecInfo, CodecParams, DecodeOutcome};
use crate::error::Result;
use tracing::debug;

/// Copies input to output unchanged.
///
/// AC3/EAC3/DTS go to the sink undecoded; unknown formats use this too so a
/// stream without a backend still flows.
#[derive(Debug, Default)]
pub struct PassthroughAdapter {
    info: CodecInfo,
}

impl PassthroughAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodecAdapter for PassthroughAdapter {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn init(&mut self, params: &CodecParams) -> Result<()> {
        self.info = CodecInfo {
            channels: params.channels,
            sample_rate: params.sample_rate,
            bits_per_sample: params.bits_per_sample,
            error_count: 0,
        };
        debug!(format = %params.format, "Passthrough adapter initialized");
        Ok(())
    }

    fn decode(&mut self, out: &mut [u8], input: &[u8]) -> DecodeOutcome {
        let n = input.len().min(out.len());
        out[..n].copy_from_slice(&input[..n]);
        DecodeOutcome::new(n, n)
    }

    fn release(&mut self) {
        self.info = CodecInfo::default();
    }

    fn info(&self) -> CodecInfo {
        self.info
    }
}
