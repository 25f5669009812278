//! Built-in adapter for the PCM family.
//!
//! Output is always interleaved signed 16-bit little-endian.

use super::{CodecAdapter, CodecInfo, CodecParams, DecodeOutcome};
use crate::error::{DecoderError, Result};
use crate::format::CodecFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    S16Le,
    S16Be,
    U8,
    Alaw,
    Mulaw,
}

impl Layout {
    fn for_format(format: CodecFormat) -> Option<Self> {
        match format {
            CodecFormat::PcmS16Le => Some(Layout::S16Le),
            CodecFormat::PcmS16Be | CodecFormat::PcmBluray | CodecFormat::WifiDisplay => {
                Some(Layout::S16Be)
            }
            CodecFormat::PcmU8 => Some(Layout::U8),
            CodecFormat::Alaw => Some(Layout::Alaw),
            CodecFormat::Mulaw => Some(Layout::Mulaw),
            _ => None,
        }
    }

    fn input_bytes_per_sample(self) -> usize {
        match self {
            Layout::S16Le | Layout::S16Be => 2,
            Layout::U8 | Layout::Alaw | Layout::Mulaw => 1,
        }
    }
}

#[derive(Debug)]
pub struct PcmAdapter {
    layout: Option<Layout>,
    info: CodecInfo,
}

impl PcmAdapter {
    pub fn new() -> Self {
        Self {
            layout: None,
            info: CodecInfo::default(),
        }
    }
}

impl Default for PcmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecAdapter for PcmAdapter {
    fn name(&self) -> &str {
        "pcm"
    }

    fn init(&mut self, params: &CodecParams) -> Result<()> {
        let layout = Layout::for_format(params.format)
            .ok_or(DecoderError::UnsupportedFormat(params.format))?;
        if params.channels == 0 || params.sample_rate == 0 {
            return Err(DecoderError::CodecInit {
                format: params.format,
                reason: "PCM needs channels and sample rate up front".to_string(),
            });
        }

        self.layout = Some(layout);
        self.info = CodecInfo {
            channels: params.channels,
            sample_rate: params.sample_rate,
            bits_per_sample: 16,
            error_count: 0,
        };
        Ok(())
    }

    fn decode(&mut self, out: &mut [u8], input: &[u8]) -> DecodeOutcome {
        let Some(layout) = self.layout else {
            return DecodeOutcome::default();
        };

        let channels = self.info.channels.max(1) as usize;
        let in_frame = layout.input_bytes_per_sample() * channels;
        let out_frame = 2 * channels;
        let frames = (input.len() / in_frame).min(out.len() / out_frame);
        if frames == 0 {
            return DecodeOutcome::default();
        }

        let samples = frames * channels;
        for i in 0..samples {
            let sample = match layout {
                Layout::S16Le => i16::from_le_bytes([input[2 * i], input[2 * i + 1]]),
                Layout::S16Be => i16::from_be_bytes([input[2 * i], input[2 * i + 1]]),
                Layout::U8 => ((input[i] as i16) - 128) << 8,
                Layout::Alaw => alaw_to_linear(input[i]),
                Layout::Mulaw => mulaw_to_linear(input[i]),
            };
            out[2 * i..2 * i + 2].copy_from_slice(&sample.to_le_bytes());
        }

        DecodeOutcome::new(frames * in_frame, frames * out_frame)
    }

    fn release(&mut self) {
        self.layout = None;
    }

    fn info(&self) -> CodecInfo {
        self.info
    }
}

/// G.711 A-law expansion.
fn alaw_to_linear(byte: u8) -> i16 {
    let a = byte ^ 0x55;
    let exponent = (a & 0x70) >> 4;
    let mantissa = (a & 0x0F) as i16;
    let magnitude = match exponent {
        0 => (mantissa << 4) + 8,
        e => ((mantissa << 4) + 0x108) << (e - 1),
    };
    if a & 0x80 != 0 {
        magnitude
    } else {
        -magnitude
    }
}

/// G.711 µ-law expansion.
fn mulaw_to_linear(byte: u8) -> i16 {
    let u = !byte;
    let exponent = (u & 0x70) >> 4;
    let mantissa = (u & 0x0F) as i16;
    let magnitude = (((mantissa << 3) + 0x84) << exponent) - 0x84;
    if u & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(format: CodecFormat, channels: u16) -> PcmAdapter {
        let mut adapter = PcmAdapter::new();
        adapter
            .init(&CodecParams::new(format, channels, 48_000))
            .unwrap();
        adapter
    }

    #[test]
    fn test_s16be_is_swapped() {
        let mut adapter = adapter(CodecFormat::PcmS16Be, 2);
        let mut out = [0u8; 8];
        let outcome = adapter.decode(&mut out, &[0x12, 0x34, 0xAB, 0xCD, 0xFF]);
        // one whole stereo frame, the odd byte stays behind
        assert_eq!(outcome, DecodeOutcome::new(4, 4));
        assert_eq!(&out[..4], &[0x34, 0x12, 0xCD, 0xAB]);
    }

    #[test]
    fn test_u8_expands() {
        let mut adapter = adapter(CodecFormat::PcmU8, 1);
        let mut out = [0u8; 4];
        let outcome = adapter.decode(&mut out, &[128, 255]);
        assert_eq!(outcome, DecodeOutcome::new(2, 4));
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 0);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 127 << 8);
    }

    #[test]
    fn test_short_input_needs_more() {
        let mut adapter = adapter(CodecFormat::PcmS16Le, 2);
        let mut out = [0u8; 16];
        assert!(adapter.decode(&mut out, &[1, 2, 3]).is_failure());
    }

    #[test]
    fn test_g711_reference_points() {
        assert_eq!(mulaw_to_linear(0xFF), 0);
        assert_eq!(mulaw_to_linear(0x80), 32124);
        assert_eq!(mulaw_to_linear(0x00), -32124);
        assert_eq!(alaw_to_linear(0xD5), 8);
        assert_eq!(alaw_to_linear(0x55), -8);
        assert_eq!(alaw_to_linear(0xAA), 32256);
    }

    #[test]
    fn test_rejects_compressed_format() {
        let mut adapter = PcmAdapter::new();
        let err = adapter
            .init(&CodecParams::new(CodecFormat::Aac, 2, 48_000))
            .unwrap_err();
        assert!(matches!(err, DecoderError::UnsupportedFormat(CodecFormat::Aac)));
    }
}
