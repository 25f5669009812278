//! Codec format table and per-format decode traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Read size for formats whose frames are small and need frequent resync.
pub const COMPRESSED_PASSTHROUGH_READ_BYTES: usize = 512;

/// Read size for MPEG audio layers.
pub const MPEG_READ_BYTES: usize = 1024;

/// Compressed audio formats delivered by the demux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFormat {
    Mpeg,
    Mpeg1,
    Mpeg2,
    PcmS16Le,
    PcmS16Be,
    PcmU8,
    PcmBluray,
    WifiDisplay,
    Alaw,
    Mulaw,
    Adpcm,
    Aac,
    AacLatm,
    Ac3,
    Eac3,
    Dts,
    TrueHd,
    Flac,
    Cook,
    Raac,
    Amr,
    Ape,
    Dra,
    /// Vendor format code with no entry in this table.
    Unknown(u32),
}

impl CodecFormat {
    /// AC3/EAC3/DTS are copied to the output instead of decoded.
    pub fn is_compressed_passthrough(self) -> bool {
        matches!(self, CodecFormat::Ac3 | CodecFormat::Eac3 | CodecFormat::Dts)
    }

    /// Formats that may feed the raw (bitstream) output ring.
    pub fn supports_raw_output(self) -> bool {
        self.is_compressed_passthrough() || self == CodecFormat::TrueHd
    }

    /// Raw ring is doubled for high-bitrate formats.
    pub fn raw_ring_multiplier(self) -> usize {
        match self {
            CodecFormat::Dts | CodecFormat::TrueHd => 2,
            _ => 1,
        }
    }

    /// Formats whose decoder wants a fresh packet once it has consumed half its input.
    pub fn needs_burst_input(self) -> bool {
        matches!(self, CodecFormat::Cook | CodecFormat::Raac | CodecFormat::Amr)
    }

    /// AAC decoders may consume bytes for resync without producing output.
    pub fn is_aac(self) -> bool {
        matches!(self, CodecFormat::Aac | CodecFormat::AacLatm)
    }

    /// Self-delimited formats drop undecodable input instead of keeping it.
    pub fn discards_on_error(self) -> bool {
        self == CodecFormat::Ape
    }

    /// The decoder itself reports the bitstream offset used for PTS lookup.
    pub fn decoder_reports_offset(self) -> bool {
        matches!(self, CodecFormat::Cook | CodecFormat::Raac)
    }

    /// Units are delimited by an in-band sync word and length.
    pub fn is_self_delimited(self) -> bool {
        self == CodecFormat::Ape
    }

    /// Uncompressed or trivially expanded PCM family.
    pub fn is_pcm_family(self) -> bool {
        matches!(
            self,
            CodecFormat::PcmS16Le
                | CodecFormat::PcmS16Be
                | CodecFormat::PcmU8
                | CodecFormat::PcmBluray
                | CodecFormat::WifiDisplay
                | CodecFormat::Alaw
                | CodecFormat::Mulaw
                | CodecFormat::Adpcm
        )
    }

    /// Nominal read size for one unit when no sync scanning applies.
    pub fn default_read_size(self, adapter_preferred: usize) -> usize {
        if self.is_compressed_passthrough() {
            COMPRESSED_PASSTHROUGH_READ_BYTES
        } else if self == CodecFormat::Mpeg {
            MPEG_READ_BYTES
        } else {
            adapter_preferred
        }
    }

    /// Channel count handed to the backend at init.
    ///
    /// Non-PCM decoders are asked for at most stereo.
    pub fn clamp_init_channels(self, channels: u16) -> u16 {
        if self.is_pcm_family() {
            channels
        } else {
            channels.min(2)
        }
    }
}

impl fmt::Display for CodecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecFormat::Mpeg => "MPEG",
            CodecFormat::Mpeg1 => "MPEG1",
            CodecFormat::Mpeg2 => "MPEG2",
            CodecFormat::PcmS16Le => "PCM_S16LE",
            CodecFormat::PcmS16Be => "PCM_S16BE",
            CodecFormat::PcmU8 => "PCM_U8",
            CodecFormat::PcmBluray => "PCM_BLURAY",
            CodecFormat::WifiDisplay => "WIFIDISPLAY",
            CodecFormat::Alaw => "ALAW",
            CodecFormat::Mulaw => "MULAW",
            CodecFormat::Adpcm => "ADPCM",
            CodecFormat::Aac => "AAC",
            CodecFormat::AacLatm => "AAC_LATM",
            CodecFormat::Ac3 => "AC3",
            CodecFormat::Eac3 => "EAC3",
            CodecFormat::Dts => "DTS",
            CodecFormat::TrueHd => "TRUEHD",
            CodecFormat::Flac => "FLAC",
            CodecFormat::Cook => "COOK",
            CodecFormat::Raac => "RAAC",
            CodecFormat::Amr => "AMR",
            CodecFormat::Ape => "APE",
            CodecFormat::Dra => "DRA",
            CodecFormat::Unknown(code) => return write!(f, "UNKNOWN({})", code),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_read_sizes() {
        assert_eq!(CodecFormat::Ac3.default_read_size(5120), 512);
        assert_eq!(CodecFormat::Dts.default_read_size(5120), 512);
        assert_eq!(CodecFormat::Mpeg.default_read_size(5120), 1024);
        assert_eq!(CodecFormat::Aac.default_read_size(5120), 5120);
        assert_eq!(CodecFormat::Mpeg2.default_read_size(4096), 4096);
    }

    #[test]
    fn test_format_traits() {
        assert!(CodecFormat::Cook.needs_burst_input());
        assert!(CodecFormat::Cook.decoder_reports_offset());
        assert!(!CodecFormat::Amr.decoder_reports_offset());
        assert!(CodecFormat::AacLatm.is_aac());
        assert!(CodecFormat::Ape.discards_on_error());
        assert!(CodecFormat::TrueHd.supports_raw_output());
        assert!(!CodecFormat::TrueHd.is_compressed_passthrough());
        assert_eq!(CodecFormat::Dts.raw_ring_multiplier(), 2);
        assert_eq!(CodecFormat::Ac3.raw_ring_multiplier(), 1);
    }

    #[test]
    fn test_clamp_init_channels() {
        assert_eq!(CodecFormat::Aac.clamp_init_channels(6), 2);
        assert_eq!(CodecFormat::PcmS16Le.clamp_init_channels(6), 6);
        assert_eq!(CodecFormat::Flac.clamp_init_channels(1), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(CodecFormat::AacLatm.to_string(), "AAC_LATM");
        assert_eq!(CodecFormat::Unknown(42).to_string(), "UNKNOWN(42)");
    }
}
