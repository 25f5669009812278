//! # Frame Sizer
//!
//! Decides how many bytes make up the next readable unit.
//!
//! Most formats read a fixed nominal size. Self-delimited formats (APE) carry
//! an in-band header: the `"APTS"` sync word followed by a little-endian
//! 32-bit payload length. The scanner consumes the header from the source
//! byte by byte and survives partial matches across calls, so a starved
//! source never blocks it.

use crate::format::CodecFormat;
use bridge_traits::BitstreamSource;
use tracing::{trace, warn};

/// In-band sync word preceding each self-delimited unit.
pub const SYNC_WORD: [u8; 4] = *b"APTS";

/// Bytes added to the announced length.
pub const UNIT_EXTRA_BYTES: usize = 8;

/// Header bytes consumed in one call before yielding to the caller.
const SCAN_BUDGET_BYTES: usize = 4096;

/// Result of asking for the next unit size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizerOutcome {
    /// Fixed nominal size for this format.
    UseDefault(usize),
    /// Size parsed from an in-band header.
    Exact(usize),
    /// Header scanning progressed but is not finished; call again.
    NeedMoreSyncBytes,
    /// No bytes available; back off before calling again.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    /// `matched` leading bytes of the sync word seen.
    CollectingSync { matched: usize },
    /// Sync seen; `have` length bytes collected.
    SyncConfirmed { have: usize },
    /// Length parsed, ready to hand to the caller.
    SizeRead { size: usize },
}

#[derive(Debug)]
pub struct FrameSizer {
    format: CodecFormat,
    default_size: usize,
    max_unit_bytes: usize,
    state: ScanState,
    length_bytes: [u8; 4],
}

impl FrameSizer {
    pub fn new(format: CodecFormat, adapter_preferred: usize, max_unit_bytes: usize) -> Self {
        Self {
            format,
            default_size: format.default_read_size(adapter_preferred),
            max_unit_bytes,
            state: ScanState::Idle,
            length_bytes: [0; 4],
        }
    }

    pub fn format(&self) -> CodecFormat {
        self.format
    }

    /// Forget any partially scanned header.
    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.length_bytes = [0; 4];
    }

    /// Size of the next unit to read from `source`.
    pub fn next_unit_size(&mut self, source: &dyn BitstreamSource) -> SizerOutcome {
        if !self.format.is_self_delimited() {
            return SizerOutcome::UseDefault(self.default_size);
        }

        let mut consumed = 0;
        let mut byte = [0u8; 1];
        while consumed < SCAN_BUDGET_BYTES {
            if source.read_bytes(&mut byte) == 0 {
                return if consumed == 0 {
                    SizerOutcome::Retry
                } else {
                    SizerOutcome::NeedMoreSyncBytes
                };
            }
            consumed += 1;

            self.feed(byte[0]);
            if let ScanState::SizeRead { size } = self.state {
                self.state = ScanState::Idle;
                trace!(size, "Self-delimited unit header parsed");
                return SizerOutcome::Exact(size);
            }
        }

        SizerOutcome::NeedMoreSyncBytes
    }

    /// Advance the scanner by one byte.
    fn feed(&mut self, byte: u8) {
        match self.state {
            ScanState::Idle | ScanState::SizeRead { .. } => {
                self.state = Self::match_start(byte);
            }
            ScanState::CollectingSync { matched } => {
                if byte == SYNC_WORD[matched] {
                    let matched = matched + 1;
                    self.state = if matched == SYNC_WORD.len() {
                        ScanState::SyncConfirmed { have: 0 }
                    } else {
                        ScanState::CollectingSync { matched }
                    };
                } else {
                    self.state = Self::match_start(byte);
                }
            }
            ScanState::SyncConfirmed { have } => {
                self.length_bytes[have] = byte;
                let have = have + 1;
                if have < self.length_bytes.len() {
                    self.state = ScanState::SyncConfirmed { have };
                    return;
                }

                let announced = u32::from_le_bytes(self.length_bytes) as u64;
                let size = (announced + UNIT_EXTRA_BYTES as u64 + 3) & !3;
                self.state = if announced == 0 || size > self.max_unit_bytes as u64 {
                    warn!(
                        announced,
                        max = self.max_unit_bytes,
                        "Implausible unit length, rescanning for sync"
                    );
                    ScanState::Idle
                } else {
                    ScanState::SizeRead {
                        size: size as usize,
                    }
                };
            }
        }
    }

    fn match_start(byte: u8) -> ScanState {
        if byte == SYNC_WORD[0] {
            ScanState::CollectingSync { matched: 1 }
        } else {
            ScanState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Source that yields a scripted sequence of chunks, returning 0 between them.
    struct ChunkSource {
        chunks: Mutex<VecDeque<Vec<u8>>>,
    }

    impl ChunkSource {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: Mutex::new(chunks.into()),
            }
        }
    }

    impl BitstreamSource for ChunkSource {
        fn read_bytes(&self, buf: &mut [u8]) -> usize {
            let mut chunks = self.chunks.lock();
            let Some(front) = chunks.front_mut() else {
                return 0;
            };
            if front.is_empty() {
                chunks.pop_front();
                return 0;
            }
            let n = buf.len().min(front.len());
            buf[..n].copy_from_slice(&front[..n]);
            front.drain(..n);
            n
        }
    }

    fn header(len: u32) -> Vec<u8> {
        let mut bytes = SYNC_WORD.to_vec();
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes
    }

    #[test]
    fn test_fixed_formats_use_default() {
        let source = ChunkSource::new(vec![]);
        let mut sizer = FrameSizer::new(CodecFormat::Ac3, 5120, 1 << 20);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::UseDefault(512));

        let mut sizer = FrameSizer::new(CodecFormat::Aac, 5120, 1 << 20);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::UseDefault(5120));
    }

    #[test]
    fn test_sync_and_size() {
        let source = ChunkSource::new(vec![header(100)]);
        let mut sizer = FrameSizer::new(CodecFormat::Ape, 5120, 1 << 20);
        // 100 + 8 rounded up to a multiple of 4
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::Exact(108));

        let source = ChunkSource::new(vec![header(101)]);
        let mut sizer = FrameSizer::new(CodecFormat::Ape, 5120, 1 << 20);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::Exact(112));
    }

    #[test]
    fn test_empty_source_retries() {
        let source = ChunkSource::new(vec![]);
        let mut sizer = FrameSizer::new(CodecFormat::Ape, 5120, 1 << 20);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::Retry);
    }

    #[test]
    fn test_partial_header_across_calls() {
        let full = header(64);
        // Each exhausted chunk reads as one empty read.
        let source = ChunkSource::new(vec![
            b"xxAP".to_vec(),
            full[2..6].to_vec(),
            full[6..].to_vec(),
        ]);
        let mut sizer = FrameSizer::new(CodecFormat::Ape, 5120, 1 << 20);

        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::NeedMoreSyncBytes);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::NeedMoreSyncBytes);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::Exact(72));
    }

    #[test]
    fn test_sliding_match_after_false_start() {
        let mut bytes = b"APAPT".to_vec();
        bytes.extend_from_slice(&header(16));
        let source = ChunkSource::new(vec![bytes]);
        let mut sizer = FrameSizer::new(CodecFormat::Ape, 5120, 1 << 20);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::Exact(24));
    }

    #[test]
    fn test_implausible_length_rescans() {
        let mut bytes = header(u32::MAX - 16);
        bytes.extend_from_slice(&header(4));
        let source = ChunkSource::new(vec![bytes]);
        let mut sizer = FrameSizer::new(CodecFormat::Ape, 5120, 4096);
        assert_eq!(sizer.next_unit_size(&source), SizerOutcome::Exact(12));
    }
}
