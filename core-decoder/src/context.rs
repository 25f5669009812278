//! # Stream Context
//!
//! Per-stream decode bookkeeping.
//!
//! [`StreamStatus`] holds the counters other threads read (PTS tracker,
//! output stage, status queries). Each field has a single writer; readers
//! treat values as snapshots that may be one refresh interval stale.
//! [`DecodeContext`] holds state private to the decode thread, notably the
//! carry-over bytes between packets.

use crate::error::{DecoderError, Result};
use crate::format::CodecFormat;
use crate::packet::Packet;
use bridge_traits::PcmFormat;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Sample rate assumed until the decoder reports one.
pub const FALLBACK_SAMPLE_RATE: u32 = 48_000;
/// Channel count assumed until the decoder reports one.
pub const FALLBACK_CHANNELS: u16 = 2;
/// Bit depth assumed until the decoder reports one.
pub const FALLBACK_BIT_DEPTH: u16 = 16;

const INVALID_OFFSET: u64 = u64::MAX;

/// Shared decode counters for one stream.
#[derive(Debug)]
pub struct StreamStatus {
    decode_offset: AtomicU64,
    decode_pcm_offset: AtomicU64,
    error_count: AtomicU32,
    out_bytes_since_last_valid_pts: AtomicU64,
    format_changed: AtomicBool,
    channels: AtomicU32,
    sample_rate: AtomicU32,
    bit_depth: AtomicU32,
    packets_decoded: AtomicU64,
}

/// Point-in-time copy of [`StreamStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub decode_offset: Option<u64>,
    pub decode_pcm_offset: u64,
    pub error_count: u32,
    pub out_bytes_since_last_valid_pts: u64,
    pub format_changed: bool,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub packets_decoded: u64,
}

impl StreamStatus {
    /// Fresh counters. Streams whose decoder reports offsets start without a
    /// valid decode offset.
    pub fn new(format: CodecFormat) -> Self {
        let offset = if format.decoder_reports_offset() {
            INVALID_OFFSET
        } else {
            0
        };
        Self {
            decode_offset: AtomicU64::new(offset),
            decode_pcm_offset: AtomicU64::new(0),
            error_count: AtomicU32::new(0),
            out_bytes_since_last_valid_pts: AtomicU64::new(0),
            format_changed: AtomicBool::new(false),
            channels: AtomicU32::new(0),
            sample_rate: AtomicU32::new(0),
            bit_depth: AtomicU32::new(0),
            packets_decoded: AtomicU64::new(0),
        }
    }

    pub fn shared(format: CodecFormat) -> Arc<Self> {
        Arc::new(Self::new(format))
    }

    // ------------------------------------------------------------------------
    // Decode offsets
    // ------------------------------------------------------------------------

    /// Cumulative consumed bitstream bytes, `None` while unknown.
    pub fn decode_offset(&self) -> Option<u64> {
        match self.decode_offset.load(Ordering::Acquire) {
            INVALID_OFFSET => None,
            offset => Some(offset),
        }
    }

    /// Advance the offset by `consumed` bytes.
    pub fn advance_decode_offset(&self, consumed: u64) {
        let current = self.decode_offset.load(Ordering::Acquire);
        let base = if current == INVALID_OFFSET { 0 } else { current };
        self.decode_offset
            .store(base.saturating_add(consumed).min(INVALID_OFFSET - 1), Ordering::Release);
    }

    /// Adopt an offset reported by the decoder. Never moves backwards.
    pub fn report_decode_offset(&self, offset: u64) {
        let current = self.decode_offset.load(Ordering::Acquire);
        if offset != INVALID_OFFSET && (current == INVALID_OFFSET || offset > current) {
            self.decode_offset.store(offset, Ordering::Release);
        }
    }

    pub fn decode_pcm_offset(&self) -> u64 {
        self.decode_pcm_offset.load(Ordering::Acquire)
    }

    pub fn add_pcm(&self, produced: u64) {
        self.decode_pcm_offset.fetch_add(produced, Ordering::AcqRel);
    }

    // ------------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------------

    /// Count one failed decode call; returns the new consecutive count.
    pub fn record_error(&self) -> u32 {
        self.error_count.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    pub fn reset_errors(&self) {
        self.error_count.store(0, Ordering::Release);
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Acquire)
    }

    pub fn record_packet(&self) {
        self.packets_decoded.fetch_add(1, Ordering::AcqRel);
    }

    // ------------------------------------------------------------------------
    // Output accounting
    // ------------------------------------------------------------------------

    pub fn add_out_bytes(&self, bytes: u64) {
        self.out_bytes_since_last_valid_pts
            .fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn out_bytes_since_last_valid_pts(&self) -> u64 {
        self.out_bytes_since_last_valid_pts.load(Ordering::Acquire)
    }

    pub fn reset_out_bytes(&self) {
        self.out_bytes_since_last_valid_pts
            .store(0, Ordering::Release);
    }

    // ------------------------------------------------------------------------
    // Format
    // ------------------------------------------------------------------------

    /// Whether the decoder has reported a format yet.
    pub fn has_format(&self) -> bool {
        self.sample_rate.load(Ordering::Acquire) != 0
    }

    /// Reported format, with fallbacks for fields not yet known.
    pub fn format(&self) -> PcmFormat {
        let sample_rate = match self.sample_rate.load(Ordering::Acquire) {
            0 => FALLBACK_SAMPLE_RATE,
            rate => rate,
        };
        let channels = match self.channels.load(Ordering::Acquire) {
            0 => FALLBACK_CHANNELS,
            ch => ch as u16,
        };
        let bits = match self.bit_depth.load(Ordering::Acquire) {
            0 => FALLBACK_BIT_DEPTH,
            bits => bits as u16,
        };
        PcmFormat::new(sample_rate, channels, bits)
    }

    pub fn set_format(&self, format: PcmFormat) {
        self.channels
            .store(format.channels as u32, Ordering::Release);
        self.bit_depth
            .store(format.bits_per_sample as u32, Ordering::Release);
        self.sample_rate.store(format.sample_rate, Ordering::Release);
    }

    pub fn mark_format_changed(&self) {
        self.format_changed.store(true, Ordering::Release);
    }

    /// Consume the format-changed flag.
    pub fn take_format_changed(&self) -> bool {
        self.format_changed.swap(false, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            decode_offset: self.decode_offset(),
            decode_pcm_offset: self.decode_pcm_offset(),
            error_count: self.error_count(),
            out_bytes_since_last_valid_pts: self.out_bytes_since_last_valid_pts(),
            format_changed: self.format_changed.load(Ordering::Acquire),
            channels: self.channels.load(Ordering::Acquire) as u16,
            sample_rate: self.sample_rate.load(Ordering::Acquire),
            bit_depth: self.bit_depth.load(Ordering::Acquire) as u16,
            packets_decoded: self.packets_decoded.load(Ordering::Acquire),
        }
    }
}

// ============================================================================
// DecodeContext
// ============================================================================

/// State owned by the decode thread.
#[derive(Debug)]
pub struct DecodeContext {
    pub format: CodecFormat,
    pub status: Arc<StreamStatus>,
    leftover: Option<Bytes>,
    burst_pending: u32,
}

impl DecodeContext {
    pub fn new(format: CodecFormat, status: Arc<StreamStatus>) -> Self {
        Self {
            format,
            status,
            leftover: None,
            burst_pending: 0,
        }
    }

    /// Bytes carried over from the previous packet.
    pub fn leftover_len(&self) -> usize {
        self.leftover.as_ref().map_or(0, Bytes::len)
    }

    /// Join any carry-over with the packet's payload.
    ///
    /// The packet is consumed; the returned buffer owns everything that is
    /// still to be decoded.
    pub fn take_input(&mut self, packet: Packet) -> Result<Bytes> {
        match self.leftover.take() {
            None => Ok(packet.data),
            Some(leftover) if packet.data.is_empty() => Ok(leftover),
            Some(leftover) => {
                let total = leftover.len() + packet.data.len();
                let mut joined = Vec::new();
                joined.try_reserve_exact(total).map_err(|_| {
                    DecoderError::BufferAllocation(format!(
                        "{} byte carry-over for packet {}",
                        total, packet.seq
                    ))
                })?;
                joined.extend_from_slice(&leftover);
                joined.extend_from_slice(&packet.data);
                Ok(Bytes::from(joined))
            }
        }
    }

    /// Keep `rest` for the next packet, replacing any previous carry-over.
    pub fn keep_leftover(&mut self, rest: Bytes) {
        self.leftover = if rest.is_empty() { None } else { Some(rest) };
    }

    pub fn clear_leftover(&mut self) {
        self.leftover = None;
    }

    /// Burst formats: count calls that consumed at least as much as remains.
    pub fn note_burst(&mut self) -> u32 {
        self.burst_pending += 1;
        self.burst_pending
    }

    pub fn reset_burst(&mut self) {
        self.burst_pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_start_at_zero() {
        let status = StreamStatus::new(CodecFormat::Aac);
        assert_eq!(status.decode_offset(), Some(0));
        status.advance_decode_offset(100);
        status.advance_decode_offset(24);
        assert_eq!(status.decode_offset(), Some(124));
    }

    #[test]
    fn test_reported_offset_never_regresses() {
        let status = StreamStatus::new(CodecFormat::Cook);
        assert_eq!(status.decode_offset(), None);

        status.report_decode_offset(5000);
        assert_eq!(status.decode_offset(), Some(5000));

        status.report_decode_offset(4000);
        assert_eq!(status.decode_offset(), Some(5000));

        status.report_decode_offset(6000);
        assert_eq!(status.decode_offset(), Some(6000));
    }

    #[test]
    fn test_error_counting() {
        let status = StreamStatus::new(CodecFormat::Mpeg);
        assert_eq!(status.record_error(), 1);
        assert_eq!(status.record_error(), 2);
        status.reset_errors();
        assert_eq!(status.error_count(), 0);
    }

    #[test]
    fn test_format_fallbacks() {
        let status = StreamStatus::new(CodecFormat::Aac);
        assert!(!status.has_format());
        assert_eq!(status.format(), PcmFormat::new(48_000, 2, 16));

        status.set_format(PcmFormat::new(44_100, 1, 16));
        assert!(status.has_format());
        assert_eq!(status.format().sample_rate, 44_100);
        assert_eq!(status.format().channels, 1);
    }

    #[test]
    fn test_format_changed_is_consumed_once() {
        let status = StreamStatus::new(CodecFormat::Aac);
        status.mark_format_changed();
        assert!(status.snapshot().format_changed);
        assert!(status.take_format_changed());
        assert!(!status.take_format_changed());
    }

    #[test]
    fn test_leftover_is_prepended() {
        let mut ctx = DecodeContext::new(CodecFormat::Aac, StreamStatus::shared(CodecFormat::Aac));

        let input = ctx.take_input(Packet::new(0, vec![1u8, 2, 3, 4])).unwrap();
        ctx.keep_leftover(input.slice(2..));
        assert_eq!(ctx.leftover_len(), 2);

        let input = ctx.take_input(Packet::new(1, vec![5u8, 6])).unwrap();
        assert_eq!(&input[..], &[3, 4, 5, 6]);
        assert_eq!(ctx.leftover_len(), 0);
    }

    #[test]
    fn test_empty_leftover_is_dropped() {
        let mut ctx = DecodeContext::new(CodecFormat::Mpeg, StreamStatus::shared(CodecFormat::Mpeg));
        ctx.keep_leftover(Bytes::new());
        assert_eq!(ctx.leftover_len(), 0);
    }
}
