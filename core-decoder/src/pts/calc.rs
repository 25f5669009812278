//! Tick/byte conversions used by PTS tracking and drop sizing.
//!
//! All timestamps are 90 kHz ticks.

use crate::config::{TICKS_PER_MS, TICKS_PER_SECOND};
use bridge_traits::PcmFormat;
use std::time::Duration;

/// Duration of `frames` PCM frames in ticks.
pub fn frames_to_ticks(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    ((frames as u128 * TICKS_PER_SECOND as u128) / sample_rate as u128) as u64
}

/// Duration of `bytes` of PCM in ticks; partial frames are ignored.
pub fn bytes_to_ticks(bytes: u64, format: &PcmFormat) -> u64 {
    let frame = format.frame_bytes() as u64;
    if frame == 0 {
        return 0;
    }
    frames_to_ticks(bytes / frame, format.sample_rate)
}

pub fn duration_to_ticks(duration: Duration) -> u64 {
    (duration.as_micros() * TICKS_PER_MS as u128 / 1000) as u64
}

pub fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_micros(ticks.saturating_mul(1000) / TICKS_PER_MS)
}

/// Whole milliseconds covered by a tick gap.
pub fn drop_duration_ms(gap_ticks: u64) -> u64 {
    gap_ticks / TICKS_PER_MS
}

/// Bytes of PCM to discard to close a gap of `gap_ticks`.
///
/// Always a whole number of frames.
pub fn drop_size_bytes(gap_ticks: u64, format: &PcmFormat) -> u64 {
    let frames = drop_duration_ms(gap_ticks) * format.sample_rate as u64 / 1000;
    frames * format.frame_bytes() as u64
}

/// `base + add - sub + delta`, clamped at zero.
pub fn offset_pts(base: u64, add: u64, sub: u64, delta: i64) -> u64 {
    let value = base as i128 + add as i128 - sub as i128 + delta as i128;
    value.clamp(0, u64::MAX as i128) as u64
}
