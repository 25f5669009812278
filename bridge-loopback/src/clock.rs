//! Simulated hardware PTS/PCR block.

use bridge_traits::{BridgeError, HardwareClock, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

/// Settable stand-in for the hardware timestamp machinery.
///
/// The checkin table maps cumulative bitstream offsets to PTS values;
/// [`HardwareClock::lookup_pts`] returns the entry at or below the offset,
/// or 0 when none exists. With hardware lookup disabled the lookup reports
/// `NotAvailable`, as on a pure software decode path.
#[derive(Debug)]
pub struct SimulatedClock {
    checkins: Mutex<BTreeMap<u64, u64>>,
    hardware_lookup: AtomicBool,
    pcr: AtomicU64,
    video_pts: AtomicU64,
    audio_pts: AtomicU64,
    first_audio: AtomicBool,
    first_video: AtomicBool,
    pcr_writes: Mutex<Vec<u64>>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            checkins: Mutex::new(BTreeMap::new()),
            hardware_lookup: AtomicBool::new(true),
            pcr: AtomicU64::new(0),
            video_pts: AtomicU64::new(0),
            audio_pts: AtomicU64::new(0),
            first_audio: AtomicBool::new(false),
            first_video: AtomicBool::new(false),
            pcr_writes: Mutex::new(Vec::new()),
        }
    }

    /// Record that the packet starting at `offset` carries `pts`.
    pub fn check_in(&self, offset: u64, pts: u64) {
        self.checkins.lock().insert(offset, pts);
    }

    pub fn set_hardware_lookup(&self, enabled: bool) {
        self.hardware_lookup.store(enabled, Ordering::Release);
    }

    /// Set the program clock without recording a write.
    pub fn set_program_clock(&self, pts: u64) {
        self.pcr.store(pts, Ordering::Release);
    }

    pub fn set_video(&self, pts: u64) {
        self.video_pts.store(pts, Ordering::Release);
    }

    /// Move both the program clock and video PTS forward.
    pub fn advance(&self, ticks: u64) {
        self.pcr.fetch_add(ticks, Ordering::AcqRel);
        self.video_pts.fetch_add(ticks, Ordering::AcqRel);
    }

    pub fn set_first_audio_checked_in(&self, checked_in: bool) {
        self.first_audio.store(checked_in, Ordering::Release);
    }

    pub fn set_first_video_checked_in(&self, checked_in: bool) {
        self.first_video.store(checked_in, Ordering::Release);
    }

    /// Last audio PTS published by the decoder.
    pub fn audio_pts(&self) -> u64 {
        self.audio_pts.load(Ordering::Acquire)
    }

    /// Every value written through [`HardwareClock::set_pcr`].
    pub fn pcr_writes(&self) -> Vec<u64> {
        self.pcr_writes.lock().clone()
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareClock for SimulatedClock {
    fn lookup_pts(&self, offset: u64) -> Result<u64> {
        if !self.hardware_lookup.load(Ordering::Acquire) {
            return Err(BridgeError::NotAvailable(
                "no hardware checkin table".to_string(),
            ));
        }
        let pts = self
            .checkins
            .lock()
            .range(..=offset)
            .next_back()
            .map(|(_, pts)| *pts)
            .unwrap_or(0);
        trace!(offset, pts, "Simulated PTS lookup");
        Ok(pts)
    }

    fn pcr(&self) -> Result<u64> {
        Ok(self.pcr.load(Ordering::Acquire))
    }

    fn set_pcr(&self, pts: u64) -> Result<()> {
        self.pcr.store(pts, Ordering::Release);
        self.pcr_writes.lock().push(pts);
        Ok(())
    }

    fn video_pts(&self) -> Result<u64> {
        Ok(self.video_pts.load(Ordering::Acquire))
    }

    fn set_audio_pts(&self, pts: u64) -> Result<()> {
        self.audio_pts.store(pts, Ordering::Release);
        Ok(())
    }

    fn first_audio_pts_checked_in(&self) -> bool {
        self.first_audio.load(Ordering::Acquire)
    }

    fn first_video_pts_checked_in(&self) -> bool {
        self.first_video.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_uses_entry_at_or_below() {
        let clock = SimulatedClock::new();
        clock.check_in(0, 90_000);
        clock.check_in(1_000, 93_600);

        assert_eq!(clock.lookup_pts(0).unwrap(), 90_000);
        assert_eq!(clock.lookup_pts(999).unwrap(), 90_000);
        assert_eq!(clock.lookup_pts(5_000).unwrap(), 93_600);
    }

    #[test]
    fn test_lookup_without_entries_is_zero() {
        let clock = SimulatedClock::new();
        assert_eq!(clock.lookup_pts(100).unwrap(), 0);
    }

    #[test]
    fn test_software_path_reports_not_available() {
        let clock = SimulatedClock::new();
        clock.set_hardware_lookup(false);
        assert!(clock.lookup_pts(0).unwrap_err().is_not_available());
    }

    #[test]
    fn test_pcr_writes_recorded() {
        let clock = SimulatedClock::new();
        clock.set_program_clock(10);
        clock.advance(5);
        clock.set_pcr(42).unwrap();

        assert_eq!(clock.pcr().unwrap(), 42);
        assert_eq!(clock.video_pts().unwrap(), 5);
        assert_eq!(clock.pcr_writes(), vec![42]);
    }
}
