//! Hardware timestamp and synchronization interfaces.
//!
//! All timestamps are 90 kHz ticks.

use crate::error::Result;

/// Access to the hardware PTS/PCR machinery.
pub trait HardwareClock: Send + Sync {
    /// Look up the checked-in PTS for a cumulative bitstream byte offset.
    ///
    /// Returns `BridgeError::NotAvailable` when the stream has no hardware
    /// checkin table (pure software decode). A returned `0` means "no PTS
    /// recorded for this offset".
    fn lookup_pts(&self, offset: u64) -> Result<u64>;

    /// Current program clock reference.
    fn pcr(&self) -> Result<u64>;

    /// Force the program clock reference.
    fn set_pcr(&self, pts: u64) -> Result<()>;

    /// Current video presentation timestamp.
    fn video_pts(&self) -> Result<u64>;

    /// Publish the audio timestamp the core considers audible now.
    fn set_audio_pts(&self, pts: u64) -> Result<()>;

    /// Whether the demux has checked in the first audio PTS.
    fn first_audio_pts_checked_in(&self) -> bool;

    /// Whether the demux has checked in the first video PTS.
    fn first_video_pts_checked_in(&self) -> bool;
}

/// Textual synchronization-event channel consumed by the video/sync subsystem.
///
/// Lines look like `AUDIO_START:0x15f90` or `AUDIO_PAUSE`.
pub trait SyncEventSink: Send + Sync {
    fn publish(&self, line: &str) -> Result<()>;
}
