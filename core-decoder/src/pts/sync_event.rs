//! Line protocol of the textual synchronization-event channel.

use std::fmt;

/// Notification for the downstream video/sync subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Audio started at this PTS.
    Start(u64),
    Pause,
    Resume,
    Stop,
    /// Audio timeline jumped; new PTS.
    Discontinuity(u64),
    /// Bytes of decoded PCM discarded to catch up.
    PcmDropped(u64),
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Start(pts) => write!(f, "AUDIO_START:{:#x}", pts),
            SyncEvent::Pause => f.write_str("AUDIO_PAUSE"),
            SyncEvent::Resume => f.write_str("AUDIO_RESUME"),
            SyncEvent::Stop => f.write_str("AUDIO_STOP"),
            SyncEvent::Discontinuity(pts) => write!(f, "AUDIO_TSTAMP_DISCONTINUITY:{:#x}", pts),
            SyncEvent::PcmDropped(bytes) => write!(f, "AUDIO_PCM_DROPPED:{}", bytes),
        }
    }
}
