//! Drop-PCM resync and program-clock drift control.

use super::{drop_size_bytes, PtsTracker, SyncEvent};
use crate::config::{SyncMode, TICKS_PER_MS};
use core_runtime::events::DecoderEvent;
use core_runtime::logging::hex_pts;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval while waiting for the first video PTS.
const VIDEO_CHECKIN_POLL: Duration = Duration::from_millis(10);

/// Result of one drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropReport {
    pub requested: u64,
    pub dropped: u64,
    /// Ended by the time budget, the starvation limit or exit.
    pub incomplete: bool,
    pub elapsed: Duration,
}

/// Result of [`PtsTracker::resync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// No reference clock value or no audio PTS.
    NoReference,
    /// Audio is not behind the reference.
    InSync,
    /// Gap beyond the sanity bound; treated as a stream restart.
    StreamRestart { gap_ticks: u64 },
    /// PCM was dropped; `clock_reset` if the reference was then forced.
    Dropped {
        report: DropReport,
        clock_reset: bool,
    },
}

impl PtsTracker {
    /// Discard up to `bytes` of decoded PCM from the output ring.
    ///
    /// Never discards more than requested, and returns within the configured
    /// wall-clock budget even if no PCM ever arrives.
    pub fn drop_pcm(&mut self, bytes: u64) -> DropReport {
        let start = Instant::now();
        let deadline = start + self.drop_config.max_duration();
        let frame = self.links.status.format().frame_bytes().max(1);
        let chunk = self.drop_config.chunk_bytes.max(frame);

        let mut dropped = 0u64;
        let mut zero_reads = 0u32;
        let mut incomplete = false;

        while dropped < bytes {
            let now = Instant::now();
            if self.links.exit.is_set() || now >= deadline {
                incomplete = true;
                break;
            }

            let want = ((bytes - dropped).min(chunk as u64)) as usize;
            if want < frame {
                break;
            }
            let n = self.links.ring.discard_aligned(want, frame);
            if n == 0 {
                zero_reads += 1;
                if zero_reads >= self.drop_config.zero_read_limit {
                    incomplete = true;
                    break;
                }
                let wait = self.drop_config.retry_wait().min(deadline - now);
                self.links.ring.wait_for_data(frame, wait);
                continue;
            }

            zero_reads = 0;
            dropped += n as u64;
        }

        self.state.dropped_bytes_total += dropped;
        let report = DropReport {
            requested: bytes,
            dropped,
            incomplete: incomplete || dropped < bytes,
            elapsed: start.elapsed(),
        };
        if report.incomplete {
            warn!(
                requested = bytes,
                dropped,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "PCM drop ended early"
            );
        }
        self.announce_drop(&report);
        report
    }

    /// Catch audio up with the reference clock by dropping PCM.
    ///
    /// Run at stream start and on demand.
    pub fn resync(&mut self) -> ResyncOutcome {
        let Some(reference) = self.reference_pts(true) else {
            return ResyncOutcome::NoReference;
        };
        let Some(apts) = self.compute_pts() else {
            return ResyncOutcome::NoReference;
        };

        if apts >= reference {
            debug!(apts = %hex_pts(apts), reference = %hex_pts(reference), "Audio not behind reference");
            return ResyncOutcome::InSync;
        }

        let gap = reference - apts;
        if gap > self.drop_config.sanity_bound_ticks {
            warn!(gap, apts = %hex_pts(apts), reference = %hex_pts(reference), "Gap too large, treating as stream restart");
            return ResyncOutcome::StreamRestart { gap_ticks: gap };
        }

        let format = self.links.status.format();
        let bytes = drop_size_bytes(gap, &format);
        info!(gap, drop_bytes = bytes, "Dropping PCM to reach reference");
        let report = self.drop_pcm(bytes);

        let after = self.compute_pts().unwrap_or(apts);
        self.publish_pts(after);
        let reference_after = self.reference_pts(false).unwrap_or(reference);

        let residual = reference_after.abs_diff(after);
        let clock_reset = residual > self.drop_config.reset_threshold_ticks;
        if clock_reset {
            self.force_reference(after);
        }

        ResyncOutcome::Dropped {
            report,
            clock_reset,
        }
    }

    /// PCR-master refresh step: resampler control plus small drops.
    pub(super) fn pcr_correction(&mut self, apts: u64) {
        let pcr = match self.links.clock.pcr() {
            Ok(pcr) if pcr != 0 => pcr,
            _ => return,
        };
        self.update_resampler(apts, pcr);

        let lead = pcr.saturating_sub(apts);
        let in_window = lead > self.config.pcr_lead_threshold_ticks
            && lead < self.drop_config.sanity_bound_ticks;
        if !in_window {
            self.state.pcr_lead_count = 0;
            return;
        }

        self.state.pcr_lead_count += 1;
        if self.state.pcr_lead_count < self.config.pcr_hysteresis_count {
            return;
        }
        self.state.pcr_lead_count = 0;

        let format = self.links.status.format();
        let bytes = drop_size_bytes(lead, &format);
        debug!(lead, drop_bytes = bytes, "Program clock leads audio");
        self.drop_pcm(bytes);
        if let Some(after) = self.compute_pts() {
            self.publish_pts(after);
        }
    }

    fn update_resampler(&self, apts: u64, pcr: u64) {
        if !self.resample.enabled {
            self.resample_delta.store(0, Ordering::Release);
            return;
        }
        let engage = self.resample.engage_threshold_ms * TICKS_PER_MS;
        let step = self.resample.delta_frames as i32;
        let delta = if pcr > apts + engage {
            step
        } else if apts > pcr + engage {
            -step
        } else {
            0
        };
        let previous = self.resample_delta.swap(delta, Ordering::AcqRel);
        if previous != delta {
            debug!(delta, apts = %hex_pts(apts), pcr = %hex_pts(pcr), "Resampler delta changed");
        }
    }

    /// Reference clock value per sync mode, `None` if unavailable.
    fn reference_pts(&self, wait_for_video: bool) -> Option<u64> {
        let clock = &self.links.clock;
        let value = match self.state.sync_mode {
            SyncMode::VideoMaster | SyncMode::AudioMaster => clock.video_pts(),
            SyncMode::PcrMaster => {
                if wait_for_video {
                    let deadline = Instant::now()
                        + Duration::from_millis(self.drop_config.first_vpts_wait_ms);
                    while !clock.first_video_pts_checked_in() && Instant::now() < deadline {
                        if self.links.exit.wait_timeout(VIDEO_CHECKIN_POLL) {
                            return None;
                        }
                    }
                }
                clock.pcr()
            }
        };
        value.ok().filter(|pts| *pts != 0)
    }

    fn force_reference(&self, apts: u64) {
        match self.links.clock.set_pcr(apts) {
            Ok(()) => {
                info!(pts = %hex_pts(apts), "Reference clock reset to audio");
                let _ = self.links.events.emit(DecoderEvent::ClockReset { pts: apts });
            }
            Err(err) => warn!(error = %err, "Failed to reset reference clock"),
        }
    }

    fn announce_drop(&self, report: &DropReport) {
        if report.dropped > 0 {
            self.publish_sync(SyncEvent::PcmDropped(report.dropped));
        }
        let _ = self.links.events.emit(DecoderEvent::PcmDropped {
            requested_bytes: report.requested,
            dropped_bytes: report.dropped,
            incomplete: report.incomplete,
        });
    }
}
