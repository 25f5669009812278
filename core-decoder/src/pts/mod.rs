//! # PTS Tracking
//!
//! Estimates which audio timestamp is audible right now and keeps it in step
//! with the reference clock.
//!
//! ## Phases
//!
//! - `AwaitingFirstPts`: nothing published; [`PtsTracker::start`] seeds the
//!   timeline, either from the first checked-in PTS or from a reference
//!   clock fallback
//! - `Tracking`: [`PtsTracker::refresh_at`] recomputes the PTS each interval
//!   and republishes it when it moved more than the tolerance
//! - `Discontinuity`: a jump of at least the discontinuity threshold was seen;
//!   correction is suspended for a grace window, then the fresh PTS is
//!   published together with exactly one discontinuity notification
//!
//! ## Formula
//!
//! The hardware looks up the PTS checked in at the current decode offset.
//! That value is anchored together with the decoded-PCM offset at that
//! moment; later refreshes extrapolate from the anchor when the lookup has
//! nothing new. Everything decoded but not yet audible is subtracted: ring
//! level plus device latency (`HardwareLookup`), or decoded minus rendered
//! frames (`OutputPosition`).

mod calc;
mod resync;
mod sync_event;

pub use calc::{
    bytes_to_ticks, drop_duration_ms, drop_size_bytes, duration_to_ticks, frames_to_ticks,
    offset_pts, ticks_to_duration,
};
pub use resync::{DropReport, ResyncOutcome};
pub use sync_event::SyncEvent;

use crate::config::{DropConfig, PtsConfig, PtsVariant, ResampleConfig, SyncMode};
use crate::context::StreamStatus;
use crate::exit::ExitFlag;
use crate::ring::OutputRing;
use bridge_traits::{AudioOutput, HardwareClock, SyncEventSink};
use core_runtime::events::{DecoderEvent, EventBus};
use core_runtime::logging::hex_pts;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Where the tracker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtsPhase {
    AwaitingFirstPts,
    Tracking,
    Discontinuity {
        since: Instant,
        previous: u64,
    },
}

/// What one refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Not started, paused, held off after resume, or inside a grace window.
    Skipped,
    /// No usable PTS, or the change was within tolerance.
    NoChange,
    /// A new PTS was published.
    Published(u64),
    /// A jump was detected; publication waits for the grace window.
    DiscontinuityDetected { previous: u64, current: u64 },
    /// The grace window ended and the new timeline was published.
    DiscontinuityResolved(u64),
}

/// Tracker state. Written only by the tracker; everything else reads copies.
#[derive(Debug, Clone)]
pub struct PtsState {
    pub phase: PtsPhase,
    pub sync_mode: SyncMode,
    pub last_valid_pts: u64,
    pub first_pts_seen: bool,
    pub last_published_pts: u64,
    pub discontinuity_count: u32,
    pub paused: bool,
    pcm_offset_at_anchor: u64,
    dropped_bytes_total: u64,
    hold_until: Option<Instant>,
    pcr_lead_count: u32,
}

impl PtsState {
    fn new(sync_mode: SyncMode) -> Self {
        Self {
            phase: PtsPhase::AwaitingFirstPts,
            sync_mode,
            last_valid_pts: 0,
            first_pts_seen: false,
            last_published_pts: 0,
            discontinuity_count: 0,
            paused: false,
            pcm_offset_at_anchor: 0,
            dropped_bytes_total: 0,
            hold_until: None,
            pcr_lead_count: 0,
        }
    }
}

/// Collaborators the tracker reads from and publishes to.
#[derive(Clone)]
pub struct TrackerLinks {
    pub clock: Arc<dyn HardwareClock>,
    pub output: Arc<dyn AudioOutput>,
    pub sync_events: Arc<dyn SyncEventSink>,
    pub events: EventBus,
    pub status: Arc<StreamStatus>,
    pub ring: Arc<OutputRing>,
    pub exit: ExitFlag,
}

pub struct PtsTracker {
    config: PtsConfig,
    drop_config: DropConfig,
    resample: ResampleConfig,
    wait_fresh: Duration,
    links: TrackerLinks,
    resample_delta: Arc<AtomicI32>,
    state: PtsState,
}

impl PtsTracker {
    pub fn new(
        config: PtsConfig,
        drop_config: DropConfig,
        resample: ResampleConfig,
        wait_fresh: Duration,
        links: TrackerLinks,
    ) -> Self {
        let state = PtsState::new(config.sync_mode);
        Self {
            config,
            drop_config,
            resample,
            wait_fresh,
            links,
            resample_delta: Arc::new(AtomicI32::new(0)),
            state,
        }
    }

    pub fn state(&self) -> &PtsState {
        &self.state
    }

    pub fn phase(&self) -> PtsPhase {
        self.state.phase
    }

    /// Frames per resampling frame the output stage should add or remove.
    ///
    /// Positive removes frames, which plays the audio timeline faster.
    pub fn resample_delta(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.resample_delta)
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Poll for the first checked-in audio PTS, at most `wait_count` times.
    ///
    /// Returns `None` on timeout or when `cancel` is raised.
    pub fn wait_for_first_pts(
        &self,
        wait_count: u32,
        interval: Duration,
        cancel: &ExitFlag,
    ) -> Option<u64> {
        for attempt in 0..wait_count {
            if self.links.clock.first_audio_pts_checked_in() {
                match self.links.clock.lookup_pts(0) {
                    Ok(pts) if pts != 0 => {
                        debug!(attempt, pts = %hex_pts(pts), "First audio PTS checked in");
                        return Some(pts);
                    }
                    Ok(_) => {}
                    Err(err) => trace!(error = %err, "First PTS lookup failed"),
                }
            }
            if cancel.wait_timeout(interval) {
                return None;
            }
        }
        None
    }

    /// Seed used when no audio PTS ever checks in: video PTS, then PCR, then 0.
    pub fn fallback_seed(&self) -> u64 {
        let clock = &self.links.clock;
        clock
            .video_pts()
            .ok()
            .filter(|pts| *pts != 0)
            .or_else(|| clock.pcr().ok().filter(|pts| *pts != 0))
            .unwrap_or(0)
    }

    /// Establish the timeline at `seed` and announce the start.
    pub fn start(&mut self, seed: u64, fallback: bool) {
        self.state.phase = PtsPhase::Tracking;
        self.state.first_pts_seen = true;
        self.state.last_valid_pts = seed;
        self.state.last_published_pts = seed;
        self.state.paused = false;
        self.state.hold_until = None;
        self.state.pcr_lead_count = 0;
        // The seed is the PTS of the first decoded sample.
        self.state.pcm_offset_at_anchor = 0;
        self.links.status.reset_out_bytes();

        if fallback {
            if let Err(err) = self.links.clock.set_audio_pts(seed) {
                warn!(error = %err, "Failed to write fallback audio PTS");
            }
        }
        self.publish_sync(SyncEvent::Start(seed));
        info!(pts = %hex_pts(seed), fallback, "Audio PTS timeline started");
        let _ = self
            .links
            .events
            .emit(DecoderEvent::FirstPtsSeeded { pts: seed, fallback });
    }

    // ========================================================================
    // Lifecycle Hooks
    // ========================================================================

    pub fn pause(&mut self) {
        self.state.paused = true;
        self.publish_sync(SyncEvent::Pause);
    }

    /// Resume publishing after `wait_fresh` has passed.
    pub fn resume(&mut self, now: Instant) {
        self.state.paused = false;
        self.state.hold_until = Some(now + self.wait_fresh);
        self.publish_sync(SyncEvent::Resume);
    }

    pub fn stop(&mut self) {
        self.publish_sync(SyncEvent::Stop);
        let discontinuities = self.state.discontinuity_count;
        self.state = PtsState::new(self.config.sync_mode);
        self.state.discontinuity_count = discontinuities;
        self.resample_delta.store(0, Ordering::Release);
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Periodic refresh; call once per refresh interval while active.
    pub fn refresh_at(&mut self, now: Instant) -> RefreshOutcome {
        if self.state.phase == PtsPhase::AwaitingFirstPts || self.state.paused {
            return RefreshOutcome::Skipped;
        }
        if let Some(until) = self.state.hold_until {
            if now < until {
                return RefreshOutcome::Skipped;
            }
            self.state.hold_until = None;
        }

        if let PtsPhase::Discontinuity { since, previous } = self.state.phase {
            if now.saturating_duration_since(since) < self.config.discontinuity_grace() {
                return RefreshOutcome::Skipped;
            }
            let Some(current) = self.compute_pts() else {
                return RefreshOutcome::Skipped;
            };
            self.state.phase = PtsPhase::Tracking;
            self.state.discontinuity_count += 1;
            self.publish_pts(current);
            self.publish_sync(SyncEvent::Discontinuity(current));
            warn!(
                previous = %hex_pts(previous),
                current = %hex_pts(current),
                count = self.state.discontinuity_count,
                "Audio timestamp discontinuity"
            );
            let _ = self.links.events.emit(DecoderEvent::Discontinuity {
                previous_pts: previous,
                new_pts: current,
            });
            return RefreshOutcome::DiscontinuityResolved(current);
        }

        let Some(current) = self.compute_pts() else {
            return RefreshOutcome::NoChange;
        };
        let previous = self.state.last_published_pts;
        let diff = current.abs_diff(previous);

        let outcome = if diff >= self.config.discontinuity_threshold_ticks {
            self.state.phase = PtsPhase::Discontinuity {
                since: now,
                previous,
            };
            debug!(
                previous = %hex_pts(previous),
                current = %hex_pts(current),
                "Timestamp jump, entering grace window"
            );
            return RefreshOutcome::DiscontinuityDetected { previous, current };
        } else if diff < self.config.tolerance_ticks {
            RefreshOutcome::NoChange
        } else {
            self.publish_pts(current);
            trace!(apts = %hex_pts(current), diff, "Audio PTS refreshed");
            RefreshOutcome::Published(current)
        };

        if self.state.sync_mode == SyncMode::PcrMaster {
            self.pcr_correction(current);
        }
        outcome
    }

    // ========================================================================
    // PTS Computation
    // ========================================================================

    /// Audible PTS right now, or `None` if it cannot be determined.
    pub fn compute_pts(&mut self) -> Option<u64> {
        if !self.state.first_pts_seen {
            return None;
        }

        let status = &self.links.status;
        let format = status.format();
        let pcm_offset = status.decode_pcm_offset();

        let fresh = match status.decode_offset() {
            Some(offset) => match self.links.clock.lookup_pts(offset) {
                Ok(pts) if pts != 0 && pts != self.state.last_valid_pts => Some(pts),
                Ok(_) => None,
                Err(err) if err.is_not_available() => None,
                Err(err) => {
                    warn!(error = %err, offset, "PTS lookup failed");
                    return None;
                }
            },
            None => None,
        };
        if let Some(pts) = fresh {
            self.state.last_valid_pts = pts;
            self.state.pcm_offset_at_anchor = pcm_offset;
            status.reset_out_bytes();
        }

        let decoded_since = pcm_offset.saturating_sub(self.state.pcm_offset_at_anchor);
        let at_decoder = offset_pts(
            self.state.last_valid_pts,
            bytes_to_ticks(decoded_since, &format),
            0,
            0,
        );
        let delta = self.config.delta_ticks();
        let latency = duration_to_ticks(self.links.output.latency());
        let buffered = bytes_to_ticks(self.links.ring.level() as u64, &format) + latency;

        let apts = match self.config.variant {
            PtsVariant::HardwareLookup => offset_pts(at_decoder, 0, buffered, delta),
            PtsVariant::OutputPosition => match self.links.output.output_position() {
                Some(position) => {
                    let frame = format.frame_bytes().max(1) as u64;
                    let decoded_frames =
                        pcm_offset.saturating_sub(self.state.dropped_bytes_total) / frame;
                    let cached = decoded_frames.saturating_sub(position.frames_played);
                    let rate = self.links.output.playback_rate().max(0.0) as f64;
                    let cache_ticks =
                        (frames_to_ticks(cached, format.sample_rate) as f64 * rate) as u64;
                    let pending = cache_ticks.saturating_sub(duration_to_ticks(position.age));
                    offset_pts(at_decoder, 0, pending, delta)
                }
                None if fresh.is_none() => {
                    let played = bytes_to_ticks(status.out_bytes_since_last_valid_pts(), &format);
                    offset_pts(self.state.last_valid_pts, played, latency, delta)
                }
                None => offset_pts(at_decoder, 0, buffered, delta),
            },
        };
        Some(apts)
    }

    fn publish_pts(&mut self, pts: u64) {
        self.state.last_published_pts = pts;
        if let Err(err) = self.links.clock.set_audio_pts(pts) {
            warn!(error = %err, "Failed to publish audio PTS");
        }
    }

    fn publish_sync(&self, event: SyncEvent) {
        let line = event.to_string();
        if let Err(err) = self.links.sync_events.publish(&line) {
            warn!(error = %err, %line, "Failed to publish sync event");
        }
    }
}

impl std::fmt::Debug for PtsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtsTracker")
            .field("variant", &self.config.variant)
            .field("state", &self.state)
            .finish()
    }
}
