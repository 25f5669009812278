//! # Decoder Configuration
//!
//! Every threshold used by the decode core lives here as a named constant
//! carrying its unit (`*_TICKS` are 90 kHz ticks, `*_MS` milliseconds,
//! `*_BYTES` bytes). [`DecoderConfig`] groups them per component and can be
//! loaded from JSON; missing fields take their defaults.

use crate::error::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PTS clock rate.
pub const TICKS_PER_SECOND: u64 = 90_000;
/// PTS ticks per millisecond.
pub const TICKS_PER_MS: u64 = 90;

// ============================================================================
// Named Defaults
// ============================================================================

pub const MAIN_QUEUE_CAPACITY: usize = 4;
pub const ASSOCIATED_QUEUE_CAPACITY: usize = 8;
pub const QUEUE_FULL_RETRY_MS: u64 = 1;
pub const QUEUE_EMPTY_WAIT_MS: u64 = 10;

pub const SUB_READ_BYTES: usize = 512;
pub const WFD_EARLY_EXIT_BYTES: usize = 300;
pub const SOURCE_STARVED_WAIT_MS: u64 = 1;
pub const SIZER_RETRY_WAIT_MS: u64 = 10;
pub const MAX_UNIT_BYTES: usize = 1024 * 1024;

pub const DEFAULT_INPUT_BYTES: usize = 5120;
pub const MAX_OUTPUT_FRAME_BYTES: usize = 500 * 1024;
pub const RING_FULL_WAIT_MS: u64 = 10;
pub const FORMAT_DRAIN_POLL_MS: u64 = 20;

pub const PTS_REFRESH_INTERVAL_MS: u64 = 100;
pub const PTS_TOLERANCE_TICKS: u64 = 1_800;
pub const DISCONTINUITY_THRESHOLD_TICKS: u64 = 270_000;
pub const DISCONTINUITY_GRACE_MS: u64 = 500;
pub const PCR_LEAD_THRESHOLD_TICKS: u64 = 9_000;
pub const PCR_HYSTERESIS_COUNT: u32 = 3;

pub const DROP_CHUNK_BYTES: usize = 4096;
pub const DROP_MAX_DURATION_MS: u64 = 1_000;
pub const DROP_ZERO_READ_LIMIT: u32 = 100;
pub const DROP_RETRY_WAIT_MS: u64 = 5;
pub const DROP_SANITY_BOUND_TICKS: u64 = 900_000;
pub const CLOCK_RESET_THRESHOLD_TICKS: u64 = 13_500;
pub const FIRST_VPTS_WAIT_MS: u64 = 1_000;

/// Polls for the first audio PTS during `Start`. With the default 100 polls
/// of [`START_WAIT_INTERVAL_MS`] (100 ms), `Start` can block the command loop
/// for up to 10 s before seeding from the video PTS, the PCR or 0.
pub const START_WAIT_COUNT: u32 = 100;
pub const START_WAIT_INTERVAL_MS: u64 = 100;
pub const RESUME_REFRESH_HOLD_MS: u64 = 200;
pub const PCR_START_DELAY_MS: u64 = 200;

pub const MIXING_LEVEL_MIN: i32 = -32;
pub const MIXING_LEVEL_MAX: i32 = 32;
pub const AD_PREFILL_MS: u32 = 100;
pub const AD_PREFILL_TIMEOUT_MS: u64 = 500;

pub const PCM_RING_BYTES: usize = 512 * 1024;
pub const RAW_RING_BYTES: usize = 256 * 1024;

pub const RESAMPLE_FRAME_FRAMES: usize = 128;
pub const RESAMPLE_DELTA_FRAMES: u32 = 1;
pub const RESAMPLE_ENGAGE_MS: u64 = 30;

// ============================================================================
// Modes
// ============================================================================

/// Which clock is authoritative for drift correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Video PTS is the reference; audio is corrected toward it.
    #[default]
    VideoMaster,
    /// Audio is the reference; video slaves to the published audio PTS.
    AudioMaster,
    /// Hardware program clock is the reference.
    PcrMaster,
}

/// How the audible PTS is derived from hardware state.
///
/// Two hardware generations disagree on the formula, so both are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtsVariant {
    /// Look up the checked-in PTS at the current decode offset and subtract
    /// everything still buffered between the decoder and the speaker.
    #[default]
    HardwareLookup,
    /// Derive the PTS from the output device's rendered-frame position.
    OutputPosition,
}

// ============================================================================
// Component Configs
// ============================================================================

/// Packet queue bounds and polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Capacity of the main-stream queue.
    #[serde(default = "default_main_capacity")]
    pub main_capacity: usize,

    /// Capacity of the associated-audio queue.
    #[serde(default = "default_associated_capacity")]
    pub associated_capacity: usize,

    /// Back-off after a rejected push, in milliseconds.
    #[serde(default = "default_queue_full_retry_ms")]
    pub full_retry_ms: u64,

    /// Longest a consumer waits for a packet before re-checking exit.
    #[serde(default = "default_queue_empty_wait_ms")]
    pub empty_wait_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            main_capacity: default_main_capacity(),
            associated_capacity: default_associated_capacity(),
            full_retry_ms: default_queue_full_retry_ms(),
            empty_wait_ms: default_queue_empty_wait_ms(),
        }
    }
}

/// Bitstream reader behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Largest single read issued to the bitstream source.
    #[serde(default = "default_sub_read_bytes")]
    pub sub_read_bytes: usize,

    /// Wi-Fi display capture: cap AAC reads per iteration.
    #[serde(default)]
    pub wfd_mode: bool,

    /// Stop reading once this many bytes are collected in `wfd_mode`.
    #[serde(default = "default_wfd_early_exit_bytes")]
    pub wfd_early_exit_bytes: usize,

    /// Wait after the source returned no bytes.
    #[serde(default = "default_source_starved_wait_ms")]
    pub starved_wait_ms: u64,

    /// Wait after the frame sizer asked for a retry.
    #[serde(default = "default_sizer_retry_wait_ms")]
    pub sizer_retry_ms: u64,

    /// Largest unit a sync-word length field may announce.
    #[serde(default = "default_max_unit_bytes")]
    pub max_unit_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            sub_read_bytes: default_sub_read_bytes(),
            wfd_mode: false,
            wfd_early_exit_bytes: default_wfd_early_exit_bytes(),
            starved_wait_ms: default_source_starved_wait_ms(),
            sizer_retry_ms: default_sizer_retry_wait_ms(),
            max_unit_bytes: default_max_unit_bytes(),
        }
    }
}

/// Decode loop behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Input size requested when the adapter has no preference.
    #[serde(default = "default_input_bytes")]
    pub default_input_bytes: usize,

    /// Scratch buffer handed to the adapter for one decode call.
    #[serde(default = "default_max_output_frame_bytes")]
    pub max_output_frame_bytes: usize,

    /// Wait while the output ring lacks space.
    #[serde(default = "default_ring_full_wait_ms")]
    pub ring_full_wait_ms: u64,

    /// Drain the ring before announcing a format change.
    #[serde(default = "default_true")]
    pub drain_on_format_change: bool,

    /// Poll interval while draining for a format change.
    #[serde(default = "default_format_drain_poll_ms")]
    pub format_drain_poll_ms: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            default_input_bytes: default_input_bytes(),
            max_output_frame_bytes: default_max_output_frame_bytes(),
            ring_full_wait_ms: default_ring_full_wait_ms(),
            drain_on_format_change: true,
            format_drain_poll_ms: default_format_drain_poll_ms(),
        }
    }
}

/// PTS tracking thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtsConfig {
    #[serde(default)]
    pub variant: PtsVariant,

    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Refresh cadence while active.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Changes smaller than this are not republished.
    #[serde(default = "default_tolerance_ticks")]
    pub tolerance_ticks: u64,

    /// Jumps of at least this size are discontinuities.
    #[serde(default = "default_discontinuity_threshold_ticks")]
    pub discontinuity_threshold_ticks: u64,

    /// Correction is suspended this long after a discontinuity.
    #[serde(default = "default_discontinuity_grace_ms")]
    pub discontinuity_grace_ms: u64,

    /// Constant offset added to every computed PTS.
    #[serde(default)]
    pub pts_delta_ms: i64,

    /// PCR-master: program clock lead that triggers a continuous drop.
    #[serde(default = "default_pcr_lead_threshold_ticks")]
    pub pcr_lead_threshold_ticks: u64,

    /// PCR-master: consecutive lead samples required before dropping.
    #[serde(default = "default_pcr_hysteresis_count")]
    pub pcr_hysteresis_count: u32,
}

impl Default for PtsConfig {
    fn default() -> Self {
        Self {
            variant: PtsVariant::default(),
            sync_mode: SyncMode::default(),
            refresh_interval_ms: default_refresh_interval_ms(),
            tolerance_ticks: default_tolerance_ticks(),
            discontinuity_threshold_ticks: default_discontinuity_threshold_ticks(),
            discontinuity_grace_ms: default_discontinuity_grace_ms(),
            pts_delta_ms: 0,
            pcr_lead_threshold_ticks: default_pcr_lead_threshold_ticks(),
            pcr_hysteresis_count: default_pcr_hysteresis_count(),
        }
    }
}

impl PtsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn discontinuity_grace(&self) -> Duration {
        Duration::from_millis(self.discontinuity_grace_ms)
    }

    /// `pts_delta_ms` in ticks.
    pub fn delta_ticks(&self) -> i64 {
        self.pts_delta_ms * TICKS_PER_MS as i64
    }
}

/// Drop-PCM resync budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropConfig {
    /// Run the resync when the stream starts.
    #[serde(default = "default_true")]
    pub resync_on_start: bool,

    /// Largest single discard.
    #[serde(default = "default_drop_chunk_bytes")]
    pub chunk_bytes: usize,

    /// Wall-clock budget for one drop.
    #[serde(default = "default_drop_max_duration_ms")]
    pub max_duration_ms: u64,

    /// Consecutive empty discards before giving up.
    #[serde(default = "default_drop_zero_read_limit")]
    pub zero_read_limit: u32,

    /// Wait between empty discards.
    #[serde(default = "default_drop_retry_wait_ms")]
    pub retry_wait_ms: u64,

    /// Gaps beyond this are stream restarts and are left alone.
    #[serde(default = "default_drop_sanity_bound_ticks")]
    pub sanity_bound_ticks: u64,

    /// Residual gap after dropping that forces the clock to audio.
    #[serde(default = "default_clock_reset_threshold_ticks")]
    pub reset_threshold_ticks: u64,

    /// PCR-master: wait for the first video PTS before resyncing.
    #[serde(default = "default_first_vpts_wait_ms")]
    pub first_vpts_wait_ms: u64,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            resync_on_start: true,
            chunk_bytes: default_drop_chunk_bytes(),
            max_duration_ms: default_drop_max_duration_ms(),
            zero_read_limit: default_drop_zero_read_limit(),
            retry_wait_ms: default_drop_retry_wait_ms(),
            sanity_bound_ticks: default_drop_sanity_bound_ticks(),
            reset_threshold_ticks: default_clock_reset_threshold_ticks(),
            first_vpts_wait_ms: default_first_vpts_wait_ms(),
        }
    }
}

impl DropConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

/// Start command behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Polls for the first audio PTS before falling back.
    #[serde(default = "default_start_wait_count")]
    pub wait_count: u32,

    /// Interval between those polls.
    #[serde(default = "default_start_wait_interval_ms")]
    pub wait_interval_ms: u64,

    /// Refresh is suppressed this long after Resume.
    #[serde(default = "default_resume_refresh_hold_ms")]
    pub wait_fresh_ms: u64,

    /// PCR-master: delay before the output starts.
    #[serde(default = "default_pcr_start_delay_ms")]
    pub pcr_start_delay_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            wait_count: default_start_wait_count(),
            wait_interval_ms: default_start_wait_interval_ms(),
            wait_fresh_ms: default_resume_refresh_hold_ms(),
            pcr_start_delay_ms: default_pcr_start_delay_ms(),
        }
    }
}

impl StartupConfig {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    pub fn wait_fresh(&self) -> Duration {
        Duration::from_millis(self.wait_fresh_ms)
    }
}

/// Associated-audio mixing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    /// Decode and mix the associated stream when one is configured.
    #[serde(default)]
    pub enabled: bool,

    /// Balance in `-32..=32`; higher favours the associated stream.
    #[serde(default)]
    pub mixing_level: i32,

    /// Associated PCM buffered before the main stream starts mixing.
    #[serde(default = "default_ad_prefill_ms")]
    pub prefill_ms: u32,

    /// Give up waiting for the prefill after this long.
    #[serde(default = "default_ad_prefill_timeout_ms")]
    pub prefill_timeout_ms: u64,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mixing_level: 0,
            prefill_ms: default_ad_prefill_ms(),
            prefill_timeout_ms: default_ad_prefill_timeout_ms(),
        }
    }
}

impl MixConfig {
    /// Gain applied to the associated stream.
    pub fn associated_gain(&self) -> f32 {
        let level = self.mixing_level.clamp(MIXING_LEVEL_MIN, MIXING_LEVEL_MAX);
        (level + 32) as f32 / 64.0
    }

    /// Gain applied to the main stream.
    pub fn main_gain(&self) -> f32 {
        1.0 - self.associated_gain()
    }

    /// Prefill threshold in bytes of 48 kHz stereo s16.
    pub fn prefill_bytes(&self) -> usize {
        self.prefill_ms as usize * 48 * 4
    }
}

/// Output ring and output-stage processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pcm_ring_bytes")]
    pub pcm_ring_bytes: usize,

    /// Also publish compressed passthrough bytes on a raw ring.
    #[serde(default)]
    pub raw_output: bool,

    #[serde(default = "default_raw_ring_bytes")]
    pub raw_ring_bytes: usize,

    /// Linear gain applied before the device.
    #[serde(default = "default_pre_gain")]
    pub pre_gain: f32,

    /// Fold stereo to `3/4 L + 3/4 R` on both channels.
    #[serde(default)]
    pub mono_downmix: bool,

    /// Zero-fill instead of delivering PCM.
    #[serde(default)]
    pub pre_mute: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pcm_ring_bytes: default_pcm_ring_bytes(),
            raw_output: false,
            raw_ring_bytes: default_raw_ring_bytes(),
            pre_gain: default_pre_gain(),
            mono_downmix: false,
            pre_mute: false,
        }
    }
}

/// Clock-drift resampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Allow the resampler in PCR-master mode.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Frames removed or added per resampling frame.
    #[serde(default = "default_resample_delta_frames")]
    pub delta_frames: u32,

    /// Frames per resampling frame.
    #[serde(default = "default_resample_frame_frames")]
    pub frame_frames: usize,

    /// Audio/PCR difference that engages the resampler.
    #[serde(default = "default_resample_engage_ms")]
    pub engage_threshold_ms: u64,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delta_frames: default_resample_delta_frames(),
            frame_frames: default_resample_frame_frames(),
            engage_threshold_ms: default_resample_engage_ms(),
        }
    }
}

// ============================================================================
// DecoderConfig
// ============================================================================

/// Complete decode-core configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub pts: PtsConfig,
    #[serde(default)]
    pub drop: DropConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub mix: MixConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub resample: ResampleConfig,
}

impl DecoderConfig {
    /// Shorter waits everywhere, for interactive sources.
    ///
    /// - 2 packet main queue
    /// - 50 ms PTS refresh
    /// - 20 polls at 50 ms before start falls back
    pub fn low_latency() -> Self {
        let mut config = Self::default();
        config.queue.main_capacity = 2;
        config.pts.refresh_interval_ms = 50;
        config.startup.wait_count = 20;
        config.startup.wait_interval_ms = 50;
        config.drop.max_duration_ms = 300;
        config.output.pcm_ring_bytes = 128 * 1024;
        config
    }

    /// Program-clock master with the drift resampler engaged.
    pub fn pcr_master() -> Self {
        let mut config = Self::default();
        config.pts.sync_mode = SyncMode::PcrMaster;
        config.resample.enabled = true;
        config
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DecoderError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate().map_err(DecoderError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.queue.main_capacity == 0 || self.queue.associated_capacity == 0 {
            return Err("queue capacities must be > 0".to_string());
        }

        if self.reader.sub_read_bytes == 0 {
            return Err("reader.sub_read_bytes must be > 0".to_string());
        }

        if self.reader.max_unit_bytes < 8 {
            return Err("reader.max_unit_bytes must hold at least a sync header".to_string());
        }

        if self.decode.default_input_bytes == 0 || self.decode.max_output_frame_bytes == 0 {
            return Err("decode buffer sizes must be > 0".to_string());
        }

        if self.pts.refresh_interval_ms == 0 {
            return Err("pts.refresh_interval_ms must be > 0".to_string());
        }

        if self.pts.tolerance_ticks >= self.pts.discontinuity_threshold_ticks {
            return Err("pts.tolerance_ticks must be below discontinuity_threshold_ticks".to_string());
        }

        if self.pts.pcr_lead_threshold_ticks >= self.drop.sanity_bound_ticks {
            return Err("pts.pcr_lead_threshold_ticks must be below drop.sanity_bound_ticks".to_string());
        }

        if self.drop.chunk_bytes == 0 {
            return Err("drop.chunk_bytes must be > 0".to_string());
        }

        if self.drop.zero_read_limit == 0 {
            return Err("drop.zero_read_limit must be > 0".to_string());
        }

        if !(MIXING_LEVEL_MIN..=MIXING_LEVEL_MAX).contains(&self.mix.mixing_level) {
            return Err(format!(
                "mix.mixing_level must be between {} and {}",
                MIXING_LEVEL_MIN, MIXING_LEVEL_MAX
            ));
        }

        if self.output.pcm_ring_bytes == 0 || self.output.raw_ring_bytes == 0 {
            return Err("output ring sizes must be > 0".to_string());
        }

        if !(0.0..=4.0).contains(&self.output.pre_gain) {
            return Err("output.pre_gain must be between 0.0 and 4.0".to_string());
        }

        if self.resample.frame_frames == 0
            || self.resample.delta_frames as usize >= self.resample.frame_frames
        {
            return Err("resample.delta_frames must be smaller than frame_frames".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_main_capacity() -> usize {
    MAIN_QUEUE_CAPACITY
}

fn default_associated_capacity() -> usize {
    ASSOCIATED_QUEUE_CAPACITY
}

fn default_queue_full_retry_ms() -> u64 {
    QUEUE_FULL_RETRY_MS
}

fn default_queue_empty_wait_ms() -> u64 {
    QUEUE_EMPTY_WAIT_MS
}

fn default_sub_read_bytes() -> usize {
    SUB_READ_BYTES
}

fn default_wfd_early_exit_bytes() -> usize {
    WFD_EARLY_EXIT_BYTES
}

fn default_source_starved_wait_ms() -> u64 {
    SOURCE_STARVED_WAIT_MS
}

fn default_sizer_retry_wait_ms() -> u64 {
    SIZER_RETRY_WAIT_MS
}

fn default_max_unit_bytes() -> usize {
    MAX_UNIT_BYTES
}

fn default_input_bytes() -> usize {
    DEFAULT_INPUT_BYTES
}

fn default_max_output_frame_bytes() -> usize {
    MAX_OUTPUT_FRAME_BYTES
}

fn default_ring_full_wait_ms() -> u64 {
    RING_FULL_WAIT_MS
}

fn default_format_drain_poll_ms() -> u64 {
    FORMAT_DRAIN_POLL_MS
}

fn default_refresh_interval_ms() -> u64 {
    PTS_REFRESH_INTERVAL_MS
}

fn default_tolerance_ticks() -> u64 {
    PTS_TOLERANCE_TICKS
}

fn default_discontinuity_threshold_ticks() -> u64 {
    DISCONTINUITY_THRESHOLD_TICKS
}

fn default_discontinuity_grace_ms() -> u64 {
    DISCONTINUITY_GRACE_MS
}

fn default_pcr_lead_threshold_ticks() -> u64 {
    PCR_LEAD_THRESHOLD_TICKS
}

fn default_pcr_hysteresis_count() -> u32 {
    PCR_HYSTERESIS_COUNT
}

fn default_drop_chunk_bytes() -> usize {
    DROP_CHUNK_BYTES
}

fn default_drop_max_duration_ms() -> u64 {
    DROP_MAX_DURATION_MS
}

fn default_drop_zero_read_limit() -> u32 {
    DROP_ZERO_READ_LIMIT
}

fn default_drop_retry_wait_ms() -> u64 {
    DROP_RETRY_WAIT_MS
}

fn default_drop_sanity_bound_ticks() -> u64 {
    DROP_SANITY_BOUND_TICKS
}

fn default_clock_reset_threshold_ticks() -> u64 {
    CLOCK_RESET_THRESHOLD_TICKS
}

fn default_first_vpts_wait_ms() -> u64 {
    FIRST_VPTS_WAIT_MS
}

fn default_start_wait_count() -> u32 {
    START_WAIT_COUNT
}

fn default_start_wait_interval_ms() -> u64 {
    START_WAIT_INTERVAL_MS
}

fn default_resume_refresh_hold_ms() -> u64 {
    RESUME_REFRESH_HOLD_MS
}

fn default_pcr_start_delay_ms() -> u64 {
    PCR_START_DELAY_MS
}

fn default_ad_prefill_ms() -> u32 {
    AD_PREFILL_MS
}

fn default_ad_prefill_timeout_ms() -> u64 {
    AD_PREFILL_TIMEOUT_MS
}

fn default_pcm_ring_bytes() -> usize {
    PCM_RING_BYTES
}

fn default_raw_ring_bytes() -> usize {
    RAW_RING_BYTES
}

fn default_pre_gain() -> f32 {
    1.0
}

fn default_resample_delta_frames() -> u32 {
    RESAMPLE_DELTA_FRAMES
}

fn default_resample_frame_frames() -> usize {
    RESAMPLE_FRAME_FRAMES
}

fn default_resample_engage_ms() -> u64 {
    RESAMPLE_ENGAGE_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DecoderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.main_capacity, 4);
        assert_eq!(config.queue.associated_capacity, 8);
        assert_eq!(config.pts.sync_mode, SyncMode::VideoMaster);
        assert_eq!(config.pts.variant, PtsVariant::HardwareLookup);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(DecoderConfig::low_latency().validate().is_ok());

        let pcr = DecoderConfig::pcr_master();
        assert!(pcr.validate().is_ok());
        assert_eq!(pcr.pts.sync_mode, SyncMode::PcrMaster);
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{ "pts": { "sync_mode": "pcr_master", "pts_delta_ms": -20 },
                        "mix": { "enabled": true, "mixing_level": 16 } }"#;
        let config = DecoderConfig::from_json_str(json).unwrap();

        assert_eq!(config.pts.sync_mode, SyncMode::PcrMaster);
        assert_eq!(config.pts.delta_ticks(), -1800);
        assert_eq!(config.pts.refresh_interval_ms, PTS_REFRESH_INTERVAL_MS);
        assert!(config.mix.enabled);
        assert_eq!(config.queue.main_capacity, MAIN_QUEUE_CAPACITY);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let err = DecoderConfig::from_json_str(r#"{ "queue": { "main_capacity": 0 } }"#);
        assert!(matches!(err, Err(DecoderError::InvalidConfig(_))));

        let err = DecoderConfig::from_json_str("not json");
        assert!(matches!(err, Err(DecoderError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_thresholds() {
        let mut config = DecoderConfig::default();
        config.pts.tolerance_ticks = config.pts.discontinuity_threshold_ticks;
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.mix.mixing_level = 40;
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.resample.delta_frames = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mix_gains() {
        let mut mix = MixConfig::default();
        assert_eq!(mix.associated_gain(), 0.5);
        assert_eq!(mix.main_gain(), 0.5);

        mix.mixing_level = 32;
        assert_eq!(mix.associated_gain(), 1.0);
        assert_eq!(mix.main_gain(), 0.0);

        mix.mixing_level = -32;
        assert_eq!(mix.associated_gain(), 0.0);

        mix.prefill_ms = 100;
        assert_eq!(mix.prefill_bytes(), 19_200);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = DecoderConfig::pcr_master();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DecoderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
