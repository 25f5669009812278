//! # Output Stage
//!
//! Consumer side of the PCM ring, pulled by the audio device.
//!
//! Each pull reads whole frames from the ring, then applies in order:
//!
//! 1. Clock-drift resampling (program-clock master only, s16 only)
//! 2. Pre-gain
//! 3. Left/right mono fold-down
//! 4. Pre-mute (zero fill)
//!
//! Bytes taken from the ring are credited to the PTS tracker's
//! "played since last valid PTS" counter.

use crate::config::{OutputConfig, ResampleConfig, SyncMode};
use crate::context::StreamStatus;
use crate::mixer;
use crate::resampler::ClockDriftResampler;
use crate::ring::OutputRing;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub struct OutputStage {
    ring: Arc<OutputRing>,
    status: Arc<StreamStatus>,
    config: OutputConfig,
    resample: Option<ResampleConfig>,
    delta: Arc<AtomicI32>,
    muted: AtomicBool,
    scratch: Vec<u8>,
}

impl OutputStage {
    /// `delta` is the resampler control shared with the PTS tracker.
    pub fn new(
        ring: Arc<OutputRing>,
        status: Arc<StreamStatus>,
        config: OutputConfig,
        sync_mode: SyncMode,
        resample: ResampleConfig,
        delta: Arc<AtomicI32>,
    ) -> Self {
        let resample = (sync_mode == SyncMode::PcrMaster && resample.enabled).then_some(resample);
        let muted = AtomicBool::new(config.pre_mute);
        Self {
            ring,
            status,
            config,
            resample,
            delta,
            muted,
            scratch: Vec::new(),
        }
    }

    pub fn set_pre_mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    pub fn set_mono_downmix(&mut self, enabled: bool) {
        self.config.mono_downmix = enabled;
    }

    /// Decoded bytes waiting in the ring.
    pub fn available(&self) -> usize {
        self.ring.level()
    }

    /// Wait up to `timeout` for one frame of PCM.
    pub fn wait_for_pcm(&self, timeout: Duration) -> bool {
        let frame = self.status.format().frame_bytes().max(1);
        self.ring.wait_for_data(frame, timeout)
    }

    /// Fill `out` with processed PCM. Returns the bytes written, always a
    /// whole number of frames.
    pub fn read_pcm(&mut self, out: &mut [u8]) -> usize {
        let format = self.status.format();
        let frame = format.frame_bytes().max(1);
        let want_frames = out.len() / frame;
        if want_frames == 0 {
            return 0;
        }

        let delta = match &self.resample {
            Some(_) if format.bits_per_sample == 16 => self.delta.load(Ordering::Acquire),
            _ => 0,
        };

        let (taken, written) = match (&self.resample, delta) {
            (Some(resample), d) if d != 0 => {
                let resampler = ClockDriftResampler::new(format.channels, resample.frame_frames);
                let in_frames = resampler.input_frames_for(want_frames, d);
                self.scratch.resize(in_frames * frame, 0);
                let taken = self.ring.read_aligned(&mut self.scratch, frame);
                let resampled = resampler.process_bytes(&self.scratch[..taken], d);
                let written = resampled.len().min(out.len());
                out[..written].copy_from_slice(&resampled[..written]);
                (taken, written)
            }
            _ => {
                let taken = self.ring.read_aligned(&mut out[..want_frames * frame], frame);
                (taken, taken)
            }
        };
        if taken == 0 {
            return 0;
        }
        self.status.add_out_bytes(taken as u64);

        let pcm = &mut out[..written];
        if format.bits_per_sample == 16 {
            mixer::apply_gain(pcm, self.config.pre_gain);
            if self.config.mono_downmix && format.channels == 2 {
                mixer::downmix_to_mono(pcm);
            }
        }
        if self.muted.load(Ordering::Acquire) {
            pcm.fill(0);
        }

        trace!(taken, written, delta, "PCM pulled by output");
        written
    }
}

impl std::fmt::Debug for OutputStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStage")
            .field("available", &self.available())
            .field("resampling", &self.resample.is_some())
            .finish()
    }
}

/// Host-facing handle to the output side of a running decoder.
///
/// Empty before init and after stop; reads then return 0.
#[derive(Debug, Default)]
pub struct OutputPort {
    stage: Mutex<Option<OutputStage>>,
    raw: Mutex<Option<Arc<OutputRing>>>,
}

impl OutputPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, stage: OutputStage, raw: Option<Arc<OutputRing>>) {
        *self.stage.lock() = Some(stage);
        *self.raw.lock() = raw;
    }

    /// Drop the stage and rings; the decoder is releasing its buffers.
    pub fn detach(&self) {
        self.stage.lock().take();
        self.raw.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.stage.lock().is_some()
    }

    /// Decoded PCM bytes waiting to be read; 0 when detached.
    pub fn pcm_available(&self) -> usize {
        self.stage.lock().as_ref().map_or(0, OutputStage::available)
    }

    pub fn read_pcm(&self, out: &mut [u8]) -> usize {
        self.stage
            .lock()
            .as_mut()
            .map_or(0, |stage| stage.read_pcm(out))
    }

    /// Compressed passthrough bytes, when a raw ring is configured.
    pub fn read_raw(&self, out: &mut [u8]) -> usize {
        self.raw.lock().as_ref().map_or(0, |ring| ring.read(out))
    }

    pub fn set_pre_mute(&self, muted: bool) {
        if let Some(stage) = self.stage.lock().as_ref() {
            stage.set_pre_mute(muted);
        }
    }

    pub fn set_mono_downmix(&self, enabled: bool) {
        if let Some(stage) = self.stage.lock().as_mut() {
            stage.set_mono_downmix(enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CodecFormat;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn stage(config: OutputConfig, sync_mode: SyncMode) -> (OutputStage, Arc<OutputRing>, Arc<AtomicI32>) {
        let ring = Arc::new(OutputRing::try_new(64 * 1024).unwrap());
        let status = StreamStatus::shared(CodecFormat::Aac);
        let delta = Arc::new(AtomicI32::new(0));
        let stage = OutputStage::new(
            Arc::clone(&ring),
            status,
            config,
            sync_mode,
            ResampleConfig::default(),
            Arc::clone(&delta),
        );
        (stage, ring, delta)
    }

    #[test]
    fn test_reads_whole_frames_and_counts_bytes() {
        let (mut stage, ring, _) = stage(OutputConfig::default(), SyncMode::VideoMaster);
        ring.write(&pcm(&[1, 2, 3, 4, 5]));

        let mut out = [0u8; 64];
        assert_eq!(stage.read_pcm(&mut out), 8);
        assert_eq!(&out[..8], &pcm(&[1, 2, 3, 4])[..]);
        assert_eq!(stage.status.out_bytes_since_last_valid_pts(), 8);
        assert_eq!(ring.level(), 2);
    }

    #[test]
    fn test_empty_ring_reads_nothing() {
        let (mut stage, _, _) = stage(OutputConfig::default(), SyncMode::VideoMaster);
        let mut out = [0u8; 16];
        assert_eq!(stage.read_pcm(&mut out), 0);
        assert!(!stage.wait_for_pcm(Duration::from_millis(1)));
    }

    #[test]
    fn test_gain_downmix_and_mute() {
        let config = OutputConfig {
            pre_gain: 2.0,
            mono_downmix: true,
            ..OutputConfig::default()
        };
        let (mut stage, ring, _) = stage(config, SyncMode::VideoMaster);
        ring.write(&pcm(&[100, 300]));

        let mut out = [0u8; 4];
        assert_eq!(stage.read_pcm(&mut out), 4);
        assert_eq!(out.to_vec(), pcm(&[600, 600]));

        stage.set_pre_mute(true);
        ring.write(&pcm(&[100, 300]));
        assert_eq!(stage.read_pcm(&mut out), 4);
        assert_eq!(out, [0u8; 4]);
    }

    #[test]
    fn test_resampler_only_in_pcr_master() {
        let (mut stage, ring, delta) = stage(OutputConfig::default(), SyncMode::VideoMaster);
        delta.store(1, Ordering::Release);
        ring.write(&vec![0u8; 128 * 4]);
        let mut out = vec![0u8; 128 * 4];
        assert_eq!(stage.read_pcm(&mut out), 128 * 4);
    }

    #[test]
    fn test_pcr_master_downsamples() {
        let (mut stage, ring, delta) = stage(OutputConfig::default(), SyncMode::PcrMaster);
        delta.store(1, Ordering::Release);
        ring.write(&vec![0u8; 256 * 4]);

        let mut out = vec![0u8; 256 * 4];
        let written = stage.read_pcm(&mut out);

        // Two blocks fit: 256 frames in, 254 frames out.
        assert_eq!(written, 254 * 4);
        assert_eq!(ring.level(), 0);
        assert_eq!(stage.status.out_bytes_since_last_valid_pts(), 256 * 4);
    }

    #[test]
    fn test_pcr_master_upsamples_from_fewer_frames() {
        let (mut stage, ring, delta) = stage(OutputConfig::default(), SyncMode::PcrMaster);
        delta.store(-2, Ordering::Release);
        ring.write(&vec![0u8; 512 * 4]);

        let mut out = vec![0u8; 300 * 4];
        let written = stage.read_pcm(&mut out);

        assert_eq!(written, 260 * 4);
        assert_eq!(ring.level(), (512 - 256) * 4);
    }

    #[test]
    fn test_port_detach_releases_ring() {
        let (stage, ring, _) = stage(OutputConfig::default(), SyncMode::VideoMaster);
        let raw = Arc::new(OutputRing::try_new(16).unwrap());
        raw.write(&[9, 9]);
        ring.write(&pcm(&[1, 2]));

        let port = OutputPort::new();
        port.attach(stage, Some(Arc::clone(&raw)));
        let mut out = [0u8; 8];
        assert_eq!(port.read_raw(&mut out), 2);
        assert_eq!(port.read_pcm(&mut out), 4);

        port.detach();
        assert!(!port.is_attached());
        assert_eq!(port.read_pcm(&mut out), 0);
        assert_eq!(Arc::strong_count(&ring), 1);
    }
}
