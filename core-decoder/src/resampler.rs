//! # Clock-Drift Resampler
//!
//! Nudges the PCM output rate so audio can chase the program clock.
//!
//! Input is processed in blocks of `frame_frames` interleaved frames. A
//! positive `delta` turns each block into `frame_frames - delta` frames, a
//! negative one into `frame_frames + |delta|`, by linear interpolation
//! between neighbouring input frames. Block edges are kept exactly: the
//! first and last frame of each block are copied through.
//!
//! Trailing frames that do not fill a block are copied unchanged, as is any
//! buffer shorter than one block.

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDriftResampler {
    channels: usize,
    frame_frames: usize,
}

impl ClockDriftResampler {
    pub fn new(channels: u16, frame_frames: usize) -> Self {
        Self {
            channels: (channels as usize).max(1),
            frame_frames: frame_frames.max(2),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame_frames(&self) -> usize {
        self.frame_frames
    }

    /// Delta actually applied; keeps at least one output frame per block.
    fn effective_delta(&self, delta: i32) -> i64 {
        let max = self.frame_frames as i64 - 1;
        (delta as i64).clamp(-max, max)
    }

    /// Output frames per input block for `delta`.
    pub fn block_output_frames(&self, delta: i32) -> usize {
        (self.frame_frames as i64 - self.effective_delta(delta)) as usize
    }

    /// Frames produced from `input_frames` frames of input.
    pub fn output_frames(&self, input_frames: usize, delta: i32) -> usize {
        if delta == 0 || input_frames < self.frame_frames {
            return input_frames;
        }
        let blocks = input_frames / self.frame_frames;
        let rest = input_frames % self.frame_frames;
        blocks * self.block_output_frames(delta) + rest
    }

    /// Input frames to read so the output fits in `output_frames`.
    ///
    /// Whole blocks only; returns `output_frames` when no block fits.
    pub fn input_frames_for(&self, output_frames: usize, delta: i32) -> usize {
        if delta == 0 {
            return output_frames;
        }
        let blocks = output_frames / self.block_output_frames(delta);
        if blocks == 0 {
            return output_frames;
        }
        blocks * self.frame_frames
    }

    /// Resample interleaved samples, appending to `out`.
    pub fn process(&self, input: &[i16], delta: i32, out: &mut Vec<i16>) {
        let block_samples = self.frame_frames * self.channels;
        if delta == 0 || input.len() < block_samples {
            out.extend_from_slice(input);
            return;
        }

        let out_frames = self.block_output_frames(delta);
        let mut blocks = input.chunks_exact(block_samples);
        for block in &mut blocks {
            self.interpolate_block(block, out_frames, out);
        }
        out.extend_from_slice(blocks.remainder());
        trace!(
            input = input.len() / self.channels,
            output = out.len() / self.channels,
            delta,
            "Resampled"
        );
    }

    fn interpolate_block(&self, block: &[i16], out_frames: usize, out: &mut Vec<i16>) {
        let in_span = (self.frame_frames - 1) as i64;
        let out_span = out_frames.saturating_sub(1).max(1) as i64;
        for j in 0..out_frames as i64 {
            let position = j * in_span;
            let index = (position / out_span) as usize;
            let frac = position % out_span;
            let next = (index + 1).min(self.frame_frames - 1);
            for ch in 0..self.channels {
                let a = block[index * self.channels + ch] as i64;
                let b = block[next * self.channels + ch] as i64;
                let value = a + (b - a) * frac / out_span;
                out.push(value.clamp(i16::MIN as i64, i16::MAX as i64) as i16);
            }
        }
    }

    /// [`ClockDriftResampler::process`] over signed 16-bit little-endian bytes.
    pub fn process_bytes(&self, input: &[u8], delta: i32) -> Vec<u8> {
        let samples: Vec<i16> = input
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let mut resampled = Vec::with_capacity(samples.len() + self.frame_frames * self.channels);
        self.process(&samples, delta, &mut resampled);
        resampled.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_downsample_length() {
        let resampler = ClockDriftResampler::new(2, 128);
        let input = vec![0i16; 128 * 3 * 2];
        let mut out = Vec::new();
        resampler.process(&input, 1, &mut out);
        assert_eq!(out.len(), 127 * 3 * 2);
    }

    #[test]
    fn test_upsample_length() {
        let resampler = ClockDriftResampler::new(2, 128);
        let input = vec![0i16; 128 * 2 * 2];
        let mut out = Vec::new();
        resampler.process(&input, -3, &mut out);
        assert_eq!(out.len(), 131 * 2 * 2);
    }

    #[test]
    fn test_short_buffer_copied() {
        let resampler = ClockDriftResampler::new(2, 128);
        let input: Vec<i16> = (0..100).collect();
        let mut out = Vec::new();
        resampler.process(&input, 2, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_zero_delta_is_identity() {
        let resampler = ClockDriftResampler::new(1, 4);
        let input: Vec<i16> = (0..16).collect();
        let mut out = Vec::new();
        resampler.process(&input, 0, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_interpolates_ramp() {
        // 0, 30, 60, 90 resampled to 3 frames keeps the endpoints.
        let resampler = ClockDriftResampler::new(1, 4);
        let mut out = Vec::new();
        resampler.process(&[0, 30, 60, 90], 1, &mut out);
        assert_eq!(out, vec![0, 45, 90]);

        let mut up = Vec::new();
        resampler.process(&[0, 30, 60, 90], -2, &mut up);
        assert_eq!(up, vec![0, 18, 36, 54, 72, 90]);
    }

    #[test]
    fn test_channels_stay_interleaved() {
        let resampler = ClockDriftResampler::new(2, 4);
        let input = [100, -100, 100, -100, 100, -100, 100, -100];
        let mut out = Vec::new();
        resampler.process(&input, 1, &mut out);
        assert_eq!(out, vec![100, -100, 100, -100, 100, -100]);
    }

    #[test]
    fn test_remainder_copied_after_blocks() {
        let resampler = ClockDriftResampler::new(1, 4);
        let mut out = Vec::new();
        resampler.process(&[0, 0, 0, 0, 7, 8], 1, &mut out);
        assert_eq!(out, vec![0, 0, 0, 7, 8]);
        assert_eq!(resampler.output_frames(6, 1), 5);
    }

    #[test]
    fn test_input_frames_for() {
        let resampler = ClockDriftResampler::new(2, 128);
        assert_eq!(resampler.input_frames_for(1024, 1), 8 * 128);
        assert_eq!(resampler.input_frames_for(1024, -4), 7 * 128);
        assert_eq!(resampler.input_frames_for(100, 1), 100);
        assert_eq!(resampler.input_frames_for(1024, 0), 1024);
    }

    #[test]
    fn test_process_bytes() {
        let resampler = ClockDriftResampler::new(1, 4);
        let input: Vec<u8> = [0i16, 30, 60, 90]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let out = resampler.process_bytes(&input, 1);
        assert_eq!(out.len(), 6);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 45);
    }

    #[test]
    fn test_randomized_length_invariant() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let channels = rng.gen_range(1..=6u16);
            let blocks = rng.gen_range(1..=8usize);
            let delta = rng.gen_range(-9..=9i32);
            let resampler = ClockDriftResampler::new(channels, 128);

            let input: Vec<i16> = (0..128 * blocks * channels as usize)
                .map(|_| rng.gen())
                .collect();
            let mut out = Vec::new();
            resampler.process(&input, delta, &mut out);

            let expected_frames = (128 - delta as i64) as usize * blocks;
            assert_eq!(out.len(), expected_frames * channels as usize);
            assert_eq!(out.len() % channels as usize, 0);
        }
    }
}
