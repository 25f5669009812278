//! Sample-level helpers for interleaved signed 16-bit little-endian PCM.

#[inline]
fn sample_at(buf: &[u8], index: usize) -> i16 {
    i16::from_le_bytes([buf[2 * index], buf[2 * index + 1]])
}

#[inline]
fn put_sample(buf: &mut [u8], index: usize, value: i32) {
    let clamped = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    buf[2 * index..2 * index + 2].copy_from_slice(&clamped.to_le_bytes());
}

/// Scale every sample by `gain`, saturating.
pub fn apply_gain(pcm: &mut [u8], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for i in 0..pcm.len() / 2 {
        let scaled = (sample_at(pcm, i) as f32 * gain).round() as i32;
        put_sample(pcm, i, scaled);
    }
}

/// Duplicate each mono sample into a stereo frame.
pub fn upmix_mono_to_stereo(mono: &[u8]) -> Vec<u8> {
    let mut stereo = Vec::with_capacity(mono.len() * 2);
    for pair in mono.chunks_exact(2) {
        stereo.extend_from_slice(pair);
        stereo.extend_from_slice(pair);
    }
    stereo
}

/// `main = main * main_gain + associated * associated_gain`, saturating.
///
/// Samples of `main` beyond the end of `associated` are only scaled.
pub fn mix_into(main: &mut [u8], associated: &[u8], main_gain: f32, associated_gain: f32) {
    let shared = associated.len().min(main.len()) / 2;
    for i in 0..main.len() / 2 {
        let mut value = sample_at(main, i) as f32 * main_gain;
        if i < shared {
            value += sample_at(associated, i) as f32 * associated_gain;
        }
        put_sample(main, i, value.round() as i32);
    }
}

/// Replace both channels of every stereo frame with `3/4 L + 3/4 R`.
pub fn downmix_to_mono(stereo: &mut [u8]) {
    for frame in 0..stereo.len() / 4 {
        let left = sample_at(stereo, 2 * frame) as i32;
        let right = sample_at(stereo, 2 * frame + 1) as i32;
        let folded = (left + right) * 3 / 4;
        put_sample(stereo, 2 * frame, folded);
        put_sample(stereo, 2 * frame + 1, folded);
    }
}
