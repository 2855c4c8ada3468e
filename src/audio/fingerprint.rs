//! Audio fingerprint perturbation stages
//!
//! Each stage returns a new buffer; a stage error is recoverable and the
//! caller keeps the stage input.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::audio::types::AudioBuffer;
use crate::error::{AudioError, Result};

fn stage_failed(stage: &str, reason: impl Into<String>) -> AudioError {
    AudioError::StageFailed {
        stage: stage.to_string(),
        reason: reason.into(),
    }
}

/// Pitch offset of `max_semitones` with a random sign
pub fn roll_semitones<R: Rng>(max_semitones: f32, rng: &mut R) -> f32 {
    if rng.gen_bool(0.5) {
        max_semitones
    } else {
        -max_semitones
    }
}

/// Shift pitch by `semitones`
///
/// The samples are relabelled at `rate * 2^(semitones / 12)` and resampled
/// back to the original rate, so duration scales by the inverse factor.
pub fn pitch_shift(buffer: &AudioBuffer, semitones: f32) -> Result<AudioBuffer> {
    if buffer.sample_rate == 0 {
        return Err(stage_failed("pitch_shift", "sample rate is zero").into());
    }
    if semitones == 0.0 || buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let factor = 2f64.powf(semitones as f64 / 12.0);
    let relabelled_rate = (buffer.sample_rate as f64 * factor).round() as u32;
    if relabelled_rate == 0 {
        return Err(stage_failed("pitch_shift", format!("factor {:.4} too small", factor)).into());
    }

    let relabelled = AudioBuffer::new(buffer.samples.clone(), relabelled_rate, buffer.channels);
    Ok(relabelled.resample_linear(buffer.sample_rate))
}

/// Add low-level Gaussian noise, identical across the channels of a frame
pub fn add_subliminal_noise<R: Rng>(buffer: &AudioBuffer, volume: f32, rng: &mut R) -> Result<AudioBuffer> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(stage_failed("subliminal_noise", format!("volume {} out of range", volume)).into());
    }

    let mut output = buffer.clone();
    for frame in output.samples.chunks_mut(buffer.channels as usize) {
        let noise: f32 = rng.sample::<f32, _>(StandardNormal) * volume;
        for sample in frame {
            *sample = (*sample + noise).clamp(-1.0, 1.0);
        }
    }
    Ok(output)
}

/// Split into chunks of random length from `spacing_ms` and insert
/// `silence_ms` of digital silence after every chunk but the last
pub fn insert_micro_silences<R: Rng>(
    buffer: &AudioBuffer,
    silence_ms: u32,
    spacing_ms: (u32, u32),
    rng: &mut R,
) -> Result<AudioBuffer> {
    let (lo, hi) = spacing_ms;
    if lo == 0 || hi < lo {
        return Err(stage_failed("micro_silence", format!("invalid spacing {}-{}", lo, hi)).into());
    }

    let frames = buffer.frames();
    let gap = buffer.ms_to_frames(silence_ms);
    let mut output = AudioBuffer::new(
        Vec::with_capacity(buffer.samples.len()),
        buffer.sample_rate,
        buffer.channels,
    );

    let mut position = 0;
    while position < frames {
        let chunk = buffer.ms_to_frames(rng.gen_range(lo..=hi)).max(1);
        let end = (position + chunk).min(frames);
        output.extend_frames(buffer, position, end);
        if end < frames {
            output.push_silence(gap);
        }
        position = end;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn tone(frames: usize, rate: u32, channels: u16) -> AudioBuffer {
        let samples = (0..frames * channels as usize)
            .map(|i| ((i / channels as usize) as f32 * 0.01).sin() * 0.5)
            .collect();
        AudioBuffer::new(samples, rate, channels)
    }

    #[test]
    fn test_pitch_shift_scales_duration() {
        let input = tone(12000, 12000, 1);
        let up = pitch_shift(&input, 12.0).unwrap();
        assert_eq!(up.sample_rate, 12000);
        assert_eq!(up.frames(), 6000);

        let small = pitch_shift(&input, 0.3).unwrap();
        let expected = 12000.0 / 2f64.powf(0.3 / 12.0);
        assert!((small.frames() as f64 - expected).abs() < 2.0);
    }

    #[test]
    fn test_zero_shift_is_identity() {
        let input = tone(100, 8000, 2);
        assert_eq!(pitch_shift(&input, 0.0).unwrap(), input);
    }

    #[test]
    fn test_semitone_roll_keeps_magnitude() {
        let mut rng = SmallRng::seed_from_u64(9);
        let rolls: Vec<f32> = (0..32).map(|_| roll_semitones(0.3, &mut rng)).collect();
        assert!(rolls.iter().all(|s| (s.abs() - 0.3).abs() < 1e-6));
        assert!(rolls.iter().any(|&s| s > 0.0));
        assert!(rolls.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_noise_is_small_and_shared_across_channels() {
        let input = AudioBuffer::silent(4000, 8000, 2);
        let mut rng = SmallRng::seed_from_u64(1);
        let out = add_subliminal_noise(&input, 0.01, &mut rng).unwrap();

        assert_eq!(out.samples.len(), input.samples.len());
        assert!(out.samples.iter().any(|&s| s != 0.0));
        for frame in out.samples.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        let rms = (out.mean_square(0, out.frames())).sqrt();
        assert!(rms > 0.005 && rms < 0.02, "rms {}", rms);
    }

    #[test]
    fn test_noise_output_is_clipped() {
        let input = AudioBuffer::new(vec![1.0; 1000], 8000, 1);
        let mut rng = SmallRng::seed_from_u64(2);
        let out = add_subliminal_noise(&input, 0.1, &mut rng).unwrap();
        assert!(out.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_micro_silence_insertion() {
        let input = AudioBuffer::new(vec![0.25; 10_000], 1000, 1);
        let mut rng = SmallRng::seed_from_u64(3);
        let out = insert_micro_silences(&input, 20, (1000, 3000), &mut rng).unwrap();

        let inserted = out.frames() - input.frames();
        assert_eq!(inserted % 20, 0);
        let gaps = inserted / 20;
        // Chunks are 1-3 s long over a 10 s input
        assert!((3..=9).contains(&gaps), "gaps {}", gaps);

        let audible = out.samples.iter().filter(|&&s| s != 0.0).count();
        assert_eq!(audible, input.frames());
        assert_eq!(out.samples.last(), Some(&0.25));
    }

    #[test]
    fn test_micro_silence_short_input_unchanged() {
        let input = tone(500, 1000, 1);
        let mut rng = SmallRng::seed_from_u64(4);
        let out = insert_micro_silences(&input, 20, (1000, 2000), &mut rng).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_invalid_spacing_is_an_error() {
        let input = tone(500, 1000, 1);
        let mut rng = SmallRng::seed_from_u64(5);
        assert!(insert_micro_silences(&input, 20, (0, 10), &mut rng).is_err());
    }
}
