use rand::{rngs::SmallRng, SeedableRng};
use tracing::{debug, info, warn};

use crate::audio::fingerprint::{add_subliminal_noise, insert_micro_silences, pitch_shift, roll_semitones};
use crate::audio::mix::mix_bgm;
use crate::audio::silence::{shorten_silence, SilenceSettings};
use crate::audio::types::AudioBuffer;
use crate::config::AudioConfig;
use crate::error::Result;

/// Offset separating the audio random stream from per-frame streams
const AUDIO_STREAM: u64 = 0xA0D1_0000_0000_0001;

/// Sequential audio stages: silence shortening, fingerprint disruption,
/// background music, then conversion to the output sample rate.
///
/// Tempo follows the video speed factor and is applied by the encoder.
pub struct AudioPipeline {
    config: AudioConfig,
    bgm: Option<AudioBuffer>,
    seed: u64,
}

impl AudioPipeline {
    pub fn new(config: &AudioConfig, seed: u64) -> Self {
        Self {
            config: config.clone(),
            bgm: None,
            seed,
        }
    }

    /// Attach the decoded background track; `None` disables mixing
    pub fn with_bgm(mut self, bgm: Option<AudioBuffer>) -> Self {
        self.bgm = bgm;
        self
    }

    /// Run every enabled stage over `input`
    ///
    /// A failing stage is logged and skipped, passing its input through.
    pub fn process(&self, input: AudioBuffer) -> AudioBuffer {
        let mut rng = SmallRng::seed_from_u64(self.seed ^ AUDIO_STREAM);
        let original = input.duration();
        let mut buffer = input;

        if self.config.silence_removal_enabled {
            let settings = SilenceSettings {
                min_silence_ms: self.config.min_silence_ms,
                threshold_db: self.config.silence_threshold_db,
                keep_silence_ms: self.config.keep_silence_ms,
            };
            buffer = run_stage("silence_removal", buffer, |b| {
                Ok(shorten_silence(b, &settings, self.config.retention_ratio))
            });
        }

        if self.config.fingerprint_enabled {
            if self.config.pitch_semitones > 0.0 {
                let semitones = roll_semitones(self.config.pitch_semitones, &mut rng);
                debug!("Pitch shift {:+.2} semitones", semitones);
                buffer = run_stage("pitch_shift", buffer, |b| pitch_shift(b, semitones));
            }
            if self.config.subliminal_noise {
                let volume = self.config.subliminal_volume;
                buffer = run_stage("subliminal_noise", buffer, |b| {
                    add_subliminal_noise(b, volume, &mut rng)
                });
            }
            if self.config.random_silence {
                let (silence, spacing) = (
                    self.config.micro_silence_ms,
                    self.config.micro_silence_spacing_ms,
                );
                buffer = run_stage("micro_silence", buffer, |b| {
                    insert_micro_silences(b, silence, spacing, &mut rng)
                });
            }
        }

        if self.config.bgm_enabled {
            match &self.bgm {
                Some(bgm) => {
                    buffer = run_stage("bgm_mix", buffer, |b| mix_bgm(b, bgm, self.config.bgm_volume));
                }
                None => debug!("No background track loaded, mixing skipped"),
            }
        }

        if buffer.sample_rate != self.config.output_sample_rate {
            buffer = buffer.resample_linear(self.config.output_sample_rate);
        }

        info!(
            "Audio processed: {:.2}s -> {:.2}s at {} Hz",
            original,
            buffer.duration(),
            buffer.sample_rate
        );
        buffer
    }
}

fn run_stage<F>(name: &str, input: AudioBuffer, stage: F) -> AudioBuffer
where
    F: FnOnce(&AudioBuffer) -> Result<AudioBuffer>,
{
    match stage(&input) {
        Ok(output) => {
            debug!("Audio stage {}: {} -> {} frames", name, input.frames(), output.frames());
            output
        }
        Err(e) => {
            warn!("Audio stage {} skipped: {}", name, e);
            input
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;

    fn speech_like(rate: u32) -> AudioBuffer {
        // 1 s tone, 2 s silence, 1 s tone
        let mut samples = Vec::new();
        samples.extend((0..rate).map(|i| (i as f32 * 0.3).sin() * 0.5));
        samples.extend(std::iter::repeat(0.0).take(2 * rate as usize));
        samples.extend((0..rate).map(|i| (i as f32 * 0.3).sin() * 0.5));
        AudioBuffer::new(samples, rate, 1)
    }

    fn quiet_config() -> AudioConfig {
        AudioConfig {
            output_sample_rate: 8000,
            ..AudioConfig::default()
        }
    }

    #[test]
    fn test_disabled_pipeline_is_passthrough() {
        let input = speech_like(8000);
        let out = AudioPipeline::new(&quiet_config(), 1).process(input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn test_output_rate_conversion() {
        let input = speech_like(16000);
        let out = AudioPipeline::new(&quiet_config(), 1).process(input);
        assert_eq!(out.sample_rate, 8000);
        assert_eq!(out.frames(), 32000);
    }

    #[test]
    fn test_silence_removal_shortens() {
        let config = AudioConfig {
            silence_removal_enabled: true,
            retention_ratio: 0.25,
            ..quiet_config()
        };
        let input = speech_like(8000);
        let out = AudioPipeline::new(&config, 1).process(input.clone());
        assert!(out.duration() < input.duration());
        assert!(out.duration() > 2.0);
    }

    #[test]
    fn test_fingerprint_is_deterministic_per_seed() {
        let config = AudioConfig {
            fingerprint_enabled: true,
            micro_silence_spacing_ms: (500, 1000),
            ..quiet_config()
        };
        let input = speech_like(8000);
        let a = AudioPipeline::new(&config, 42).process(input.clone());
        let b = AudioPipeline::new(&config, 42).process(input.clone());
        assert_eq!(a, b);
        assert_ne!(a, input);
    }

    #[test]
    fn test_missing_bgm_disables_mixing() {
        let config = AudioConfig {
            bgm_enabled: true,
            ..quiet_config()
        };
        let input = speech_like(8000);
        let out = AudioPipeline::new(&config, 1).with_bgm(None).process(input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn test_bgm_is_mixed_under_voice() {
        let config = AudioConfig {
            bgm_enabled: true,
            bgm_volume: 0.5,
            ..quiet_config()
        };
        let input = AudioBuffer::silent(8000, 8000, 1);
        let bgm = AudioBuffer::new(vec![0.4; 100], 8000, 1);
        let out = AudioPipeline::new(&config, 1).with_bgm(Some(bgm)).process(input);
        assert!(out.samples.iter().all(|&s| (s - 0.2).abs() < 1e-5));
    }

    #[test]
    fn test_failing_stage_passes_input_through() {
        let input = speech_like(8000);
        let out = run_stage("broken", input.clone(), |_| {
            Err(AudioError::StageFailed {
                stage: "broken".to_string(),
                reason: "test".to_string(),
            }
            .into())
        });
        assert_eq!(out, input);
    }
}
