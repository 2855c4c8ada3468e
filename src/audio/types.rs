/// Decoded PCM audio, interleaved `f32` samples in `[-1, 1]`
///
/// Every audio stage consumes one buffer and returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Digital silence of the given length
    pub fn silent(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels.max(1) as usize], sample_rate, channels)
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Number of frames covering `ms` milliseconds
    pub fn ms_to_frames(&self, ms: u32) -> usize {
        (ms as u64 * self.sample_rate as u64 / 1000) as usize
    }

    /// Copy of the frames in `start..end`
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let channels = self.channels as usize;
        let end = end.min(self.frames());
        let start = start.min(end);
        Self::new(
            self.samples[start * channels..end * channels].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Append frames of `other`, which must share the channel layout
    pub fn extend_frames(&mut self, other: &AudioBuffer, start: usize, end: usize) {
        let channels = self.channels as usize;
        let end = end.min(other.frames());
        let start = start.min(end);
        self.samples
            .extend_from_slice(&other.samples[start * channels..end * channels]);
    }

    pub fn push_silence(&mut self, frames: usize) {
        let len = self.samples.len() + frames * self.channels as usize;
        self.samples.resize(len, 0.0);
    }

    /// Get mono mix of all channels
    pub fn mono_samples(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(self.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }

    /// Remap to `channels` channels: mono is duplicated, anything else is
    /// down-mixed to mono first
    pub fn with_channels(&self, channels: u16) -> AudioBuffer {
        let channels = channels.max(1);
        if channels == self.channels {
            return self.clone();
        }
        let mono = self.mono_samples();
        let samples = mono
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
            .collect();
        Self::new(samples, self.sample_rate, channels)
    }

    /// Linear-interpolation resample to `target_rate`
    pub fn resample_linear(&self, target_rate: u32) -> AudioBuffer {
        if target_rate == self.sample_rate || self.is_empty() || self.sample_rate == 0 {
            return Self::new(self.samples.clone(), target_rate.max(1), self.channels);
        }

        let channels = self.channels as usize;
        let in_frames = self.frames();
        let out_frames =
            ((in_frames as u64 * target_rate as u64) / self.sample_rate as u64).max(1) as usize;
        let step = self.sample_rate as f64 / target_rate as f64;

        let mut samples = Vec::with_capacity(out_frames * channels);
        for i in 0..out_frames {
            let pos = i as f64 * step;
            let i0 = (pos.floor() as usize).min(in_frames - 1);
            let i1 = (i0 + 1).min(in_frames - 1);
            let t = (pos - i0 as f64) as f32;
            for c in 0..channels {
                let a = self.samples[i0 * channels + c];
                let b = self.samples[i1 * channels + c];
                samples.push(a + (b - a) * t);
            }
        }
        Self::new(samples, target_rate, self.channels)
    }

    /// Mean of squared samples over frames `start..end`, all channels
    pub fn mean_square(&self, start: usize, end: usize) -> f64 {
        let channels = self.channels as usize;
        let slice = &self.samples[start * channels..end * channels];
        if slice.is_empty() {
            return 0.0;
        }
        slice.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / slice.len() as f64
    }

    /// Clamp every sample into `[-1, 1]`
    pub fn clip(&mut self) {
        for sample in &mut self.samples {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// Loudness of an RMS amplitude relative to full scale
pub fn amplitude_to_dbfs(rms: f64) -> f64 {
    if rms <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

/// Linear gain for a level in decibels
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let buffer = AudioBuffer::silent(22050, 44100, 2);
        assert_eq!(buffer.frames(), 22050);
        assert_eq!(buffer.samples.len(), 44100);
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
        assert_eq!(buffer.ms_to_frames(100), 4410);
    }

    #[test]
    fn test_slice_and_extend() {
        let buffer = AudioBuffer::new((0..10).map(|i| i as f32).collect(), 10, 2);
        let slice = buffer.slice_frames(1, 3);
        assert_eq!(slice.samples, vec![2.0, 3.0, 4.0, 5.0]);

        let mut out = AudioBuffer::new(Vec::new(), 10, 2);
        out.extend_frames(&buffer, 4, 99);
        out.push_silence(1);
        assert_eq!(out.samples, vec![8.0, 9.0, 0.0, 0.0]);
    }

    #[test]
    fn test_channel_remap() {
        let stereo = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 8000, 2);
        let mono = stereo.with_channels(1);
        assert_eq!(mono.samples, vec![0.5, 0.5]);
        let back = mono.with_channels(2);
        assert_eq!(back.samples, vec![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_resample_changes_length_proportionally() {
        let buffer = AudioBuffer::new((0..1000).map(|i| (i as f32 / 1000.0)).collect(), 1000, 1);
        let up = buffer.resample_linear(2000);
        assert_eq!(up.frames(), 2000);
        assert_eq!(up.sample_rate, 2000);
        // Midpoints are interpolated
        assert!((up.samples[1] - 0.0005).abs() < 1e-6);

        let down = buffer.resample_linear(500);
        assert_eq!(down.frames(), 500);
    }

    #[test]
    fn test_decibel_helpers() {
        assert!((amplitude_to_dbfs(1.0)).abs() < 1e-12);
        assert!((amplitude_to_dbfs(0.1) + 20.0).abs() < 1e-9);
        assert_eq!(amplitude_to_dbfs(0.0), f64::NEG_INFINITY);
        assert!((db_to_gain(-60.0) - 0.001).abs() < 1e-12);
    }
}
