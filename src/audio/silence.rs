//! Silence detection and shortening
//!
//! A window of `min_silence_ms` slides over the buffer in 1 ms steps; every
//! window whose RMS level is below the threshold is silent, and overlapping
//! silent windows merge into one silent range.

use crate::audio::types::AudioBuffer;

/// Parameters of the silence split
#[derive(Debug, Clone, Copy)]
pub struct SilenceSettings {
    pub min_silence_ms: u32,
    pub threshold_db: f32,
    /// Padding kept at each edge of a non-silent chunk
    pub keep_silence_ms: u32,
}

/// Silent frame ranges `[start, end)`, ordered and non-overlapping
pub fn detect_silence(buffer: &AudioBuffer, min_silence_ms: u32, threshold_db: f32) -> Vec<(usize, usize)> {
    let frames = buffer.frames();
    let window = buffer.ms_to_frames(min_silence_ms).max(1);
    if frames < window {
        return Vec::new();
    }

    // Prefix sums of per-frame energy, summed over channels
    let channels = buffer.channels as usize;
    let mut prefix = Vec::with_capacity(frames + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for frame in buffer.samples.chunks(channels) {
        acc += frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
        prefix.push(acc);
    }

    let limit = 10f64.powf(threshold_db as f64 / 10.0);
    let samples_per_window = (window * channels) as f64;
    let step = buffer.ms_to_frames(1).max(1);

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    loop {
        let end = start + window;
        let mean_square = (prefix[end] - prefix[start]) / samples_per_window;
        if mean_square < limit {
            match ranges.last_mut() {
                Some(last) if start <= last.1 => last.1 = end,
                _ => ranges.push((start, end)),
            }
        }

        if end == frames {
            break;
        }
        start = (start + step).min(frames - window);
    }
    ranges
}

/// Non-silent frame ranges, the complement of [`detect_silence`]
pub fn detect_nonsilent(buffer: &AudioBuffer, min_silence_ms: u32, threshold_db: f32) -> Vec<(usize, usize)> {
    let frames = buffer.frames();
    let mut ranges = Vec::new();
    let mut cursor = 0;
    for (start, end) in detect_silence(buffer, min_silence_ms, threshold_db) {
        if start > cursor {
            ranges.push((cursor, start));
        }
        cursor = end;
    }
    if cursor < frames {
        ranges.push((cursor, frames));
    }
    ranges
}

/// Split on silence and rejoin the chunks with shortened gaps
///
/// Each non-silent chunk keeps `keep_silence_ms` of padding on both sides;
/// overlapping padded chunks merge. Between consecutive chunks,
/// `retention_ratio` of the removed gap is re-inserted as digital silence.
/// Leading and trailing silence is dropped. The result is never longer than
/// the input and shrinks monotonically as the ratio decreases. Without any
/// non-silent chunk the input is returned unchanged.
pub fn shorten_silence(buffer: &AudioBuffer, settings: &SilenceSettings, retention_ratio: f32) -> AudioBuffer {
    let frames = buffer.frames();
    let keep = buffer.ms_to_frames(settings.keep_silence_ms);

    let mut chunks: Vec<(usize, usize)> = Vec::new();
    for (start, end) in detect_nonsilent(buffer, settings.min_silence_ms, settings.threshold_db) {
        let padded = (start.saturating_sub(keep), (end + keep).min(frames));
        match chunks.last_mut() {
            Some(last) if padded.0 <= last.1 => last.1 = last.1.max(padded.1),
            _ => chunks.push(padded),
        }
    }

    if chunks.is_empty() {
        return buffer.clone();
    }

    let ratio = retention_ratio.clamp(0.0, 1.0) as f64;
    let mut output = AudioBuffer::new(Vec::with_capacity(buffer.samples.len()), buffer.sample_rate, buffer.channels);
    for (i, &(start, end)) in chunks.iter().enumerate() {
        if i > 0 {
            let gap = start - chunks[i - 1].1;
            output.push_silence((gap as f64 * ratio).floor() as usize);
        }
        output.extend_frames(buffer, start, end);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    /// 1 kHz test signal: loud for `on` ms, silent for `off` ms, repeated
    fn bursts(pattern: &[(usize, usize)]) -> AudioBuffer {
        let mut samples = Vec::new();
        for &(on, off) in pattern {
            samples.extend((0..on).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }));
            samples.extend(std::iter::repeat(0.0).take(off));
        }
        AudioBuffer::new(samples, RATE, 1)
    }

    fn settings() -> SilenceSettings {
        SilenceSettings {
            min_silence_ms: 500,
            threshold_db: -50.0,
            keep_silence_ms: 100,
        }
    }

    #[test]
    fn test_detects_long_gaps_only() {
        let buffer = bursts(&[(1000, 200), (1000, 1000), (500, 0)]);
        let silent = detect_silence(&buffer, 500, -50.0);
        assert_eq!(silent, vec![(2200, 3200)]);

        let loud = detect_nonsilent(&buffer, 500, -50.0);
        assert_eq!(loud, vec![(0, 2200), (3200, 3700)]);
    }

    #[test]
    fn test_shortened_gap_length() {
        let buffer = bursts(&[(1000, 1000), (1000, 0)]);
        let out = shorten_silence(&buffer, &settings(), 0.5);
        // Chunks padded by 100 ms leave an 800 ms gap, half of it retained
        assert_eq!(out.frames(), 1100 + 400 + 1100);
    }

    #[test]
    fn test_output_never_longer_and_monotone_in_ratio() {
        let buffer = bursts(&[(300, 50), (700, 900), (400, 2000), (800, 600), (200, 1500)]);
        let mut previous = 0;
        for step in 0..=10 {
            let ratio = step as f32 / 10.0;
            let out = shorten_silence(&buffer, &settings(), ratio);
            assert!(out.frames() <= buffer.frames());
            assert!(out.frames() >= previous, "ratio {} shrank the output", ratio);
            previous = out.frames();
        }
    }

    #[test]
    fn test_all_silent_input_is_unchanged() {
        let buffer = AudioBuffer::silent(3000, RATE, 2);
        assert_eq!(shorten_silence(&buffer, &settings(), 0.0), buffer);
    }

    #[test]
    fn test_short_input_is_never_silent() {
        let buffer = AudioBuffer::silent(100, RATE, 1);
        assert!(detect_silence(&buffer, 500, -50.0).is_empty());
    }
}
