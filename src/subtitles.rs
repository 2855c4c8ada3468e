//! Subtitle tracks: SRT loading/saving and time-based lookup
//!
//! Tracks are either supplied as an SRT file or produced by a [`Transcriber`]
//! (for example a speech-to-text model) and written out with
//! [`SubtitleTrack::save_srt`].

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{ConfigError, Result};

/// One timed subtitle line
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    /// Seconds
    pub start: f64,
    /// Seconds, inclusive
    pub end: f64,
    pub text: String,
}

/// Produces subtitles for a media file
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, media: &Path) -> Result<SubtitleTrack>;
}

/// Immutable, start-ordered list of cues
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    pub fn from_cues(mut cues: Vec<SubtitleCue>) -> Self {
        cues.retain(|cue| cue.end >= cue.start && !cue.text.trim().is_empty());
        cues.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { cues }
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// The active cue at `seconds` (`start <= t <= end`), with its position.
    ///
    /// When cues overlap, the one that started most recently wins.
    pub fn cue_at(&self, seconds: f64) -> Option<(usize, &SubtitleCue)> {
        let started = self.cues.partition_point(|cue| cue.start <= seconds);
        self.cues[..started]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, cue)| cue.end >= seconds)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::parse_srt(&content).map_err(|reason| {
            ConfigError::ParseFailed {
                path: path.display().to_string(),
                reason,
            }
            .into()
        })
    }

    /// Parse SRT text; blocks are separated by blank lines
    pub fn parse_srt(content: &str) -> std::result::Result<Self, String> {
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let mut cues = Vec::new();

        for block in content.split("\n\n") {
            let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
            if lines.is_empty() {
                continue;
            }

            let timing_line = lines
                .iter()
                .position(|l| l.contains("-->"))
                .ok_or_else(|| format!("missing timing line in block: {:?}", lines[0]))?;
            let (start, end) = lines[timing_line]
                .split_once("-->")
                .ok_or_else(|| "malformed timing line".to_string())?;

            cues.push(SubtitleCue {
                start: parse_timestamp(start.trim())?,
                end: parse_timestamp(end.trim())?,
                text: lines[timing_line + 1..].join("\n"),
            });
        }

        Ok(Self::from_cues(cues))
    }

    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, cue) in self.cues.iter().enumerate() {
            let _ = write!(
                out,
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                cue.text
            );
        }
        out
    }

    pub fn save_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_srt())?;
        Ok(())
    }
}

/// `HH:MM:SS,mmm` (a `.` separator is also accepted)
fn parse_timestamp(value: &str) -> std::result::Result<f64, String> {
    let bad = || format!("bad timestamp: {:?}", value);
    let value = value.split_whitespace().next().ok_or_else(bad)?;
    let (hms, millis) = value
        .split_once(',')
        .or_else(|| value.split_once('.'))
        .unwrap_or((value, "0"));

    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return Err(bad());
    }
    let hours: u64 = parts[0].parse().map_err(|_| bad())?;
    let minutes: u64 = parts[1].parse().map_err(|_| bad())?;
    let seconds: u64 = parts[2].parse().map_err(|_| bad())?;
    let millis: u64 = millis.parse().map_err(|_| bad())?;

    Ok((hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0)
}

/// Format seconds as an SRT timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, millis) = (rest / 1000, rest % 1000);
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
