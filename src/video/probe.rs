use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ToolchainConfig,
    error::{EncodeError, Result, SourceError},
    video::types::VideoInfo,
};

/// Explicit locations of the ffmpeg/ffprobe executables
///
/// Every subprocess is started from these paths; the process environment is
/// never modified to find them.
#[derive(Debug, Clone)]
pub struct MediaToolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl MediaToolchain {
    pub fn new(config: &ToolchainConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        }
    }

    /// `ffmpeg` with quiet logging and stdin detached
    pub fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd
    }

    /// Check that both tools can be executed
    pub fn check_available(&self) -> Result<()> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            let ok = Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !ok {
                return Err(EncodeError::ToolMissing {
                    tool: tool.display().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Read stream properties of a media file with ffprobe
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> Result<VideoInfo> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SourceError::OpenFailed {
                path: path.display().to_string(),
            }
            .into());
        }

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|_| EncodeError::ToolMissing {
                tool: self.ffprobe.display().to_string(),
            })?;

        if !output.status.success() {
            return Err(SourceError::ProbeFailed {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout), path)?;
        debug!(
            "Probed {:?}: {}x{} @ {:.3} fps, {:.2}s, {} frames, audio: {}",
            path, info.width, info.height, info.fps, info.duration, info.frame_count, info.has_audio
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Turn ffprobe's JSON report into [`VideoInfo`]
pub fn parse_probe_output(json: &str, path: &Path) -> Result<VideoInfo> {
    let failed = |reason: String| SourceError::ProbeFailed {
        path: path.display().to_string(),
        reason,
    };
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| failed(e.to_string()))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| SourceError::NoVideoStream {
            path: path.display().to_string(),
        })?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(failed("video stream has no dimensions".to_string()).into()),
    };

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| failed("video stream has no frame rate".to_string()))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| (duration * fps).round() as usize);

    Ok(VideoInfo {
        width,
        height,
        fps,
        duration,
        frame_count,
        has_audio,
    })
}

/// Parse `"30000/1001"` or `"29.97"`; `0/0` yields `None`
fn parse_frame_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate > 0.0 && rate.is_finite()).then_some(rate)
}
