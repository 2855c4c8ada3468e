use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Stdio};

use tracing::debug;

use crate::{
    error::{EncodeError, Result},
    video::{probe::MediaToolchain, types::Frame},
};

/// Destination for processed frames, in final output order
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Parameters negotiated with the encoder subprocess
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    /// Frame rate of the source
    pub fps: f64,
    /// Playback speed factor; frames are presented at `fps * speed`
    pub speed: f64,
    /// Processed audio track (WAV), muxed alongside when present
    pub audio: Option<PathBuf>,
    pub output: PathBuf,
}

impl EncodeSettings {
    pub fn output_fps(&self) -> f64 {
        self.fps * self.speed
    }
}

/// Command line for the muxing ffmpeg process
///
/// Video arrives on stdin as raw RGB24 records; audio, when present, is
/// sped up with `atempo` to stay in sync with the faster frame rate.
pub fn encoder_args(settings: &EncodeSettings) -> Vec<OsString> {
    let rate = format!("{:.6}", settings.output_fps());
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |values: &[&str]| args.extend(values.iter().map(OsString::from));

    push(&[
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
        &format!("{}x{}", settings.width, settings.height),
        "-framerate",
        &rate,
        "-i",
        "pipe:0",
    ]);

    if let Some(audio) = &settings.audio {
        args.push("-i".into());
        args.push(audio.clone().into_os_string());
    }

    let mut push = |values: &[&str]| args.extend(values.iter().map(OsString::from));
    push(&["-map", "0:v:0"]);
    if settings.audio.is_some() {
        push(&["-map", "1:a:0", "-c:a", "aac"]);
        if (settings.speed - 1.0).abs() > f64::EPSILON {
            push(&["-filter:a", &atempo_chain(settings.speed)]);
        }
    } else {
        push(&["-an"]);
    }

    push(&[
        "-c:v",
        "libx264",
        "-preset",
        "fast",
        "-pix_fmt",
        "yuv420p",
        "-profile:v",
        "high",
        "-crf",
        "23",
        "-b:v",
        "2M",
        "-r",
        &rate,
    ]);
    args.push(settings.output.clone().into_os_string());
    args
}

/// `atempo` filter chain for `speed`, with every stage in `[0.5, 2.0]`
pub fn atempo_chain(speed: f64) -> String {
    let mut stages = Vec::new();
    let mut remaining = speed;
    while remaining > 2.0 {
        stages.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push(0.5);
        remaining /= 0.5;
    }
    stages.push(remaining);
    stages
        .iter()
        .map(|factor| format!("atempo={:.6}", factor))
        .collect::<Vec<_>>()
        .join(",")
}

/// ffmpeg subprocess fed raw frames over its stdin
pub struct FfmpegEncoder {
    settings: EncodeSettings,
    tool: String,
    child: Child,
    stdin: Option<ChildStdin>,
    frames_written: usize,
}

impl FfmpegEncoder {
    pub fn spawn(toolchain: &MediaToolchain, settings: EncodeSettings) -> Result<Self> {
        let mut cmd = toolchain.ffmpeg_command();
        cmd.args(encoder_args(&settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!("Spawning encoder: {:?}", cmd);
        let tool = toolchain.ffmpeg.display().to_string();
        let mut child = cmd
            .spawn()
            .map_err(|_| EncodeError::ToolMissing { tool: tool.clone() })?;
        let stdin = child.stdin.take().ok_or_else(|| EncodeError::PipeClosed {
            reason: "encoder stdin unavailable".to_string(),
        })?;

        Ok(Self {
            settings,
            tool,
            child,
            stdin: Some(stdin),
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Close stdin and wait for the encoder, surfacing its diagnostics on failure
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let output = self.child.wait_with_output()?;
        if !output.status.success() {
            return Err(EncodeError::ProcessFailed {
                tool: self.tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        debug!("Encoder finished after {} frames", self.frames_written);
        Ok(())
    }

    /// Kill the encoder after an upstream failure
    pub fn abort(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let expected = Frame::byte_len(self.settings.width, self.settings.height);
        let bytes = frame.as_bytes();
        if bytes.len() != expected {
            return Err(EncodeError::FrameSize {
                expected,
                actual: bytes.len(),
            }
            .into());
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| EncodeError::PipeClosed {
            reason: "encoder already finished".to_string(),
        })?;
        stdin.write_all(bytes).map_err(|e| EncodeError::PipeClosed {
            reason: e.to_string(),
        })?;
        self.frames_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(audio: Option<&str>, speed: f64) -> EncodeSettings {
        EncodeSettings {
            width: 1280,
            height: 720,
            fps: 30.0,
            speed,
            audio: audio.map(PathBuf::from),
            output: PathBuf::from("out.mp4"),
        }
    }

    fn joined(settings: &EncodeSettings) -> String {
        encoder_args(settings)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_video_only_args() {
        let args = joined(&settings(None, 1.0));
        assert!(args.starts_with("-y -f rawvideo -pix_fmt rgb24 -s 1280x720 -framerate 30.000000 -i pipe:0"));
        assert!(args.contains("-an"));
        assert!(!args.contains("aac"));
        assert!(args.contains("-c:v libx264 -preset fast -pix_fmt yuv420p -profile:v high -crf 23 -b:v 2M"));
        assert!(args.ends_with("out.mp4"));
    }

    #[test]
    fn test_audio_gets_tempo_filter() {
        let args = joined(&settings(Some("audio.wav"), 1.1));
        assert!(args.contains("-i audio.wav"));
        assert!(args.contains("-map 1:a:0 -c:a aac"));
        assert!(args.contains("atempo=1.100000"));
        assert!(args.contains("-r 33.000000"));
    }

    #[test]
    fn test_fast_speed_chains_tempo_stages() {
        assert_eq!(atempo_chain(1.5), "atempo=1.500000");
        assert_eq!(atempo_chain(3.0), "atempo=2.000000,atempo=1.500000");
        assert_eq!(atempo_chain(4.0), "atempo=2.000000,atempo=2.000000");
        assert_eq!(atempo_chain(0.25), "atempo=0.500000,atempo=0.500000");

        let args = joined(&settings(Some("audio.wav"), 3.0));
        assert!(args.contains("-filter:a atempo=2.000000,atempo=1.500000"));
        assert!(args.contains("-r 90.000000"));
    }

    #[test]
    fn test_unit_speed_has_no_tempo_filter() {
        let args = joined(&settings(Some("audio.wav"), 1.0));
        assert!(!args.contains("atempo"));
    }

    #[test]
    fn test_vec_sink_collects_frames() {
        let mut sink: Vec<Frame> = Vec::new();
        sink.write_frame(&Frame::new_black(2, 2)).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
