use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::task;
use tracing::{debug, warn};

use crate::audio::types::AudioBuffer;
use crate::error::{AudioError, EncodeError, Result};
use crate::video::probe::MediaToolchain;

/// Audio file loading, WAV writing and track extraction
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file into an [`AudioBuffer`]
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
        let path = path.as_ref().to_path_buf();
        task::spawn_blocking(move || Self::load_blocking(&path))
            .await
            .map_err(|e| AudioError::StageFailed {
                stage: "load".to_string(),
                reason: e.to_string(),
            })?
    }

    /// Synchronous variant of [`AudioLoader::load`]
    pub fn load_blocking(path: &Path) -> Result<AudioBuffer> {
        let extension = Self::detect_format(path).unwrap_or_default();
        if !Self::is_format_supported(&extension) {
            return Err(AudioError::UnsupportedFormat { format: extension }.into());
        }
        if extension == "wav" {
            Self::load_wav(path)
        } else {
            Self::load_with_symphonia(path)
        }
    }

    /// Load WAV files using the hound crate
    fn load_wav(path: &Path) -> Result<AudioBuffer> {
        let failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };
        let reader = hound::WavReader::open(path).map_err(|_| failed())?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|sample| Self::int_to_float(sample, bit_depth)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| failed())?
            }
        };

        Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
    }

    /// Load compressed formats using Symphonia
    fn load_with_symphonia(path: &Path) -> Result<AudioBuffer> {
        let failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };
        let file = File::open(path).map_err(|_| failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| failed())?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(failed)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.ok_or_else(|| AudioError::StageFailed {
            stage: "load".to_string(),
            reason: "no sample rate".to_string(),
        })?;
        let mut channels = codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|_| failed())?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(_) => break,
            };

            while !format.metadata().is_latest() {
                format.metadata().pop();
            }
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    channels.get_or_insert(decoded.spec().channels.count() as u16);
                    Self::interleave_to_f32(&decoded, &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => debug!("Skipping corrupt packet: {}", e),
                Err(_) => break,
            }
        }

        Ok(AudioBuffer::new(samples, sample_rate, channels.unwrap_or(1)))
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => sample as f32 / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Interleave a planar Symphonia buffer into f32 samples
    fn interleave_to_f32(buffer: &AudioBufferRef, output: &mut Vec<f32>) {
        macro_rules! interleave {
            ($buf:expr, $convert:expr) => {{
                let channels = $buf.spec().channels.count();
                for frame_idx in 0..$buf.frames() {
                    for ch in 0..channels {
                        output.push($convert($buf.chan(ch)[frame_idx]));
                    }
                }
            }};
        }

        match buffer {
            AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
            AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
            AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / 2147483648.0),
            AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / 32768.0),
            _ => warn!("Unsupported audio sample format, packet skipped"),
        }
    }

    /// Write a buffer as 16-bit PCM WAV
    pub fn save_wav<P: AsRef<Path>>(buffer: &AudioBuffer, path: P) -> Result<()> {
        let path = path.as_ref();
        let failed = || AudioError::WriteFailed {
            path: path.display().to_string(),
        };
        let spec = hound::WavSpec {
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec).map_err(|_| failed())?;
        for &sample in &buffer.samples {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            writer.write_sample(value).map_err(|_| failed())?;
        }
        writer.finalize().map_err(|_| failed())?;
        Ok(())
    }

    /// Extract the first audio track of a media file to a 16-bit WAV
    pub async fn extract_track(
        toolchain: &MediaToolchain,
        media: &Path,
        wav_out: &Path,
    ) -> Result<PathBuf> {
        let mut cmd = toolchain.ffmpeg_command();
        cmd.arg("-y")
            .arg("-i")
            .arg(media)
            .args(["-vn", "-map", "0:a:0", "-c:a", "pcm_s16le"])
            .arg(wav_out)
            .stdin(Stdio::null());

        let tool = toolchain.ffmpeg.display().to_string();
        let output = task::spawn_blocking(move || cmd.output())
            .await
            .map_err(|e| AudioError::StageFailed {
                stage: "extract".to_string(),
                reason: e.to_string(),
            })?
            .map_err(|_| EncodeError::ToolMissing { tool: tool.clone() })?;

        if !output.status.success() {
            return Err(EncodeError::ProcessFailed {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(wav_out.to_path_buf())
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Check if a file format is supported
    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}
