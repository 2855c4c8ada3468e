use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Duration, Local};
use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info};

use crate::{
    config::MetadataConfig,
    error::{EncodeError, Result},
    video::probe::MediaToolchain,
};

/// Plausible muxer identifiers written as the `encoder` tag
pub const ENCODER_TAGS: [&str; 5] = [
    "Lavf58.76.100",
    "Lavf59.27.100",
    "Lavf60.3.100",
    "HandBrake",
    "FFmpeg",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A creation time 1-30 days, 0-23 hours and 0-59 minutes before `now`
pub fn forged_creation_time<R: Rng>(now: DateTime<Local>, rng: &mut R) -> String {
    let offset = Duration::days(rng.gen_range(1..=30))
        + Duration::hours(rng.gen_range(0..=23))
        + Duration::minutes(rng.gen_range(0..=59));
    (now - offset).format(TIMESTAMP_FORMAT).to_string()
}

/// Tags injected by the clean pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForgedTags {
    pub creation_time: Option<String>,
    pub encoder: Option<String>,
}

impl ForgedTags {
    pub fn roll<R: Rng>(config: &MetadataConfig, rng: &mut R) -> Self {
        Self {
            creation_time: config
                .forge_creation_time
                .then(|| forged_creation_time(Local::now(), rng)),
            encoder: if config.forge_encoder {
                ENCODER_TAGS.choose(rng).map(|tag| tag.to_string())
            } else {
                None
            },
        }
    }
}

/// Remux without re-encoding, dropping all container metadata
pub fn clean_args(input: &Path, output: &Path, tags: &ForgedTags) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.as_os_str().into()];
    args.extend(["-map_metadata", "-1"].map(OsString::from));
    if let Some(time) = &tags.creation_time {
        args.push("-metadata".into());
        args.push(format!("creation_time={}", time).into());
    }
    if let Some(encoder) = &tags.encoder {
        args.push("-metadata".into());
        args.push(format!("encoder={}", encoder).into());
    }
    args.extend(["-c", "copy"].map(OsString::from));
    args.push(output.as_os_str().into());
    args
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_stem().unwrap_or_default().to_os_string();
    name.push(".clean.tmp.");
    name.push(path.extension().unwrap_or(OsStr::new("mp4")));
    path.with_file_name(name)
}

/// Strip metadata from `path` in place
///
/// Writes to a sibling temp file and moves it over the original only on
/// success; the temp file is removed on failure.
pub fn clean_metadata(toolchain: &MediaToolchain, path: &Path, tags: &ForgedTags) -> Result<()> {
    let temp = temp_path_for(path);
    let result = run_clean(toolchain, path, &temp, tags);
    if result.is_err() && temp.exists() {
        if let Err(e) = std::fs::remove_file(&temp) {
            debug!("Failed to remove {:?}: {}", temp, e);
        }
    }
    result
}

fn run_clean(toolchain: &MediaToolchain, path: &Path, temp: &Path, tags: &ForgedTags) -> Result<()> {
    let output = toolchain
        .ffmpeg_command()
        .args(clean_args(path, temp, tags))
        .stdin(Stdio::null())
        .output()
        .map_err(|_| EncodeError::ToolMissing {
            tool: toolchain.ffmpeg.display().to_string(),
        })?;

    if !output.status.success() {
        return Err(EncodeError::ProcessFailed {
            tool: toolchain.ffmpeg.display().to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    std::fs::rename(temp, path)?;
    if let Some(time) = &tags.creation_time {
        info!("Creation time set to {}", time);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_forged_time_is_in_the_past_window() {
        let now = Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..50 {
            let forged = forged_creation_time(now, &mut rng);
            let parsed = NaiveDateTime::parse_from_str(&forged, TIMESTAMP_FORMAT).unwrap();
            let age = now.naive_local() - parsed;
            assert!(age >= Duration::days(1));
            assert!(age <= Duration::days(31) + Duration::minutes(59));
        }
    }

    #[test]
    fn test_clean_args() {
        let tags = ForgedTags {
            creation_time: Some("2024-01-02T03:04:05".to_string()),
            encoder: Some("HandBrake".to_string()),
        };
        let args: Vec<String> = clean_args(Path::new("out.mp4"), Path::new("tmp.mp4"), &tags)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args.join(" "),
            "-y -i out.mp4 -map_metadata -1 -metadata creation_time=2024-01-02T03:04:05 \
             -metadata encoder=HandBrake -c copy tmp.mp4"
        );
    }

    #[test]
    fn test_roll_respects_switches() {
        let mut rng = SmallRng::seed_from_u64(0);
        let config = MetadataConfig {
            clean_enabled: true,
            forge_creation_time: false,
            forge_encoder: true,
        };
        let tags = ForgedTags::roll(&config, &mut rng);
        assert!(tags.creation_time.is_none());
        assert!(ENCODER_TAGS.contains(&tags.encoder.as_deref().unwrap()));
    }

    #[test]
    fn test_temp_path_is_a_sibling() {
        let temp = temp_path_for(Path::new("/videos/final.mp4"));
        assert_eq!(temp, PathBuf::from("/videos/final.clean.tmp.mp4"));
    }
}
