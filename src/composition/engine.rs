use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::{rngs::SmallRng, SeedableRng};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioBuffer, AudioLoader, AudioPipeline},
    config::Config,
    effects::{EffectAssets, EffectChain},
    error::{Result, SourceError},
    video::{
        encoder::{EncodeSettings, FfmpegEncoder},
        metadata::{clean_metadata, ForgedTags},
        pipeline::{FramePipeline, TimelineEditor, TimelineStats},
        probe::MediaToolchain,
        types::VideoInfo,
        FrameDecoder, SwapReader,
    },
};

/// Random stream used for setup-time choices (sticker pick, metadata tags)
const SETUP_STREAM: u64 = 0x5E70_0000_0000_0002;

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub seed: u64,
    pub speed: f64,
    pub flipped: bool,
    pub frames_decoded: usize,
    pub frames_written: usize,
    pub timeline: TimelineStats,
    pub audio_seconds: Option<f64>,
}

/// Orchestrates a single remix run
///
/// The run follows a fixed sequence:
/// 1. Setup - validate the configuration and resolve the per-run random rolls
/// 2. Probe - locate the media toolchain and read the input's stream properties
/// 3. Audio - extract the soundtrack and run the audio stages
/// 4. Video - decode, transform in parallel, edit the timeline and encode
/// 5. Metadata - strip and optionally forge container tags
///
/// Temporary files live in a scoped directory removed on every exit path. A
/// run that fails after the encoder started also removes the partial output.
pub struct RemixEngine {
    config: Config,
}

impl RemixEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Remix `input` into `output`
    pub async fn process<P: AsRef<Path>>(&self, input: P, output: P) -> Result<RunReport> {
        let input = input.as_ref();
        let output = output.as_ref();
        let started = Instant::now();

        info!("🎬 Starting vidremix run");
        info!("   Input: {:?}", input);
        info!("   Output: {:?}", output);

        // Step 1: Setup
        let config = self.resolve_config()?;
        let workspace = tempfile::Builder::new().prefix("vidremix-").tempdir()?;
        debug!("Workspace: {:?}", workspace.path());

        let mut output_touched = false;
        let result = self
            .run(&config, input, output, &workspace, &mut output_touched)
            .await;

        if let Err(e) = workspace.close() {
            warn!("Failed to remove temporary files: {}", e);
        }

        match result {
            Ok(report) => {
                info!(
                    "🎉 Remix complete in {:.1}s! Output saved to: {:?}",
                    started.elapsed().as_secs_f64(),
                    output
                );
                Ok(report)
            }
            Err(e) => {
                if output_touched && output.exists() {
                    if let Err(cleanup) = std::fs::remove_file(output) {
                        warn!("Failed to remove partial output {:?}: {}", output, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Validate the configuration and write the resolved rolls into a copy
    fn resolve_config(&self) -> Result<Config> {
        info!("🎲 Step 1: Resolving run parameters...");
        self.config.validate()?;

        let mut config = self.config.clone();
        let mut rng = match config.run.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        config.resolve_rolls(&mut rng);

        info!("   Seed: {}", config.seed());
        info!("   Speed factor: {:.3}", config.speed_factor());
        info!("   Horizontal flip: {}", config.flip());
        Ok(config)
    }

    async fn run(
        &self,
        config: &Config,
        input: &Path,
        output: &Path,
        workspace: &TempDir,
        output_touched: &mut bool,
    ) -> Result<RunReport> {
        // Step 2: Probe
        info!("🔍 Step 2: Probing input...");
        let toolchain = MediaToolchain::new(&config.toolchain);
        toolchain.check_available()?;
        let info = toolchain.probe(input)?;
        if info.width == 0 || info.height == 0 {
            return Err(SourceError::NoVideoStream {
                path: input.display().to_string(),
            }
            .into());
        }
        info!(
            "   {}x{} @ {:.3} fps, {:.1}s, ~{} frames, audio: {}",
            info.width, info.height, info.fps, info.duration, info.frame_count, info.has_audio
        );

        // Step 3: Audio
        let audio = self.process_audio(config, &toolchain, input, &info, workspace).await?;
        let audio_seconds = audio.as_ref().map(|(_, seconds)| *seconds);

        // Step 4: Video
        info!("🎞️  Step 4: Rendering frames...");
        let settings = EncodeSettings {
            width: info.width,
            height: info.height,
            fps: info.fps,
            speed: config.speed_factor(),
            audio: audio.map(|(path, _)| path),
            output: output.to_path_buf(),
        };
        let encoder_started = Arc::new(AtomicBool::new(false));
        let joined = {
            let (config, toolchain, info, input) =
                (config.clone(), toolchain.clone(), info.clone(), input.to_path_buf());
            let started = Arc::clone(&encoder_started);
            tokio::task::spawn_blocking(move || {
                render_video(&config, &toolchain, &info, &input, settings, &started)
            })
            .await
        };
        *output_touched = encoder_started.load(Ordering::SeqCst);
        let render = joined.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))??;
        info!(
            "   ✅ {} frames decoded, {} written",
            render.frames_decoded, render.timeline.written
        );

        // Step 5: Metadata
        if config.metadata.clean_enabled {
            info!("🧹 Step 5: Cleaning container metadata...");
            let mut rng = SmallRng::seed_from_u64(config.seed() ^ SETUP_STREAM);
            let tags = ForgedTags::roll(&config.metadata, &mut rng);
            if let Err(e) = clean_metadata(&toolchain, output, &tags) {
                warn!("Metadata clean failed, keeping encoder output: {}", e);
            }
        }

        Ok(RunReport {
            seed: config.seed(),
            speed: config.speed_factor(),
            flipped: config.flip(),
            frames_decoded: render.frames_decoded,
            frames_written: render.timeline.written,
            timeline: render.timeline,
            audio_seconds,
        })
    }

    /// Extract and process the soundtrack, returning the WAV for the muxer
    async fn process_audio(
        &self,
        config: &Config,
        toolchain: &MediaToolchain,
        input: &Path,
        info: &VideoInfo,
        workspace: &TempDir,
    ) -> Result<Option<(PathBuf, f64)>> {
        info!("🎵 Step 3: Processing audio...");
        if !info.has_audio {
            info!("   No audio track, output will be video-only");
            return Ok(None);
        }

        let extracted = workspace.path().join("source.wav");
        AudioLoader::extract_track(toolchain, input, &extracted).await?;
        let voice = AudioLoader::load(&extracted).await?;
        debug!(
            "Loaded soundtrack: {:.1}s, {} Hz, {} channels",
            voice.duration(),
            voice.sample_rate,
            voice.channels
        );

        let bgm = load_bgm(config).await;
        let pipeline = AudioPipeline::new(&config.audio, config.seed()).with_bgm(bgm);
        let processed = tokio::task::spawn_blocking(move || pipeline.process(voice))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let path = workspace.path().join("processed.wav");
        AudioLoader::save_wav(&processed, &path)?;
        info!("   ✅ Audio ready: {:.1}s", processed.duration());
        Ok(Some((path, processed.duration())))
    }
}

/// Background track, or `None` when mixing is off or the asset is unusable
async fn load_bgm(config: &Config) -> Option<AudioBuffer> {
    if !config.audio.bgm_enabled {
        return None;
    }
    let Some(path) = &config.audio.bgm_path else {
        warn!("BGM enabled without a path, mixing disabled");
        return None;
    };
    if !path.exists() {
        warn!("BGM file {:?} not found, mixing disabled", path);
        return None;
    }
    match AudioLoader::load(path).await {
        Ok(buffer) => Some(buffer),
        Err(e) => {
            warn!("BGM could not be loaded, mixing disabled: {}", e);
            None
        }
    }
}

struct RenderReport {
    frames_decoded: usize,
    timeline: TimelineStats,
}

/// Decode, transform and encode the video stream
///
/// `encoder_started` is raised once the encoder owns the output path.
fn render_video(
    config: &Config,
    toolchain: &MediaToolchain,
    info: &VideoInfo,
    input: &Path,
    settings: EncodeSettings,
    encoder_started: &AtomicBool,
) -> Result<RenderReport> {
    let assets = EffectAssets::load(config, info, toolchain)?;
    let mut rng = SmallRng::seed_from_u64(config.seed() ^ SETUP_STREAM);
    let chain = EffectChain::from_config(config, info, assets, &mut rng);
    info!("   Effect chain: [{}]", chain.names().join(", "));

    let pipeline = FramePipeline::new(
        chain,
        config.processing.effective_batch_size(),
        config.processing.effective_workers(),
        config.seed(),
        info.frame_count,
        info.fps,
    )?;
    debug!("Batch size {}", pipeline.batch_size());

    let encoder = FfmpegEncoder::spawn(toolchain, settings)?;
    encoder_started.store(true, Ordering::SeqCst);
    let mut editor = TimelineEditor::new(encoder, &config.timeline, config.seed());

    let decoder = match FrameDecoder::spawn(toolchain, input, info.width, info.height, false) {
        Ok(decoder) => decoder,
        Err(e) => {
            editor.into_inner().abort();
            return Err(e);
        }
    };
    let interval = if config.frame_swap.enabled {
        config.frame_swap.interval
    } else {
        0
    };
    let mut source = SwapReader::new(decoder, interval, info.frame_count);

    let stats = match pipeline.run(&mut source, &mut editor) {
        Ok(stats) => stats,
        Err(e) => {
            source.into_inner().close();
            editor.into_inner().abort();
            return Err(e);
        }
    };

    if let Err(e) = source.into_inner().finish() {
        editor.into_inner().abort();
        return Err(e);
    }
    if stats.frames == 0 {
        editor.into_inner().abort();
        return Err(SourceError::DecodeFailed {
            reason: "no frames decoded".to_string(),
        }
        .into());
    }

    let (encoder, timeline) = editor.finish()?;
    encoder.finish()?;

    Ok(RenderReport {
        frames_decoded: stats.frames,
        timeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, EncodeError, RemixError};
    use tempfile::tempdir;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.toolchain.ffmpeg = PathBuf::from("/nonexistent/vidremix/ffmpeg");
        config.toolchain.ffprobe = PathBuf::from("/nonexistent/vidremix/ffprobe");
        config.run.seed = Some(11);
        config
    }

    #[test]
    fn test_resolved_rolls_are_reproducible() {
        let mut config = offline_config();
        config.run.speed_enabled = true;
        config.geometry.random_flip = true;

        let engine = RemixEngine::new(config);
        let a = engine.resolve_config().unwrap();
        let b = engine.resolve_config().unwrap();
        assert_eq!(a.seed(), 11);
        assert_eq!(a.speed_factor(), b.speed_factor());
        assert_eq!(a.flip(), b.flip());
        assert!(engine.config().run.resolved_speed.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut config = offline_config();
        config.vignette.strength = 5.0;

        let result = RemixEngine::new(config)
            .process(dir.path().join("in.mp4"), output.clone())
            .await;
        assert!(matches!(
            result,
            Err(RemixError::Config(ConfigError::InvalidValue { .. }))
        ));
        assert!(!output.exists());
    }

    fn small_info() -> VideoInfo {
        VideoInfo {
            width: 32,
            height: 24,
            fps: 30.0,
            duration: 1.0,
            frame_count: 30,
            has_audio: false,
        }
    }

    fn settings_for(output: &Path) -> EncodeSettings {
        EncodeSettings {
            width: 32,
            height: 24,
            fps: 30.0,
            speed: 1.0,
            audio: None,
            output: output.to_path_buf(),
        }
    }

    #[test]
    fn test_unparseable_font_fails_before_encoder_starts() {
        let dir = tempdir().unwrap();
        let font = dir.path().join("broken.ttf");
        std::fs::write(&font, b"not a font at all").unwrap();
        let output = dir.path().join("out.mp4");
        std::fs::write(&output, b"previous run").unwrap();

        let mut config = offline_config();
        config.text.font_path = Some(font);
        config.titles.enabled = true;
        config.titles.top_text = "hello".to_string();
        assert!(config.validate().is_ok());

        let started = AtomicBool::new(false);
        let toolchain = MediaToolchain::new(&config.toolchain);
        let result = render_video(
            &config,
            &toolchain,
            &small_info(),
            &dir.path().join("in.mp4"),
            settings_for(&output),
            &started,
        );
        assert!(result.is_err());
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous run");
    }

    #[test]
    fn test_encoder_spawn_failure_leaves_flag_down() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let config = offline_config();

        let started = AtomicBool::new(false);
        let toolchain = MediaToolchain::new(&config.toolchain);
        let result = render_video(
            &config,
            &toolchain,
            &small_info(),
            &dir.path().join("in.mp4"),
            settings_for(&output),
            &started,
        );
        assert!(matches!(
            result,
            Err(RemixError::Encode(EncodeError::ToolMissing { .. }))
        ));
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_fatal_before_touching_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        std::fs::write(&output, b"previous run").unwrap();

        let result = RemixEngine::new(offline_config())
            .process(dir.path().join("in.mp4"), output.clone())
            .await;
        assert!(matches!(
            result,
            Err(RemixError::Encode(EncodeError::ToolMissing { .. }))
        ));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous run");
    }
}
