use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    effects::color::parse_color,
    error::{ConfigError, Result},
};

/// Main configuration for a remix run
///
/// Every section is optional in TOML; missing sections take their defaults.
/// A `Config` is validated once, then [`Config::resolve_rolls`] fixes the
/// randomized run-level choices before any frame is processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub toolchain: ToolchainConfig,
    pub processing: ProcessingConfig,
    pub text: TextConfig,
    pub watermark: WatermarkConfig,
    pub titles: TitleConfig,
    pub subtitles: SubtitleConfig,
    pub geometry: GeometryConfig,
    pub photometric: PhotometricConfig,
    pub blur: BlurConfig,
    pub frequency: FrequencyConfig,
    pub fade: FadeConfig,
    pub pip: PipConfig,
    pub hash: HashConfig,
    pub sticker: StickerConfig,
    pub border: BorderConfig,
    pub vignette: VignetteConfig,
    pub timeline: TimelineConfig,
    pub frame_swap: FrameSwapConfig,
    pub audio: AudioConfig,
    pub metadata: MetadataConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate every section, including asset paths of enabled features
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        self.processing.validate()?;
        self.text.validate()?;
        self.watermark.validate()?;
        self.titles.validate()?;
        self.subtitles.validate()?;
        self.geometry.validate()?;
        self.photometric.validate()?;
        self.blur.validate()?;
        self.frequency.validate()?;
        self.fade.validate()?;
        self.pip.validate()?;
        self.hash.validate()?;
        self.sticker.validate()?;
        self.border.validate()?;
        self.vignette.validate()?;
        self.timeline.validate()?;
        self.frame_swap.validate()?;
        self.audio.validate()?;

        if self.needs_font() {
            match &self.text.font_path {
                Some(path) => require_asset("text.font_path", path)?,
                None => {
                    return Err(ConfigError::InvalidValue {
                        key: "text.font_path".to_string(),
                        value: "<unset> (required by text watermark, titles or subtitles)".to_string(),
                    }
                    .into())
                }
            }
        }

        Ok(())
    }

    /// Whether any enabled effect draws text
    pub fn needs_font(&self) -> bool {
        let text_watermark =
            self.watermark.enabled && matches!(self.watermark.kind, WatermarkKind::Text { .. });
        text_watermark || self.titles.enabled || self.subtitles.enabled
    }

    /// Resolve the run-level random choices (seed, flip, speed factor).
    ///
    /// Must be called once, after validation and before the pipeline starts.
    pub fn resolve_rolls<R: Rng>(&mut self, rng: &mut R) {
        let seed = self.run.seed.unwrap_or_else(|| rng.gen());
        self.run.resolved_seed = Some(seed);

        let flip = if self.geometry.random_flip {
            rng.gen_bool(0.5)
        } else {
            self.geometry.flip_horizontal
        };
        self.geometry.resolved_flip = Some(flip);

        let speed = if self.run.speed_enabled {
            let (lo, hi) = self.run.speed_range;
            if hi > lo {
                rng.gen_range(lo..=hi)
            } else {
                lo
            }
        } else {
            1.0
        };
        self.run.resolved_speed = Some(speed);
    }

    /// Resolved speed factor, 1.0 before [`Config::resolve_rolls`]
    pub fn speed_factor(&self) -> f64 {
        self.run.resolved_speed.unwrap_or(1.0)
    }

    /// Resolved horizontal flip
    pub fn flip(&self) -> bool {
        self.geometry
            .resolved_flip
            .unwrap_or(self.geometry.flip_horizontal)
    }

    /// Resolved master seed, 0 before [`Config::resolve_rolls`]
    pub fn seed(&self) -> u64 {
        self.run.resolved_seed.or(self.run.seed).unwrap_or(0)
    }
}

fn invalid(key: &str, value: impl ToString) -> crate::error::RemixError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Reject values outside `[lo, hi]`; NaN is never inside a range
fn check_range<T: PartialOrd + ToString>(key: &str, value: T, lo: T, hi: T) -> Result<()> {
    if !(lo..=hi).contains(&value) {
        return Err(invalid(key, value));
    }
    Ok(())
}

fn check_positive(key: &str, value: f32) -> Result<()> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(invalid(key, value));
    }
    Ok(())
}

fn check_color(key: &str, value: &str) -> Result<()> {
    if parse_color(value).is_none() {
        return Err(invalid(key, value));
    }
    Ok(())
}

fn require_asset(key: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ConfigError::MissingAsset {
            key: key.to_string(),
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Run-level settings and the values resolved from them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Master seed; random when unset
    pub seed: Option<u64>,

    /// Speed the output up by a random factor from `speed_range`
    pub speed_enabled: bool,

    pub speed_range: (f64, f64),

    #[serde(skip)]
    pub resolved_seed: Option<u64>,

    #[serde(skip)]
    pub resolved_speed: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            speed_enabled: false,
            speed_range: (1.05, 1.15),
            resolved_seed: None,
            resolved_speed: None,
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<()> {
        let (lo, hi) = self.speed_range;
        if !(lo > 0.0 && lo <= hi && hi <= 4.0) {
            return Err(invalid("run.speed_range", format!("{}-{}", lo, hi)));
        }
        Ok(())
    }
}

/// Locations of the media toolchain binaries, passed explicitly to every subprocess
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Batching and worker pool sizing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Frames per batch; derived from the CPU count when unset
    pub batch_size: Option<usize>,

    /// Worker threads; `min(4, cpus)` when unset
    pub workers: Option<usize>,
}

impl ProcessingConfig {
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or_else(|| (num_cpus::get() * 10).clamp(10, 100))
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().min(4)).max(1)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == Some(0) {
            return Err(invalid("processing.batch_size", 0));
        }
        if self.workers == Some(0) {
            return Err(invalid("processing.workers", 0));
        }
        Ok(())
    }
}

/// Font used by every text-drawing effect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub font_path: Option<PathBuf>,

    /// Outline thickness in pixels drawn beneath text
    pub border_size: u32,
}

impl TextConfig {
    fn validate(&self) -> Result<()> {
        check_range("text.border_size", self.border_size, 0, 10)
    }
}

/// Watermark payload, decided once at validation time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkKind {
    Text { text: String },
    Image { path: PathBuf },
    Video { path: PathBuf },
}

impl Default for WatermarkKind {
    fn default() -> Self {
        Self::Text {
            text: String::new(),
        }
    }
}

/// Watermark motion across the frame
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkDirection {
    #[default]
    Center,
    Random,
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
    LtToRb,
    RtToLb,
    LbToRt,
    RbToLt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub kind: WatermarkKind,
    pub opacity: f32,
    pub direction: WatermarkDirection,
    pub color: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: WatermarkKind::default(),
            opacity: 0.1,
            direction: WatermarkDirection::Center,
            color: "white".to_string(),
        }
    }
}

impl WatermarkConfig {
    fn validate(&self) -> Result<()> {
        check_range("watermark.opacity", self.opacity, 0.0, 1.0)?;
        check_color("watermark.color", &self.color)?;
        if self.enabled {
            match &self.kind {
                WatermarkKind::Text { text } if text.trim().is_empty() => {
                    return Err(invalid("watermark.kind.text", "<empty>"));
                }
                WatermarkKind::Text { .. } => {}
                WatermarkKind::Image { path } => require_asset("watermark.kind.path", path)?,
                WatermarkKind::Video { path } => require_asset("watermark.kind.path", path)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub enabled: bool,
    pub top_text: String,
    pub bottom_text: String,
    /// Gap above the top title, percent of frame height
    pub top_margin: u32,
    /// Gap below the bottom title, percent of frame height
    pub bottom_margin: u32,
    pub font_size: f32,
    pub opacity: f32,
    pub color: String,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_text: String::new(),
            bottom_text: String::new(),
            top_margin: 5,
            bottom_margin: 5,
            font_size: 30.0,
            opacity: 0.8,
            color: "red".to_string(),
        }
    }
}

impl TitleConfig {
    fn validate(&self) -> Result<()> {
        check_range("titles.top_margin", self.top_margin, 0, 100)?;
        check_range("titles.bottom_margin", self.bottom_margin, 0, 100)?;
        check_range("titles.opacity", self.opacity, 0.0, 1.0)?;
        check_positive("titles.font_size", self.font_size)?;
        check_color("titles.color", &self.color)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub enabled: bool,
    /// SRT file, pre-supplied or written by a transcriber
    pub srt_path: Option<PathBuf>,
    /// Subtitles are drawn only on videos longer than this many seconds
    pub min_video_duration: f64,
    pub font_size: f32,
    pub opacity: f32,
    pub color: String,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            srt_path: None,
            min_video_duration: 5.0,
            font_size: 30.0,
            opacity: 1.0,
            color: "yellow".to_string(),
        }
    }
}

impl SubtitleConfig {
    fn validate(&self) -> Result<()> {
        check_range("subtitles.opacity", self.opacity, 0.0, 1.0)?;
        check_range(
            "subtitles.min_video_duration",
            self.min_video_duration,
            0.0,
            f64::MAX,
        )?;
        check_positive("subtitles.font_size", self.font_size)?;
        check_color("subtitles.color", &self.color)?;
        if self.enabled {
            match &self.srt_path {
                Some(path) => require_asset("subtitles.srt_path", path)?,
                None => return Err(invalid("subtitles.srt_path", "<unset>")),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Degrees, counter-clockwise
    pub rotation_angle: f32,
    /// Fraction trimmed from each side before resizing back
    pub crop_percentage: f32,
    pub flip_horizontal: bool,
    /// Pick the flip at random once per run, overriding `flip_horizontal`
    pub random_flip: bool,

    #[serde(skip)]
    pub resolved_flip: Option<bool>,
}

impl GeometryConfig {
    fn validate(&self) -> Result<()> {
        check_range("geometry.rotation_angle", self.rotation_angle, -45.0, 45.0)?;
        check_range("geometry.crop_percentage", self.crop_percentage, 0.0, 0.5)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotometricConfig {
    pub sbc_enabled: bool,
    pub saturation: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub color_shift_enabled: bool,
    /// Blue/green shift drawn from `[-range, range]` per frame
    pub color_shift_range: u8,
}

impl Default for PhotometricConfig {
    fn default() -> Self {
        Self {
            sbc_enabled: false,
            saturation: 1.0,
            brightness: 0.0,
            contrast: 1.0,
            color_shift_enabled: false,
            color_shift_range: 3,
        }
    }
}

impl PhotometricConfig {
    fn validate(&self) -> Result<()> {
        check_range("photometric.brightness", self.brightness, -1.0, 1.0)?;
        check_range("photometric.saturation", self.saturation, 0.0, 10.0)?;
        check_range("photometric.contrast", self.contrast, 0.0, 10.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    pub background_enabled: bool,
    pub top_percentage: u32,
    pub bottom_percentage: u32,
    pub side_percentage: u32,

    /// Blur the border bands on every `gaussian_interval`-th frame; 0 disables
    pub gaussian_interval: u32,
    pub gaussian_kernel_size: u32,
    pub gaussian_area_percentage: u32,

    pub edge_enabled: bool,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            background_enabled: false,
            top_percentage: 3,
            bottom_percentage: 3,
            side_percentage: 3,
            gaussian_interval: 0,
            gaussian_kernel_size: 3,
            gaussian_area_percentage: 15,
            edge_enabled: false,
        }
    }
}

impl BlurConfig {
    fn validate(&self) -> Result<()> {
        check_range("blur.top_percentage", self.top_percentage, 0, 100)?;
        check_range("blur.bottom_percentage", self.bottom_percentage, 0, 100)?;
        check_range("blur.side_percentage", self.side_percentage, 0, 100)?;
        check_range("blur.gaussian_area_percentage", self.gaussian_area_percentage, 0, 100)?;
        if self.gaussian_kernel_size == 0 || self.gaussian_kernel_size % 2 == 0 {
            return Err(invalid("blur.gaussian_kernel_size", self.gaussian_kernel_size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Phase noise bound; 0 disables the scramble
    pub scramble_frequency: f32,
    pub texture_noise_enabled: bool,
    pub texture_noise_strength: f32,
    pub dct_enabled: bool,
    pub dct_noise_strength: f32,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            scramble_frequency: 0.0,
            texture_noise_enabled: false,
            texture_noise_strength: 0.5,
            dct_enabled: false,
            dct_noise_strength: 0.02,
        }
    }
}

impl FrequencyConfig {
    fn validate(&self) -> Result<()> {
        check_range("frequency.scramble_frequency", self.scramble_frequency, 0.0, 1.0)?;
        check_range("frequency.texture_noise_strength", self.texture_noise_strength, 0.0, 1.0)?;
        check_range("frequency.dct_noise_strength", self.dct_noise_strength, 0.0, 0.5)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
    pub fade_in_frames: u32,
    pub fade_out_frames: u32,
}

impl FadeConfig {
    fn validate(&self) -> Result<()> {
        check_range("fade.fade_in_frames", self.fade_in_frames, 0, 600)?;
        check_range("fade.fade_out_frames", self.fade_out_frames, 0, 600)
    }
}

/// Picture-in-picture overlay of a looping secondary video
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipConfig {
    pub enabled: bool,
    pub video_path: Option<PathBuf>,
    pub scale: f32,
    pub opacity: f32,
}

impl Default for PipConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            video_path: None,
            scale: 1.0,
            opacity: 0.1,
        }
    }
}

impl PipConfig {
    fn validate(&self) -> Result<()> {
        check_range("pip.opacity", self.opacity, 0.0, 1.0)?;
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(invalid("pip.scale", self.scale));
        }
        if self.enabled {
            match &self.video_path {
                Some(path) => require_asset("pip.video_path", path)?,
                None => return Err(invalid("pip.video_path", "<unset>")),
            }
        }
        Ok(())
    }
}

/// Perceptual-hash disruption
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub enabled: bool,
    /// Width of the randomized border band
    pub border_pixels: u32,
    pub blocks: u32,
    pub block_size: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            border_pixels: 2,
            blocks: 5,
            block_size: 3,
        }
    }
}

impl HashConfig {
    fn validate(&self) -> Result<()> {
        check_range("hash.border_pixels", self.border_pixels, 1, 5)?;
        check_range("hash.blocks", self.blocks, 0, 20)?;
        if self.block_size == 0 {
            return Err(invalid("hash.block_size", 0));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StickerPosition {
    #[default]
    Corner,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StickerConfig {
    pub enabled: bool,
    pub folder: Option<PathBuf>,
    pub opacity: f32,
    /// Sticker width as a fraction of frame width
    pub scale_range: (f32, f32),
    /// Frames between sticker changes; 0 keeps one sticker for the whole run
    pub change_interval: u32,
    pub position: StickerPosition,
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: None,
            opacity: 0.7,
            scale_range: (0.08, 0.15),
            change_interval: 60,
            position: StickerPosition::Corner,
        }
    }
}

impl StickerConfig {
    fn validate(&self) -> Result<()> {
        check_range("sticker.opacity", self.opacity, 0.0, 1.0)?;
        let (lo, hi) = self.scale_range;
        if !(lo > 0.0 && lo <= hi && hi <= 1.0) {
            return Err(invalid("sticker.scale_range", format!("{}-{}", lo, hi)));
        }
        if self.enabled {
            match &self.folder {
                Some(path) if path.is_dir() => {}
                Some(path) => require_asset("sticker.folder", path)?,
                None => return Err(invalid("sticker.folder", "<unset>")),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BorderStyle {
    Solid,
    #[default]
    Gradient,
    Rainbow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    pub enabled: bool,
    pub width: u32,
    pub style: BorderStyle,
    pub color_start: String,
    pub color_end: String,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 3,
            style: BorderStyle::Gradient,
            color_start: "#FF6B6B".to_string(),
            color_end: "#4ECDC4".to_string(),
        }
    }
}

impl BorderConfig {
    fn validate(&self) -> Result<()> {
        check_range("border.width", self.width, 0, 20)?;
        check_color("border.color_start", &self.color_start)?;
        check_color("border.color_end", &self.color_end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VignetteConfig {
    pub enabled: bool,
    pub strength: f32,
    pub radius: f32,
}

impl Default for VignetteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 0.3,
            radius: 0.8,
        }
    }
}

impl VignetteConfig {
    fn validate(&self) -> Result<()> {
        check_range("vignette.strength", self.strength, 0.0, 1.0)?;
        check_range("vignette.radius", self.radius, 0.3, 2.0)
    }
}

/// Fill used for synthesized intro/outro frames
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntroOutroFill {
    #[default]
    Black,
    White,
    /// Heavily blurred copy of the first (intro) or last (outro) real frame
    Blur,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub enabled: bool,
    pub intro_frames: u32,
    pub outro_frames: u32,
    pub fill: IntroOutroFill,
    pub drop_ratio: f64,
    pub duplicate_ratio: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            intro_frames: 3,
            outro_frames: 3,
            fill: IntroOutroFill::Black,
            drop_ratio: 0.003,
            duplicate_ratio: 0.002,
        }
    }
}

impl TimelineConfig {
    fn validate(&self) -> Result<()> {
        check_range("timeline.intro_frames", self.intro_frames, 0, 30)?;
        check_range("timeline.outro_frames", self.outro_frames, 0, 30)?;
        check_range("timeline.drop_ratio", self.drop_ratio, 0.0, 0.05)?;
        check_range("timeline.duplicate_ratio", self.duplicate_ratio, 0.0, 0.05)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSwapConfig {
    pub enabled: bool,
    pub interval: usize,
}

impl Default for FrameSwapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 15,
        }
    }
}

impl FrameSwapConfig {
    fn validate(&self) -> Result<()> {
        // An interval of 1 maps every frame onto its successor and drops frames.
        if self.interval < 2 {
            return Err(invalid("frame_swap.interval", self.interval));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub silence_removal_enabled: bool,
    /// Silences shorter than this are kept untouched
    pub min_silence_ms: u32,
    pub silence_threshold_db: f32,
    /// Padding kept at each edge of a non-silent chunk
    pub keep_silence_ms: u32,
    /// Fraction of each removed gap re-inserted between chunks
    pub retention_ratio: f32,

    pub fingerprint_enabled: bool,
    pub pitch_semitones: f32,
    pub subliminal_noise: bool,
    pub subliminal_volume: f32,
    pub random_silence: bool,
    pub micro_silence_ms: u32,
    pub micro_silence_spacing_ms: (u32, u32),

    pub bgm_enabled: bool,
    pub bgm_path: Option<PathBuf>,
    pub bgm_volume: f32,

    pub output_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            silence_removal_enabled: false,
            min_silence_ms: 500,
            silence_threshold_db: -50.0,
            keep_silence_ms: 100,
            retention_ratio: 0.5,
            fingerprint_enabled: false,
            pitch_semitones: 0.3,
            subliminal_noise: true,
            subliminal_volume: 0.01,
            random_silence: true,
            micro_silence_ms: 20,
            micro_silence_spacing_ms: (5000, 15000),
            bgm_enabled: false,
            bgm_path: None,
            bgm_volume: 0.1,
            output_sample_rate: 44100,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        check_range("audio.retention_ratio", self.retention_ratio, 0.0, 1.0)?;
        check_range("audio.pitch_semitones", self.pitch_semitones, 0.0, 2.0)?;
        check_range("audio.subliminal_volume", self.subliminal_volume, 0.0, 0.1)?;
        check_range("audio.bgm_volume", self.bgm_volume, 0.0, 1.0)?;
        check_range("audio.silence_threshold_db", self.silence_threshold_db, -120.0, 0.0)?;
        if self.output_sample_rate == 0 {
            return Err(invalid("audio.output_sample_rate", 0));
        }
        let (lo, hi) = self.micro_silence_spacing_ms;
        if lo == 0 || hi < lo {
            return Err(invalid("audio.micro_silence_spacing_ms", format!("{}-{}", lo, hi)));
        }
        // A missing BGM asset only disables mixing, it never fails the run.
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub clean_enabled: bool,
    pub forge_creation_time: bool,
    pub forge_encoder: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            clean_enabled: true,
            forge_creation_time: true,
            forge_encoder: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("remix.toml");

        let mut original = Config::default();
        original.vignette.enabled = true;
        original.border.style = BorderStyle::Rainbow;
        original.watermark.kind = WatermarkKind::Text {
            text: "@someone".to_string(),
        };

        original.save_to_file(&file_path).unwrap();
        let loaded = Config::from_file(&file_path).unwrap();

        assert!(loaded.vignette.enabled);
        assert_eq!(loaded.border.style, BorderStyle::Rainbow);
        assert_eq!(loaded.watermark.kind, original.watermark.kind);
        assert_eq!(loaded.frame_swap.interval, original.frame_swap.interval);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [vignette]
            enabled = true

            [watermark]
            direction = "left_to_right"
            "#,
        )
        .unwrap();
        assert!(config.vignette.enabled);
        assert_eq!(config.vignette.radius, 0.8);
        assert_eq!(config.watermark.direction, WatermarkDirection::LeftToRight);
        assert_eq!(config.audio.output_sample_rate, 44100);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut config = Config::default();
        config.geometry.crop_percentage = 0.6;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vignette.radius = 0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.blur.gaussian_kernel_size = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.frame_swap.interval = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.border.color_start = "chartreuse".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_values_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("nan.toml");
        std::fs::write(
            &file_path,
            "[vignette]\nenabled = true\nstrength = nan\n",
        )
        .unwrap();
        let config = Config::from_file(&file_path).unwrap();
        assert!(config.vignette.strength.is_nan());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.frequency.dct_noise_strength = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.speed_range = (f64::NAN, 1.1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sticker.scale_range = (0.1, f32::NAN);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.titles.font_size = f32::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pip.scale = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_text_and_fade_bounds() {
        let mut config = Config::default();
        config.text.border_size = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fade.fade_in_frames = 601;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.text.border_size = 3;
        config.fade.fade_out_frames = 30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_feature_requires_asset() {
        let mut config = Config::default();
        config.pip.enabled = true;
        config.pip.video_path = Some(PathBuf::from("/definitely/not/here.mp4"));
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            crate::error::RemixError::Config(ConfigError::MissingAsset { .. })
        ));

        let mut config = Config::default();
        config.titles.enabled = true;
        config.titles.top_text = "hello".to_string();
        assert!(config.validate().is_err(), "titles need a font");
    }

    #[test]
    fn test_resolve_rolls_fixes_run_values() {
        let mut config = Config::default();
        config.run.speed_enabled = true;
        config.run.seed = Some(7);
        config.geometry.flip_horizontal = true;

        let mut rng = SmallRng::seed_from_u64(1);
        config.resolve_rolls(&mut rng);

        let speed = config.speed_factor();
        assert!((1.05..=1.15).contains(&speed));
        assert!(config.flip());
        assert_eq!(config.seed(), 7);
    }

    #[test]
    fn test_speed_is_identity_when_disabled() {
        let mut config = Config::default();
        config.resolve_rolls(&mut SmallRng::seed_from_u64(3));
        assert_eq!(config.speed_factor(), 1.0);
        assert!(!config.flip());
    }

    #[test]
    fn test_effective_batch_size_bounds() {
        let processing = ProcessingConfig::default();
        let batch = processing.effective_batch_size();
        assert!((10..=100).contains(&batch));
        assert!((1..=4).contains(&processing.effective_workers()));
    }
}
