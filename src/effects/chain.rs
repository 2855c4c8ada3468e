use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::{
    config::{Config, WatermarkKind},
    effects::{
        blur::{BackgroundBlur, EdgeBlur, PeriodicBlur},
        color::parse_color,
        composite::{PictureInPicture, Sticker, StickerChoice, StickerSet, Subtitles, Titles},
        disruption::{DynamicBorder, HashDisruption, TextureNoise},
        frequency::{DctPerturbation, PhaseScramble},
        geometry::{CropResize, Orientation},
        photometric::{ColorShift, Fade, Sbc, Vignette},
        text::TextRenderer,
        watermark::{watermark_font_size, ImageMark, Watermark, WatermarkAsset},
        Effect,
    },
    error::Result,
    subtitles::SubtitleTrack,
    video::{
        decoder::decode_to_cache,
        frame_cache::FrameCache,
        probe::MediaToolchain,
        types::{Frame, FrameContext, VideoInfo},
    },
};

/// Auxiliary inputs loaded once before frame processing
///
/// Everything here is read-only for the rest of the run. An asset that fails
/// to load is left as `None` and the effect that needs it is skipped.
#[derive(Default)]
pub struct EffectAssets {
    pub font: Option<TextRenderer>,
    pub watermark: Option<WatermarkAsset>,
    pub pip: Option<Arc<FrameCache>>,
    pub stickers: Option<Arc<StickerSet>>,
    pub subtitles: Option<SubtitleTrack>,
}

impl EffectAssets {
    /// Load every asset required by the enabled effects
    ///
    /// Auxiliary videos are decoded here, at their overlay size, into frame
    /// caches; no worker ever opens a media file.
    pub fn load(config: &Config, info: &VideoInfo, toolchain: &MediaToolchain) -> Result<Self> {
        let mut assets = Self::default();

        if config.needs_font() {
            if let Some(path) = &config.text.font_path {
                assets.font = Some(TextRenderer::from_file(path)?);
            }
        }

        if config.watermark.enabled {
            assets.watermark = match load_watermark(config, info, toolchain, assets.font.as_ref()) {
                Ok(asset) => asset,
                Err(e) => {
                    warn!("Watermark asset unavailable, watermark disabled: {}", e);
                    None
                }
            };
        }

        if config.pip.enabled {
            if let Some(path) = &config.pip.video_path {
                let width = ((info.width as f32 * config.pip.scale) as u32).max(1);
                let height = ((info.height as f32 * config.pip.scale) as u32).max(1);
                match decode_to_cache(toolchain, path, Some((width, height)), info.frame_count) {
                    Ok(cache) => assets.pip = Some(Arc::new(cache)),
                    Err(e) => warn!("Picture-in-picture source unavailable: {}", e),
                }
            }
        }

        if config.sticker.enabled {
            if let Some(folder) = &config.sticker.folder {
                let set = StickerSet::load_dir(folder)?;
                if set.is_empty() {
                    warn!("No readable stickers in {:?}, sticker disabled", folder);
                } else {
                    debug!("Loaded {} stickers", set.len());
                    assets.stickers = Some(Arc::new(set));
                }
            }
        }

        if config.subtitles.enabled {
            if let Some(path) = &config.subtitles.srt_path {
                assets.subtitles = Some(SubtitleTrack::from_file(path)?);
            }
        }

        Ok(assets)
    }
}

fn load_watermark(
    config: &Config,
    info: &VideoInfo,
    toolchain: &MediaToolchain,
    font: Option<&TextRenderer>,
) -> Result<Option<WatermarkAsset>> {
    let asset = match &config.watermark.kind {
        WatermarkKind::Text { text } => {
            let Some(font) = font else {
                return Ok(None);
            };
            let size = watermark_font_size((info.width, info.height), text);
            WatermarkAsset::Text {
                mask: font.render(text, size),
                color: color_or_white(&config.watermark.color),
                border: config.text.border_size,
            }
        }
        WatermarkKind::Image { path } => WatermarkAsset::Image(Arc::new(ImageMark::load(
            path,
            info.width,
            config.watermark.opacity,
        )?)),
        WatermarkKind::Video { path } => {
            let source = toolchain.probe(path)?;
            let width = (info.width / 5).max(1);
            let height = ((source.height as u64 * width as u64 / source.width.max(1) as u64) as u32).max(1);
            let cache = decode_to_cache(toolchain, path, Some((width, height)), info.frame_count)?;
            WatermarkAsset::Video(Arc::new(cache))
        }
    };
    Ok(Some(asset))
}

fn color_or_white(value: &str) -> [u8; 3] {
    parse_color(value).unwrap_or([255, 255, 255])
}

/// Ordered list of enabled effects, applied to every frame by a worker
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Box<dyn Effect>) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    /// Build the chain for a run
    ///
    /// Application order is fixed: orientation, crop, color adjust, watermark,
    /// subtitles, titles, picture-in-picture, color shift, background blur,
    /// phase scramble, texture noise, edge blur, periodic blur, fade, hash
    /// disruption, vignette, border, sticker, DCT perturbation.
    ///
    /// `rng` resolves the per-run choices (the fixed sticker pick) before
    /// any worker starts.
    pub fn from_config<R: Rng>(
        config: &Config,
        info: &VideoInfo,
        assets: EffectAssets,
        rng: &mut R,
    ) -> Self {
        let mut chain = Self::new();
        let EffectAssets {
            font,
            watermark,
            pip,
            stickers,
            subtitles,
        } = assets;
        let border = config.text.border_size;

        let geometry = &config.geometry;
        if config.flip() || geometry.rotation_angle != 0.0 {
            chain.push(Box::new(Orientation {
                flip: config.flip(),
                angle: geometry.rotation_angle,
            }));
        }
        if geometry.crop_percentage > 0.0 {
            chain.push(Box::new(CropResize {
                percentage: geometry.crop_percentage,
            }));
        }

        let photometric = &config.photometric;
        if photometric.sbc_enabled {
            chain.push(Box::new(Sbc {
                saturation: photometric.saturation,
                brightness: photometric.brightness,
                contrast: photometric.contrast,
            }));
        }

        if let Some(asset) = watermark {
            chain.push(Box::new(Watermark {
                asset,
                direction: config.watermark.direction,
                opacity: config.watermark.opacity,
            }));
        }

        if let (Some(track), Some(font)) = (subtitles, font.as_ref()) {
            if info.duration > config.subtitles.min_video_duration {
                let masks = track
                    .cues()
                    .iter()
                    .map(|cue| font.render(&cue.text, config.subtitles.font_size))
                    .collect();
                chain.push(Box::new(Subtitles {
                    track,
                    masks,
                    color: color_or_white(&config.subtitles.color),
                    border,
                    opacity: config.subtitles.opacity,
                }));
            } else {
                info!(
                    "Video is {:.1}s, not longer than {:.1}s: subtitles skipped",
                    info.duration, config.subtitles.min_video_duration
                );
            }
        }

        if config.titles.enabled {
            if let Some(font) = font.as_ref() {
                let titles = &config.titles;
                let render = |text: &str| {
                    let text = text.trim();
                    (!text.is_empty()).then(|| font.render(text, titles.font_size))
                };
                chain.push(Box::new(Titles {
                    top: render(&titles.top_text),
                    bottom: render(&titles.bottom_text),
                    top_margin: titles.top_margin,
                    bottom_margin: titles.bottom_margin,
                    color: color_or_white(&titles.color),
                    border,
                    opacity: titles.opacity,
                }));
            }
        }

        if let Some(cache) = pip {
            chain.push(Box::new(PictureInPicture {
                cache,
                opacity: config.pip.opacity,
            }));
        }

        if photometric.color_shift_enabled && photometric.color_shift_range > 0 {
            chain.push(Box::new(ColorShift {
                range: photometric.color_shift_range,
            }));
        }

        let blur = &config.blur;
        if blur.background_enabled {
            chain.push(Box::new(BackgroundBlur {
                top_percentage: blur.top_percentage,
                bottom_percentage: blur.bottom_percentage,
                side_percentage: blur.side_percentage,
            }));
        }

        let frequency = &config.frequency;
        if frequency.scramble_frequency > 0.0 {
            chain.push(Box::new(PhaseScramble {
                frequency: frequency.scramble_frequency,
            }));
        }
        if frequency.texture_noise_enabled {
            chain.push(Box::new(TextureNoise {
                strength: frequency.texture_noise_strength,
            }));
        }

        if blur.edge_enabled {
            chain.push(Box::new(EdgeBlur));
        }
        if blur.gaussian_interval > 0 {
            chain.push(Box::new(PeriodicBlur {
                interval: blur.gaussian_interval as usize,
                kernel_size: blur.gaussian_kernel_size as usize,
                area_percentage: blur.gaussian_area_percentage,
            }));
        }

        if config.fade.fade_in_frames > 0 || config.fade.fade_out_frames > 0 {
            chain.push(Box::new(Fade {
                fade_in_frames: config.fade.fade_in_frames as usize,
                fade_out_frames: config.fade.fade_out_frames as usize,
            }));
        }

        if config.hash.enabled {
            chain.push(Box::new(HashDisruption {
                border_pixels: config.hash.border_pixels,
                blocks: config.hash.blocks,
                block_size: config.hash.block_size,
            }));
        }

        if config.vignette.enabled {
            chain.push(Box::new(Vignette {
                strength: config.vignette.strength,
                radius: config.vignette.radius,
            }));
        }

        let border_config = &config.border;
        if border_config.enabled && border_config.width > 0 {
            chain.push(Box::new(DynamicBorder {
                width: border_config.width,
                style: border_config.style,
                start: color_or_white(&border_config.color_start),
                end: color_or_white(&border_config.color_end),
            }));
        }

        if let Some(set) = stickers {
            let choice = StickerChoice::resolve(config.sticker.change_interval, set.len(), rng);
            debug!("Sticker choice resolved: {:?}", choice);
            chain.push(Box::new(Sticker {
                set,
                choice,
                scale_range: config.sticker.scale_range,
                opacity: config.sticker.opacity,
                position: config.sticker.position,
            }));
        }

        if frequency.dct_enabled {
            chain.push(Box::new(DctPerturbation {
                strength: frequency.dct_noise_strength,
            }));
        }

        chain
    }

    /// Run every effect on `frame`
    ///
    /// A failing or panicking effect is logged and skipped; the frame
    /// continues through the rest of the chain.
    pub fn apply_all(&self, frame: &mut Frame, ctx: &FrameContext, seed: u64) {
        let mut rng = frame_rng(seed, ctx.index);
        for effect in &self.effects {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| effect.apply(frame, ctx, &mut rng)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Frame {}: {} skipped: {}", ctx.index, effect.name(), e),
                Err(payload) => warn!(
                    "Frame {}: {} panicked, skipped: {}",
                    ctx.index,
                    effect.name(),
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// RNG for one frame, derived from the run seed and the frame index only
pub fn frame_rng(seed: u64, index: usize) -> SmallRng {
    // splitmix64 finalizer
    let mut z = seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    SmallRng::seed_from_u64(z ^ (z >> 31))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EffectError;

    fn info() -> VideoInfo {
        VideoInfo {
            width: 64,
            height: 48,
            fps: 30.0,
            duration: 10.0,
            frame_count: 300,
            has_audio: false,
        }
    }

    struct AlwaysFails;

    impl Effect for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }

        fn apply(&self, _frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
            Err(EffectError::precondition("always_fails", "test").into())
        }
    }

    struct Panics;

    impl Effect for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
            let (width, _) = frame.dimensions();
            frame.get_pixel(width, 0);
            Ok(())
        }
    }

    struct Invert;

    impl Effect for Invert {
        fn name(&self) -> &str {
            "invert"
        }

        fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
            for value in frame.as_image_mut().iter_mut() {
                *value = 255 - *value;
            }
            Ok(())
        }
    }

    #[test]
    fn test_default_config_builds_empty_chain() {
        let mut rng = SmallRng::seed_from_u64(0);
        let chain = EffectChain::from_config(&Config::default(), &info(), EffectAssets::default(), &mut rng);
        assert!(chain.is_empty());

        let mut frame = Frame::new_filled(64, 48, [10, 20, 30]);
        let original = frame.clone();
        chain.apply_all(&mut frame, &FrameContext::new(0, 300, 30.0), 42);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_chain_order_follows_pipeline() {
        let mut config = Config::default();
        config.geometry.rotation_angle = 5.0;
        config.geometry.crop_percentage = 0.1;
        config.vignette.enabled = true;
        config.hash.enabled = true;
        config.frequency.dct_enabled = true;
        config.fade.fade_in_frames = 10;

        let mut rng = SmallRng::seed_from_u64(0);
        let chain = EffectChain::from_config(&config, &info(), EffectAssets::default(), &mut rng);
        assert_eq!(
            chain.names(),
            vec!["orientation", "crop_resize", "fade", "hash_disruption", "vignette", "dct_perturbation"]
        );
    }

    #[test]
    fn test_failing_effect_is_skipped() {
        let mut chain = EffectChain::new();
        chain.push(Box::new(AlwaysFails));
        chain.push(Box::new(Invert));

        let mut frame = Frame::new_filled(4, 4, [0, 100, 255]);
        chain.apply_all(&mut frame, &FrameContext::new(0, 1, 30.0), 0);
        assert_eq!(frame.get_pixel(0, 0), [255, 155, 0]);
    }

    #[test]
    fn test_panicking_effect_is_skipped() {
        let mut chain = EffectChain::new();
        chain.push(Box::new(Panics));
        chain.push(Box::new(Invert));

        let mut frame = Frame::new_filled(4, 4, [0, 100, 255]);
        chain.apply_all(&mut frame, &FrameContext::new(3, 10, 30.0), 0);
        assert_eq!(frame.get_pixel(0, 0), [255, 155, 0]);
    }

    #[test]
    fn test_frame_rng_depends_only_on_seed_and_index() {
        let a: u64 = frame_rng(9, 17).gen();
        let b: u64 = frame_rng(9, 17).gen();
        let c: u64 = frame_rng(9, 18).gen();
        let d: u64 = frame_rng(10, 17).gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_noisy_chain_is_deterministic_per_frame() {
        let mut config = Config::default();
        config.frequency.texture_noise_enabled = true;
        config.hash.enabled = true;
        let mut rng = SmallRng::seed_from_u64(0);
        let chain = EffectChain::from_config(&config, &info(), EffectAssets::default(), &mut rng);

        let ctx = FrameContext::new(5, 300, 30.0);
        let mut first = Frame::new_filled(64, 48, [100, 100, 100]);
        let mut second = first.clone();
        chain.apply_all(&mut first, &ctx, 1234);
        chain.apply_all(&mut second, &ctx, 1234);
        assert_eq!(first, second);
        assert_eq!(first.dimensions(), (64, 48));
    }
}
