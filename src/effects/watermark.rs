use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::{rngs::SmallRng, Rng};

use crate::{
    config::WatermarkDirection,
    effects::{color::blend, text::{draw_text, TextMask}, Effect},
    error::{EffectError, Result, SourceError},
    video::{
        frame_cache::FrameCache,
        types::{Frame, FrameContext},
    },
};

/// Safe distance kept between a moving watermark and the frame edge
pub const MARGIN: i64 = 20;

/// Top-left corner of a watermark for the given frame
///
/// Directional modes interpolate linearly between the two margin-bounded
/// endpoints, reaching the far endpoint on the last frame. `Random` draws a
/// fresh position within the margins on every frame.
pub fn watermark_position(
    direction: WatermarkDirection,
    ctx: &FrameContext,
    frame_size: (u32, u32),
    mark_size: (u32, u32),
    rng: &mut SmallRng,
) -> (i64, i64) {
    let (w, h) = (frame_size.0 as i64, frame_size.1 as i64);
    let (mw, mh) = (mark_size.0 as i64, mark_size.1 as i64);

    let range_x = w - mw - 2 * MARGIN;
    let range_y = h - mh - 2 * MARGIN;
    let center = ((w - mw) / 2, (h - mh) / 2);

    let progress = if ctx.total_frames > 1 {
        ctx.index.min(ctx.total_frames - 1) as f64 / (ctx.total_frames - 1) as f64
    } else {
        0.0
    };
    let forward_x = MARGIN + (range_x as f64 * progress) as i64;
    let backward_x = w - MARGIN - mw - (range_x as f64 * progress) as i64;
    let forward_y = MARGIN + (range_y as f64 * progress) as i64;
    let backward_y = h - MARGIN - mh - (range_y as f64 * progress) as i64;

    match direction {
        WatermarkDirection::Random => {
            let x = if range_x > 0 {
                rng.gen_range(MARGIN..=MARGIN + range_x)
            } else {
                MARGIN
            };
            let y = if range_y > 0 {
                rng.gen_range(MARGIN..=MARGIN + range_y)
            } else {
                MARGIN
            };
            (x, y)
        }
        WatermarkDirection::LeftToRight => (forward_x, center.1),
        WatermarkDirection::RightToLeft => (backward_x, center.1),
        WatermarkDirection::TopToBottom => (center.0, forward_y),
        WatermarkDirection::BottomToTop => (center.0, backward_y),
        WatermarkDirection::LtToRb => (forward_x, forward_y),
        WatermarkDirection::RtToLb => (backward_x, forward_y),
        WatermarkDirection::LbToRt => (forward_x, backward_y),
        WatermarkDirection::RbToLt => (backward_x, backward_y),
        WatermarkDirection::Center => center,
    }
}

/// Auto font size for a text watermark: `max(10, min(h / 20, w / chars))`
pub fn watermark_font_size(frame_size: (u32, u32), text: &str) -> f32 {
    let chars = text.chars().count().max(1) as u32;
    (frame_size.1 / 20).min(frame_size.0 / chars).max(10) as f32
}

/// Image watermark resized to a fifth of the frame width, with its alpha
/// channel pre-multiplied by the opacity
pub struct ImageMark {
    rgb: RgbImage,
    alpha: Vec<f32>,
}

impl ImageMark {
    pub fn load<P: AsRef<Path>>(path: P, frame_width: u32, opacity: f32) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|_| SourceError::OpenFailed {
            path: path.display().to_string(),
        })?;
        Ok(Self::from_rgba(image.to_rgba8(), frame_width, opacity))
    }

    pub fn from_rgba(image: image::RgbaImage, frame_width: u32, opacity: f32) -> Self {
        let (iw, ih) = image.dimensions();
        let width = (frame_width / 5).max(1);
        let height = ((ih as f64 * width as f64 / iw.max(1) as f64).round() as u32).max(1);
        let resized = imageops::resize(&image, width, height, FilterType::Triangle);

        let alpha = resized
            .pixels()
            .map(|p| p.0[3] as f32 / 255.0 * opacity)
            .collect();
        let rgb = RgbImage::from_fn(width, height, |x, y| {
            let p = resized.get_pixel(x, y).0;
            image::Rgb([p[0], p[1], p[2]])
        });
        Self { rgb, alpha }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }
}

/// Watermark payload with everything precomputed for the run
pub enum WatermarkAsset {
    Text {
        mask: TextMask,
        color: [u8; 3],
        border: u32,
    },
    Image(Arc<ImageMark>),
    /// Looping video, already scaled to watermark size
    Video(Arc<FrameCache>),
}

pub struct Watermark {
    pub asset: WatermarkAsset,
    pub direction: WatermarkDirection,
    pub opacity: f32,
}

impl Watermark {
    fn mark_size(&self) -> (u32, u32) {
        match &self.asset {
            WatermarkAsset::Text { mask, .. } => (mask.width(), mask.height()),
            WatermarkAsset::Image(mark) => mark.dimensions(),
            WatermarkAsset::Video(cache) => cache.dimensions(),
        }
    }
}

impl Effect for Watermark {
    fn name(&self) -> &str {
        "watermark"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        let (mw, mh) = self.mark_size();
        let (x, y) = watermark_position(self.direction, ctx, (width, height), (mw, mh), rng);

        match &self.asset {
            WatermarkAsset::Text { mask, color, border } => {
                let x = x.min(width as i64 - mw as i64).max(0);
                let y = y.min(height as i64 - mh as i64).max(0);
                draw_text(frame, mask, x, y, *color, *border, self.opacity);
            }
            WatermarkAsset::Image(mark) => {
                if x < 0 || y < 0 || x + mw as i64 > width as i64 || y + mh as i64 > height as i64 {
                    return Err(EffectError::precondition("watermark", "image mark outside frame").into());
                }
                for (mx, my, pixel) in mark.rgb.enumerate_pixels() {
                    let alpha = mark.alpha[(my * mw + mx) as usize];
                    let target = frame.get_pixel_mut(x as u32 + mx, y as u32 + my);
                    for c in 0..3 {
                        target[c] = blend(target[c], pixel.0[c], alpha);
                    }
                }
            }
            WatermarkAsset::Video(cache) => {
                if x < 0 || y < 0 || x + mw as i64 > width as i64 || y + mh as i64 > height as i64 {
                    return Err(EffectError::precondition("watermark", "video mark outside frame").into());
                }
                let source = cache.get(ctx.index);
                for (mx, my, pixel) in source.as_image().enumerate_pixels() {
                    let target = frame.get_pixel_mut(x as u32 + mx, y as u32 + my);
                    for c in 0..3 {
                        target[c] = blend(target[c], pixel.0[c], self.opacity);
                    }
                }
            }
        }
        Ok(())
    }
}
