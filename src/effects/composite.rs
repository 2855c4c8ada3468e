//! Overlays composited onto the frame: titles, subtitles, picture-in-picture
//! and stickers

use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rand::{rngs::SmallRng, Rng};
use tracing::debug;

use crate::{
    config::StickerPosition,
    effects::{
        color::blend,
        text::{draw_text, TextMask},
        Effect,
    },
    error::{ConfigError, EffectError, Result},
    subtitles::SubtitleTrack,
    video::{
        frame_cache::FrameCache,
        types::{Frame, FrameContext},
    },
};

const SUBTITLE_BOTTOM_GAP: i64 = 20;
const STICKER_MARGIN: i64 = 10;
const STICKER_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Static top and bottom titles, horizontally centered
pub struct Titles {
    pub top: Option<TextMask>,
    pub bottom: Option<TextMask>,
    /// Percent of frame height
    pub top_margin: u32,
    pub bottom_margin: u32,
    pub color: [u8; 3],
    pub border: u32,
    pub opacity: f32,
}

impl Effect for Titles {
    fn name(&self) -> &str {
        "titles"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let (width, height) = (frame.width() as i64, frame.height() as i64);

        if let Some(mask) = &self.top {
            let x = (width - mask.width() as i64) / 2;
            let y = height * self.top_margin as i64 / 100;
            draw_text(frame, mask, x, y, self.color, self.border, self.opacity);
        }
        if let Some(mask) = &self.bottom {
            let x = (width - mask.width() as i64) / 2;
            let y = height - mask.height() as i64 - height * self.bottom_margin as i64 / 100;
            draw_text(frame, mask, x, y, self.color, self.border, self.opacity);
        }
        Ok(())
    }
}

/// Timed subtitles drawn near the bottom edge
///
/// Every cue is rasterized once up front; `masks[i]` belongs to cue `i`.
pub struct Subtitles {
    pub track: SubtitleTrack,
    pub masks: Vec<TextMask>,
    pub color: [u8; 3],
    pub border: u32,
    pub opacity: f32,
}

impl Effect for Subtitles {
    fn name(&self) -> &str {
        "subtitles"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let Some((index, _)) = self.track.cue_at(ctx.seconds()) else {
            return Ok(());
        };
        let mask = self.masks.get(index).ok_or_else(|| {
            EffectError::precondition("subtitles", format!("no raster for cue {}", index))
        })?;

        let (width, height) = (frame.width() as i64, frame.height() as i64);
        let x = (width - mask.width() as i64) / 2;
        let y = height - mask.height() as i64 - SUBTITLE_BOTTOM_GAP;
        draw_text(frame, mask, x, y, self.color, self.border, self.opacity);
        Ok(())
    }
}

/// Centered, semi-transparent overlay of a looping secondary video
///
/// The cache is pre-scaled to the overlay size; frame `i` shows cached frame
/// `i mod len`.
pub struct PictureInPicture {
    pub cache: Arc<FrameCache>,
    pub opacity: f32,
}

impl Effect for PictureInPicture {
    fn name(&self) -> &str {
        "picture_in_picture"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        let overlay = self.cache.get(ctx.index);
        let (ow, oh) = overlay.dimensions();

        if ow > width || oh > height {
            *frame = Frame::new(imageops::resize(
                overlay.as_image(),
                width,
                height,
                FilterType::Triangle,
            ));
            return Ok(());
        }

        let x0 = (width - ow) / 2;
        let y0 = (height - oh) / 2;
        for (x, y, pixel) in overlay.as_image().enumerate_pixels() {
            let target = frame.get_pixel_mut(x0 + x, y0 + y);
            for c in 0..3 {
                target[c] = blend(target[c], pixel.0[c], self.opacity);
            }
        }
        Ok(())
    }
}

/// Sticker images loaded from a folder, in file-name order
pub struct StickerSet {
    stickers: Vec<RgbaImage>,
}

impl StickerSet {
    pub fn load_dir<P: AsRef<Path>>(folder: P) -> Result<Self> {
        let folder = folder.as_ref();
        let entries = std::fs::read_dir(folder).map_err(|_| ConfigError::MissingAsset {
            key: "sticker.folder".to_string(),
            path: folder.display().to_string(),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| STICKER_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut stickers = Vec::with_capacity(paths.len());
        for path in paths {
            match image::open(&path) {
                Ok(image) => stickers.push(image.to_rgba8()),
                Err(e) => debug!("Skipping unreadable sticker {:?}: {}", path, e),
            }
        }
        Ok(Self { stickers })
    }

    pub fn from_images(stickers: Vec<RgbaImage>) -> Self {
        Self { stickers }
    }

    pub fn len(&self) -> usize {
        self.stickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stickers.is_empty()
    }
}

/// How the sticker for a frame is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickerChoice {
    /// `(index / interval) mod count`
    Switching { interval: usize },
    /// One sticker for the whole run, picked before workers start
    Fixed(usize),
}

impl StickerChoice {
    pub fn resolve(interval: u32, count: usize, rng: &mut impl Rng) -> Self {
        if interval > 0 {
            Self::Switching {
                interval: interval as usize,
            }
        } else {
            Self::Fixed(rng.gen_range(0..count.max(1)))
        }
    }

    pub fn pick(&self, frame_index: usize, count: usize) -> usize {
        match *self {
            Self::Switching { interval } => (frame_index / interval) % count,
            Self::Fixed(index) => index % count,
        }
    }
}

pub struct Sticker {
    pub set: Arc<StickerSet>,
    pub choice: StickerChoice,
    pub scale_range: (f32, f32),
    pub opacity: f32,
    pub position: StickerPosition,
}

impl Effect for Sticker {
    fn name(&self) -> &str {
        "sticker"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        if self.set.is_empty() {
            return Err(EffectError::precondition("sticker", "no readable stickers").into());
        }
        let (width, height) = (frame.width() as i64, frame.height() as i64);
        let source = &self.set.stickers[self.choice.pick(ctx.index, self.set.len())];

        let (lo, hi) = self.scale_range;
        let scale = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        let sw = ((width as f32 * scale) as i64).max(1);
        let sh = ((source.height() as i64 * sw) / source.width().max(1) as i64).max(1);
        if sw > width || sh > height {
            return Err(EffectError::precondition("sticker", "sticker larger than frame").into());
        }
        let sticker = imageops::resize(source, sw as u32, sh as u32, FilterType::Lanczos3);

        let m = STICKER_MARGIN;
        let (x, y) = match self.position {
            StickerPosition::Corner => match rng.gen_range(0..4) {
                0 => (m, m),
                1 => (width - sw - m, m),
                2 => (m, height - sh - m),
                _ => (width - sw - m, height - sh - m),
            },
            StickerPosition::Random => {
                let x = if width - sw - m > m { rng.gen_range(m..=width - sw - m) } else { m };
                let y = if height - sh - m > m { rng.gen_range(m..=height - sh - m) } else { m };
                (x, y)
            }
        };
        let x = x.min(width - sw).max(0) as u32;
        let y = y.min(height - sh).max(0) as u32;

        for (sx, sy, pixel) in sticker.enumerate_pixels() {
            let alpha = pixel.0[3] as f32 / 255.0 * self.opacity;
            if alpha <= 0.0 {
                continue;
            }
            let target = frame.get_pixel_mut(x + sx, y + sy);
            for c in 0..3 {
                target[c] = blend(target[c], pixel.0[c], alpha);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::SubtitleCue;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn block(size: u32) -> TextMask {
        TextMask::from_coverage(size, size, vec![1.0; (size * size) as usize]).unwrap()
    }

    #[test]
    fn test_titles_placement() {
        let titles = Titles {
            top: Some(block(10)),
            bottom: Some(block(10)),
            top_margin: 10,
            bottom_margin: 10,
            color: [255, 0, 0],
            border: 0,
            opacity: 1.0,
        };
        let mut frame = Frame::new_black(100, 100);
        titles
            .apply(&mut frame, &FrameContext::new(0, 1, 30.0), &mut SmallRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(frame.get_pixel(45, 10), [255, 0, 0]);
        assert_eq!(frame.get_pixel(45, 9), [0, 0, 0]);
        assert_eq!(frame.get_pixel(45, 89), [255, 0, 0]);
        assert_eq!(frame.get_pixel(45, 90), [0, 0, 0]);
    }

    #[test]
    fn test_subtitles_follow_time() {
        let track = SubtitleTrack::from_cues(vec![SubtitleCue {
            start: 1.0,
            end: 2.0,
            text: "hi".to_string(),
        }]);
        let subtitles = Subtitles {
            track,
            masks: vec![block(4)],
            color: [255, 255, 0],
            border: 0,
            opacity: 1.0,
        };
        let mut rng = SmallRng::seed_from_u64(0);

        let mut before = Frame::new_black(40, 40);
        subtitles.apply(&mut before, &FrameContext::new(10, 100, 30.0), &mut rng).unwrap();
        assert_eq!(before, Frame::new_black(40, 40));

        let mut during = Frame::new_black(40, 40);
        subtitles.apply(&mut during, &FrameContext::new(45, 100, 30.0), &mut rng).unwrap();
        // x = (40 - 4) / 2, y = 40 - 4 - 20
        assert_eq!(during.get_pixel(18, 16), [255, 255, 0]);
    }

    #[test]
    fn test_pip_blends_centered_overlay() {
        let cache = FrameCache::new(vec![
            Frame::new_filled(10, 10, [200, 200, 200]),
            Frame::new_filled(10, 10, [100, 0, 0]),
        ])
        .unwrap();
        let pip = PictureInPicture {
            cache: Arc::new(cache),
            opacity: 0.5,
        };
        let mut frame = Frame::new_black(20, 20);
        pip.apply(&mut frame, &FrameContext::new(1, 5, 30.0), &mut SmallRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(frame.get_pixel(10, 10), [50, 0, 0]);
        assert_eq!(frame.get_pixel(2, 2), [0, 0, 0]);
    }

    #[test]
    fn test_sticker_choice() {
        let switching = StickerChoice::Switching { interval: 60 };
        assert_eq!(switching.pick(0, 3), 0);
        assert_eq!(switching.pick(61, 3), 1);
        assert_eq!(switching.pick(185, 3), 0);

        let mut rng = SmallRng::seed_from_u64(4);
        let fixed = StickerChoice::resolve(0, 5, &mut rng);
        let first = fixed.pick(0, 5);
        assert!((0..1000).all(|i| fixed.pick(i, 5) == first));
    }

    #[test]
    fn test_sticker_lands_in_a_corner() {
        let set = StickerSet::from_images(vec![RgbaImage::from_pixel(
            8,
            8,
            image::Rgba([0, 255, 0, 255]),
        )]);
        let sticker = Sticker {
            set: Arc::new(set),
            choice: StickerChoice::Fixed(0),
            scale_range: (0.1, 0.1),
            opacity: 1.0,
            position: StickerPosition::Corner,
        };
        let mut frame = Frame::new_black(100, 100);
        sticker
            .apply(&mut frame, &FrameContext::new(0, 1, 30.0), &mut SmallRng::seed_from_u64(3))
            .unwrap();

        let corners = [(12, 12), (87, 12), (12, 87), (87, 87)];
        let painted = corners
            .iter()
            .filter(|(x, y)| frame.get_pixel(*x, *y)[1] > 200)
            .count();
        assert_eq!(painted, 1);
        assert_eq!(frame.get_pixel(50, 50), [0, 0, 0]);
    }

    #[test]
    fn test_sticker_folder_filters_extensions() {
        let dir = tempdir().unwrap();
        RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let set = StickerSet::load_dir(dir.path()).unwrap();
        assert_eq!(set.len(), 1);
    }
}
