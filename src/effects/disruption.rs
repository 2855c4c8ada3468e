use rand::{rngs::SmallRng, Rng};
use rand_distr::StandardNormal;

use crate::{
    config::BorderStyle,
    effects::{
        color::{blend, hsv_to_rgb, lerp_color},
        Effect,
    },
    error::Result,
    video::types::{Frame, FrameContext},
};

const PIXEL_FLIP_PROBABILITY: f64 = 0.3;

/// Perceptual-hash disruption
///
/// Randomizes pixels in a thin band along all four edges and alpha-blends a
/// few small random-colored blocks into the corner quadrants.
pub struct HashDisruption {
    pub border_pixels: u32,
    pub blocks: u32,
    pub block_size: u32,
}

impl HashDisruption {
    fn randomize_border(&self, frame: &mut Frame, rng: &mut SmallRng) {
        let (width, height) = frame.dimensions();
        let band = self.border_pixels.min(width / 2).min(height / 2);

        for y in 0..height {
            let in_row_band = y < band || y >= height - band;
            for x in 0..width {
                let in_band = in_row_band || x < band || x >= width - band;
                if in_band && rng.gen_bool(PIXEL_FLIP_PROBABILITY) {
                    frame.set_pixel(x, y, [rng.gen(), rng.gen(), rng.gen()]);
                }
            }
        }
    }

    fn blend_blocks(&self, frame: &mut Frame, rng: &mut SmallRng) {
        let (width, height) = (frame.width() as i64, frame.height() as i64);
        let bs = self.block_size as i64;
        let px = self.border_pixels as i64;
        if bs > width || bs > height {
            return;
        }

        let span = |rng: &mut SmallRng, lo: i64, hi: i64| {
            if hi > lo {
                rng.gen_range(lo..=hi)
            } else {
                lo
            }
        };

        for _ in 0..self.blocks {
            let (x, y) = match rng.gen_range(0..4) {
                0 => (span(rng, px, width / 4), span(rng, px, height / 4)),
                1 => (span(rng, 3 * width / 4, width - bs - px), span(rng, px, height / 4)),
                2 => (span(rng, px, width / 4), span(rng, 3 * height / 4, height - bs - px)),
                _ => (
                    span(rng, 3 * width / 4, width - bs - px),
                    span(rng, 3 * height / 4, height - bs - px),
                ),
            };
            let x = x.min(width - bs).max(0) as u32;
            let y = y.min(height - bs).max(0) as u32;

            let color: [u8; 3] = [rng.gen(), rng.gen(), rng.gen()];
            let alpha: f32 = rng.gen_range(0.1..0.3);
            for by in y..y + bs as u32 {
                for bx in x..x + bs as u32 {
                    let pixel = frame.get_pixel_mut(bx, by);
                    for c in 0..3 {
                        pixel[c] = blend(pixel[c], color[c], alpha);
                    }
                }
            }
        }
    }
}

impl Effect for HashDisruption {
    fn name(&self) -> &str {
        "hash_disruption"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        self.randomize_border(frame, rng);
        self.blend_blocks(frame, rng);
        Ok(())
    }
}

/// Additive gaussian noise, `N(0, 1) * strength` levels per channel
///
/// The noise is rounded to the nearest level rather than truncated, so it
/// stays zero-mean and a strength below 0.5 rarely moves a pixel.
pub struct TextureNoise {
    pub strength: f32,
}

impl Effect for TextureNoise {
    fn name(&self) -> &str {
        "texture_noise"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        for value in frame.as_image_mut().iter_mut() {
            let noise: f32 = rng.sample(StandardNormal);
            let delta = (noise * self.strength).round().clamp(-255.0, 255.0);
            *value = (*value as f32 + delta).clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }
}

/// Frame border painted in a color that changes over the run
pub struct DynamicBorder {
    pub width: u32,
    pub style: BorderStyle,
    pub start: [u8; 3],
    pub end: [u8; 3],
}

impl DynamicBorder {
    /// Border color at `progress` in `[0, 1)`
    pub fn color_at(&self, progress: f64) -> [u8; 3] {
        match self.style {
            BorderStyle::Solid => self.start,
            BorderStyle::Gradient => {
                let t = ((progress * 2.0 * std::f64::consts::PI).sin() + 1.0) / 2.0;
                lerp_color(self.start, self.end, t as f32)
            }
            BorderStyle::Rainbow => {
                // Half-degree hue steps, one full sweep per run
                let hue = ((progress * 180.0) as i64).rem_euclid(180);
                hsv_to_rgb(hue as f32 * 2.0, 1.0, 1.0)
            }
        }
    }
}

impl Effect for DynamicBorder {
    fn name(&self) -> &str {
        "dynamic_border"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        if self.width == 0 {
            return Ok(());
        }
        let progress = ctx.index as f64 / ctx.total_frames.max(1) as f64;
        let color = self.color_at(progress);

        let (width, height) = frame.dimensions();
        let bw = self.width.min(width).min(height);
        for y in 0..height {
            for x in 0..width {
                if y < bw || y >= height - bw || x < bw || x >= width - bw {
                    frame.set_pixel(x, y, color);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_hash_disruption_confined_to_edges_and_corners() {
        let mut frame = Frame::new_filled(200, 200, [128, 128, 128]);
        let effect = HashDisruption {
            border_pixels: 2,
            blocks: 10,
            block_size: 3,
        };
        effect
            .apply(&mut frame, &FrameContext::new(0, 1, 30.0), &mut SmallRng::seed_from_u64(11))
            .unwrap();

        // The central cross between the corner quadrants is untouched
        for i in 60..140 {
            assert_eq!(frame.get_pixel(100, i), [128, 128, 128]);
            assert_eq!(frame.get_pixel(i, 100), [128, 128, 128]);
        }
        let changed_edge = (0..200).filter(|&x| frame.get_pixel(x, 0) != [128, 128, 128]).count();
        assert!(changed_edge > 20 && changed_edge < 120);
    }

    #[test]
    fn test_border_styles() {
        let mut border = DynamicBorder {
            width: 3,
            style: BorderStyle::Solid,
            start: [255, 107, 107],
            end: [78, 205, 196],
        };
        assert_eq!(border.color_at(0.4), [255, 107, 107]);

        border.style = BorderStyle::Gradient;
        assert_eq!(border.color_at(0.0), lerp_color(border.start, border.end, 0.5));
        assert_eq!(border.color_at(0.25), border.end);
        assert_eq!(border.color_at(0.75), border.start);

        border.style = BorderStyle::Rainbow;
        assert_eq!(border.color_at(0.0), [255, 0, 0]);
        assert_eq!(border.color_at(1.0 / 3.0), [0, 255, 0]);
    }

    #[test]
    fn test_border_paints_only_bands() {
        let border = DynamicBorder {
            width: 2,
            style: BorderStyle::Solid,
            start: [9, 9, 9],
            end: [0, 0, 0],
        };
        let mut frame = Frame::new_black(10, 10);
        border
            .apply(&mut frame, &FrameContext::new(0, 10, 30.0), &mut SmallRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(frame.get_pixel(0, 5), [9, 9, 9]);
        assert_eq!(frame.get_pixel(8, 5), [9, 9, 9]);
        assert_eq!(frame.get_pixel(5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_zero_strength_noise_is_identity() {
        let mut frame = Frame::new_filled(6, 6, [3, 128, 252]);
        let original = frame.clone();
        TextureNoise { strength: 0.0 }
            .apply(&mut frame, &FrameContext::new(0, 1, 30.0), &mut SmallRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(frame, original);
    }
}
