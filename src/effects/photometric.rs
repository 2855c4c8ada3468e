use rand::{rngs::SmallRng, Rng};

use crate::{
    effects::{
        color::{hsv_to_rgb, rgb_to_hsv},
        Effect,
    },
    error::Result,
    video::types::{Frame, FrameContext},
};

/// Saturation, brightness and contrast adjustment
///
/// Contrast and brightness are a linear map `|contrast * v + brightness * 255|`,
/// saturation scales the HSV saturation channel.
pub struct Sbc {
    pub saturation: f32,
    pub brightness: f32,
    pub contrast: f32,
}

impl Effect for Sbc {
    fn name(&self) -> &str {
        "sbc"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let linear = self.contrast != 1.0 || self.brightness != 0.0;
        let beta = self.brightness * 255.0;

        if linear {
            for value in frame.as_image_mut().iter_mut() {
                *value = (self.contrast * *value as f32 + beta).abs().round().min(255.0) as u8;
            }
        }

        if self.saturation != 1.0 {
            for pixel in frame.as_image_mut().pixels_mut() {
                let (h, s, v) = rgb_to_hsv(pixel.0);
                pixel.0 = hsv_to_rgb(h, (s * self.saturation).clamp(0.0, 1.0), v);
            }
        }
        Ok(())
    }
}

/// Opposite per-frame shift of the blue and green channels
pub struct ColorShift {
    pub range: u8,
}

impl Effect for ColorShift {
    fn name(&self) -> &str {
        "color_shift"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, rng: &mut SmallRng) -> Result<()> {
        let range = self.range as i16;
        let shift = rng.gen_range(-range..=range);
        if shift == 0 {
            return Ok(());
        }

        for pixel in frame.as_image_mut().pixels_mut() {
            pixel.0[2] = (pixel.0[2] as i16 + shift).clamp(0, 255) as u8;
            pixel.0[1] = (pixel.0[1] as i16 - shift).clamp(0, 255) as u8;
        }
        Ok(())
    }
}

/// Fade from black over the first frames and to black over the last
pub struct Fade {
    pub fade_in_frames: usize,
    pub fade_out_frames: usize,
}

impl Fade {
    /// Brightness factor for the frame, `None` when untouched
    pub fn alpha(&self, index: usize, total_frames: usize) -> Option<f32> {
        if index < self.fade_in_frames {
            Some(index as f32 / self.fade_in_frames as f32)
        } else if self.fade_out_frames > 0 && index + self.fade_out_frames >= total_frames {
            Some(total_frames.saturating_sub(index) as f32 / self.fade_out_frames as f32)
        } else {
            None
        }
    }
}

impl Effect for Fade {
    fn name(&self) -> &str {
        "fade"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        if let Some(alpha) = self.alpha(ctx.index, ctx.total_frames) {
            frame.scale(alpha.clamp(0.0, 1.0));
        }
        Ok(())
    }
}

/// Radial darkening towards the corners
pub struct Vignette {
    pub strength: f32,
    pub radius: f32,
}

impl Vignette {
    /// Attenuation factor at `(x, y)` for a `width` x `height` frame, in `[0, 1]`
    pub fn mask(&self, x: f32, y: f32, width: u32, height: u32) -> f32 {
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let max_dist = (cx * cx + cy * cy).sqrt();
        if max_dist == 0.0 {
            return 1.0;
        }

        let dist = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / max_dist;
        (1.0 - self.strength * (dist / self.radius).powi(2)).clamp(0.0, 1.0)
    }
}

impl Effect for Vignette {
    fn name(&self) -> &str {
        "vignette"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        for (x, y, pixel) in frame.as_image_mut().enumerate_pixels_mut() {
            let factor = self.mask(x as f32, y as f32, width, height);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * factor) as u8;
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
    fn test_vignette_center_is_unattenuated() {
        for (strength, radius) in [(0.0, 0.3), (0.3, 0.8), (1.0, 0.3), (1.0, 2.0)] {
            let vignette = Vignette { strength, radius };
            assert_eq!(vignette.mask(640.0, 360.0, 1280, 720), 1.0);
            assert_eq!(vignette.mask(50.5, 25.0, 101, 50), 1.0);
        }
    }

    #[test]
    fn test_vignette_darkens_corners() {
        let vignette = Vignette {
            strength: 0.5,
            radius: 1.0,
        };
        let corner = vignette.mask(0.0, 0.0, 100, 100);
        assert!((corner - 0.5).abs() < 1e-5);

        let mut frame = Frame::new_filled(100, 100, [200, 200, 200]);
        let ctx = FrameContext::new(0, 1, 30.0);
        vignette.apply(&mut frame, &ctx, &mut SmallRng::seed_from_u64(0)).unwrap();
        assert_eq!(frame.get_pixel(50, 50), [200, 200, 200]);
        assert!(frame.get_pixel(0, 0)[0] <= 100);
    }

    #[test]
    fn test_fade_alpha_ramps() {
        let fade = Fade {
            fade_in_frames: 5,
            fade_out_frames: 20,
        };
        assert_eq!(fade.alpha(0, 100), Some(0.0));
        assert_eq!(fade.alpha(4, 100), Some(0.8));
        assert_eq!(fade.alpha(50, 100), None);
        assert_eq!(fade.alpha(80, 100), Some(1.0));
        assert_eq!(fade.alpha(99, 100), Some(0.05));

        let off = Fade {
            fade_in_frames: 0,
            fade_out_frames: 0,
        };
        assert_eq!(off.alpha(99, 100), None);
    }

    #[test]
    fn test_neutral_sbc_is_identity() {
        let mut frame = Frame::new_filled(8, 8, [12, 140, 250]);
        let original = frame.clone();
        let sbc = Sbc {
            saturation: 1.0,
            brightness: 0.0,
            contrast: 1.0,
        };
        sbc.apply(&mut frame, &FrameContext::new(0, 1, 30.0), &mut SmallRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_color_shift_moves_blue_and_green_oppositely() {
        let shift = ColorShift { range: 10 };
        let ctx = FrameContext::new(0, 1, 30.0);
        let mut frame = Frame::new_filled(4, 4, [100, 100, 100]);
        shift.apply(&mut frame, &ctx, &mut SmallRng::seed_from_u64(42)).unwrap();

        let [r, g, b] = frame.get_pixel(0, 0);
        assert_eq!(r, 100);
        assert_eq!(b as i16 - 100, 100 - g as i16);
    }
}
