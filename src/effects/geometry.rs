use image::imageops::{self, FilterType};
use rand::rngs::SmallRng;

use crate::{
    error::Result,
    effects::Effect,
    video::types::{Frame, FrameContext},
};

/// Horizontal mirror followed by a rotation about the frame center
///
/// Rotation keeps the frame size; corners uncovered by the rotated image are black.
pub struct Orientation {
    pub flip: bool,
    /// Degrees, positive is counter-clockwise
    pub angle: f32,
}

impl Orientation {
    fn rotate(&self, frame: &mut Frame) {
        let (width, height) = frame.dimensions();
        let source = frame.as_image().clone();

        let theta = self.angle.to_radians();
        let (sin, cos) = theta.sin_cos();
        let cx = (width / 2) as f32;
        let cy = (height / 2) as f32;

        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let sx = cos * dx - sin * dy + cx;
                let sy = sin * dx + cos * dy + cy;
                let rgb = sample_bilinear(&source, sx, sy).unwrap_or([0, 0, 0]);
                frame.set_pixel(x, y, rgb);
            }
        }
    }
}

impl Effect for Orientation {
    fn name(&self) -> &str {
        "orientation"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        if self.flip {
            imageops::flip_horizontal_in_place(frame.as_image_mut());
        }
        if self.angle != 0.0 {
            self.rotate(frame);
        }
        Ok(())
    }
}

/// Bilinear sample, `None` outside the image
fn sample_bilinear(image: &image::RgbImage, x: f32, y: f32) -> Option<[u8; 3]> {
    let (width, height) = image.dimensions();
    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }
    Some(out)
}

/// Trim a fixed fraction from every side, then resize back to the original size
pub struct CropResize {
    pub percentage: f32,
}

impl Effect for CropResize {
    fn name(&self) -> &str {
        "crop_resize"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        let crop_w = (width as f32 * self.percentage) as u32;
        let crop_h = (height as f32 * self.percentage) as u32;

        if (crop_w == 0 && crop_h == 0) || 2 * crop_w >= width || 2 * crop_h >= height {
            return Ok(());
        }

        let cropped = imageops::crop_imm(
            frame.as_image(),
            crop_w,
            crop_h,
            width - 2 * crop_w,
            height - 2 * crop_h,
        )
        .to_image();
        *frame = Frame::new(imageops::resize(&cropped, width, height, FilterType::Triangle));
        Ok(())
    }
}
