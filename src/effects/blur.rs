use std::collections::VecDeque;

use image::RgbImage;
use rand::rngs::SmallRng;

use crate::{
    effects::Effect,
    error::Result,
    video::types::{Frame, FrameContext},
};

const BACKGROUND_KERNEL: usize = 21;
const EDGE_KERNEL: usize = 21;
const CANNY_LOW: f32 = 100.0;
const CANNY_HIGH: f32 = 200.0;

/// Normalized 1D gaussian kernel of odd `size`
///
/// Sigma is derived from the size the same way common imaging libraries do
/// when no explicit sigma is given.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let size = size.max(1) | 1;
    if size == 1 {
        return vec![1.0];
    }

    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as isize;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
#[inline]
fn reflect101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}

/// Separable convolution over an interleaved buffer
fn convolve_separable(data: &mut [f32], width: usize, height: usize, channels: usize, kernel: &[f32]) {
    if kernel.len() <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = (kernel.len() / 2) as isize;
    let mut tmp = vec![0.0f32; data.len()];

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = reflect101(x as isize + k as isize - half, width);
                    acc += data[(y * width + sx) * channels + c] * weight;
                }
                tmp[(y * width + x) * channels + c] = acc;
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = reflect101(y as isize + k as isize - half, height);
                    acc += tmp[(sy * width + x) * channels + c] * weight;
                }
                data[(y * width + x) * channels + c] = acc;
            }
        }
    }
}

/// Gaussian-blur a rectangle of the image in place, treating it as isolated
pub fn blur_rect(image: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, kernel_size: usize) {
    let (width, height) = image.dimensions();
    let w = w.min(width.saturating_sub(x0));
    let h = h.min(height.saturating_sub(y0));
    if w == 0 || h == 0 {
        return;
    }

    let mut region = Vec::with_capacity(w as usize * h as usize * 3);
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            region.extend(image.get_pixel(x, y).0.iter().map(|&v| v as f32));
        }
    }

    convolve_separable(&mut region, w as usize, h as usize, 3, &gaussian_kernel(kernel_size));

    for y in 0..h {
        for x in 0..w {
            let i = ((y * w + x) * 3) as usize;
            let pixel = image.get_pixel_mut(x0 + x, y0 + y);
            for c in 0..3 {
                pixel.0[c] = region[i + c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Blur the whole frame
pub fn blur_frame(frame: &Frame, kernel_size: usize) -> Frame {
    let mut out = frame.clone();
    let (width, height) = out.dimensions();
    blur_rect(out.as_image_mut(), 0, 0, width, height, kernel_size);
    out
}

/// Blur the four border bands given as fractions of the frame size
fn blur_bands(frame: &mut Frame, top: u32, bottom: u32, side: u32, kernel_size: usize) {
    let (width, height) = frame.dimensions();
    let image = frame.as_image_mut();
    blur_rect(image, 0, 0, width, top, kernel_size);
    blur_rect(image, 0, height.saturating_sub(bottom), width, bottom, kernel_size);
    blur_rect(image, 0, 0, side, height, kernel_size);
    blur_rect(image, width.saturating_sub(side), 0, side, height, kernel_size);
}

/// Fixed-kernel blur of the frame's outer bands
pub struct BackgroundBlur {
    pub top_percentage: u32,
    pub bottom_percentage: u32,
    pub side_percentage: u32,
}

impl Effect for BackgroundBlur {
    fn name(&self) -> &str {
        "background_blur"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        let top = height * self.top_percentage / 100;
        let bottom = height * self.bottom_percentage / 100;
        let side = width * self.side_percentage / 100;
        blur_bands(frame, top, bottom, side, BACKGROUND_KERNEL);
        Ok(())
    }
}

/// Border-band blur applied only on every `interval`-th frame
pub struct PeriodicBlur {
    pub interval: usize,
    pub kernel_size: usize,
    pub area_percentage: u32,
}

impl Effect for PeriodicBlur {
    fn name(&self) -> &str {
        "periodic_blur"
    }

    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        if self.interval == 0 || ctx.index % self.interval != 0 {
            return Ok(());
        }
        let (width, height) = frame.dimensions();
        let band_h = height * self.area_percentage / 100;
        let band_w = width * self.area_percentage / 100;
        blur_bands(frame, band_h, band_h, band_w, self.kernel_size);
        Ok(())
    }
}

/// Soft glow along detected edges: `0.9 * frame + 0.1 * blur(edges)`
pub struct EdgeBlur;

impl Effect for EdgeBlur {
    fn name(&self) -> &str {
        "edge_blur"
    }

    fn apply(&self, frame: &mut Frame, _ctx: &FrameContext, _rng: &mut SmallRng) -> Result<()> {
        let (width, height) = frame.dimensions();
        let mut edges = canny_edges(frame.as_image());
        convolve_separable(
            &mut edges,
            width as usize,
            height as usize,
            1,
            &gaussian_kernel(EDGE_KERNEL),
        );

        for (i, pixel) in frame.as_image_mut().pixels_mut().enumerate() {
            let glow = edges[i] * 0.1;
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * 0.9 + glow).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(())
    }
}

/// Binary edge map (0 or 255) from Sobel gradients, non-maximum suppression
/// and hysteresis thresholding
pub fn canny_edges(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let gray: Vec<f32> = image
        .pixels()
        .map(|p| 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
        .collect();

    let at = |x: isize, y: isize| gray[reflect101(y, h) * w + reflect101(x, w)];
    let mut magnitude = vec![0.0f32; w * h];
    let mut direction = vec![0u8; w * h];

    for y in 0..h as isize {
        for x in 0..w as isize {
            let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x - 1, y)
                - at(x - 1, y + 1);
            let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x, y - 1)
                - at(x + 1, y - 1);
            let i = y as usize * w + x as usize;
            magnitude[i] = gx.abs() + gy.abs();

            // Quantize the gradient angle into 0°, 45°, 90° or 135°
            let angle = gy.atan2(gx).to_degrees().rem_euclid(180.0);
            direction[i] = match angle {
                a if !(22.5..157.5).contains(&a) => 0,
                a if a < 67.5 => 1,
                a if a < 112.5 => 2,
                _ => 3,
            };
        }
    }

    let mut strength = vec![0u8; w * h];
    let mut queue = VecDeque::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let i = y * w + x;
            let m = magnitude[i];
            if m < CANNY_LOW {
                continue;
            }
            let (a, b) = match direction[i] {
                0 => (i - 1, i + 1),
                1 => (i - w + 1, i + w - 1),
                2 => (i - w, i + w),
                _ => (i - w - 1, i + w + 1),
            };
            if m < magnitude[a] || m < magnitude[b] {
                continue;
            }
            if m >= CANNY_HIGH {
                strength[i] = 2;
                queue.push_back(i);
            } else {
                strength[i] = 1;
            }
        }
    }

    while let Some(i) = queue.pop_front() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if strength[j] == 1 {
                    strength[j] = 2;
                    queue.push_back(j);
                }
            }
        }
    }

    strength
        .into_iter()
        .map(|s| if s == 2 { 255.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        for size in [3, 5, 21, 51] {
            let kernel = gaussian_kernel(size);
            assert_eq!(kernel.len(), size);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!((kernel[0] - kernel[size - 1]).abs() < 1e-7);
        }
        assert_eq!(gaussian_kernel(1), vec![1.0]);
    }

    #[test]
    fn test_blur_preserves_flat_regions() {
        let mut frame = Frame::new_filled(30, 20, [90, 120, 200]);
        let original = frame.clone();
        let ctx = FrameContext::new(0, 10, 30.0);
        BackgroundBlur {
            top_percentage: 10,
            bottom_percentage: 10,
            side_percentage: 10,
        }
        .apply(&mut frame, &ctx, &mut SmallRng::seed_from_u64(0))
        .unwrap();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_periodic_blur_skips_off_interval_frames() {
        let mut frame = Frame::new_black(20, 20);
        frame.set_pixel(0, 0, [255, 255, 255]);
        let original = frame.clone();
        let blur = PeriodicBlur {
            interval: 15,
            kernel_size: 3,
            area_percentage: 20,
        };

        let mut rng = SmallRng::seed_from_u64(0);
        blur.apply(&mut frame, &FrameContext::new(7, 100, 30.0), &mut rng).unwrap();
        assert_eq!(frame, original);

        blur.apply(&mut frame, &FrameContext::new(15, 100, 30.0), &mut rng).unwrap();
        assert_ne!(frame, original);
    }

    #[test]
    fn test_canny_finds_vertical_step() {
        let mut frame = Frame::new_black(16, 16);
        for y in 0..16 {
            for x in 8..16 {
                frame.set_pixel(x, y, [255, 255, 255]);
            }
        }
        let edges = canny_edges(frame.as_image());
        let row: Vec<f32> = (0..16).map(|x| edges[8 * 16 + x]).collect();
        assert!(row.iter().any(|&v| v == 255.0));
        assert_eq!(row[2], 0.0);
        assert_eq!(row[13], 0.0);
    }
}
