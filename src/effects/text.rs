use std::path::Path;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};

use crate::{
    effects::color::blend,
    error::{ConfigError, Result},
    video::types::Frame,
};

/// Rasterized text as a coverage mask, tightly cropped to the inked area
#[derive(Debug, Clone, PartialEq)]
pub struct TextMask {
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

impl TextMask {
    /// Build a mask from row-major coverage values in `[0, 1]`
    pub fn from_coverage(width: u32, height: u32, coverage: Vec<f32>) -> Option<Self> {
        if coverage.len() != (width * height) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            coverage,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Coverage at signed coordinates, 0 outside the mask
    pub fn coverage(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0.0;
        }
        self.coverage[y as usize * self.width as usize + x as usize]
    }
}

/// Glyph rasterizer backed by a single TrueType/OpenType font
pub struct TextRenderer {
    font: Font,
}

impl TextRenderer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|_| ConfigError::MissingAsset {
            key: "text.font_path".to_string(),
            path: path.display().to_string(),
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "text.font_path".to_string(),
                value: e.to_string(),
            }
        })?;
        Ok(Self { font })
    }

    /// Lay out a single line of text and rasterize it into a mask
    pub fn render(&self, text: &str, size: f32) -> TextMask {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: 0.0,
            y: 0.0,
            ..LayoutSettings::default()
        });
        layout.append(&[&self.font], &TextStyle::new(text, size, 0));

        let glyphs: Vec<_> = layout
            .glyphs()
            .iter()
            .filter(|g| g.width > 0 && g.height > 0)
            .cloned()
            .collect();
        if glyphs.is_empty() {
            return TextMask {
                width: 0,
                height: 0,
                coverage: Vec::new(),
            };
        }

        let min_x = glyphs.iter().map(|g| g.x.round() as i64).min().unwrap_or(0);
        let min_y = glyphs.iter().map(|g| g.y.round() as i64).min().unwrap_or(0);
        let max_x = glyphs
            .iter()
            .map(|g| g.x.round() as i64 + g.width as i64)
            .max()
            .unwrap_or(0);
        let max_y = glyphs
            .iter()
            .map(|g| g.y.round() as i64 + g.height as i64)
            .max()
            .unwrap_or(0);

        let width = (max_x - min_x) as u32;
        let height = (max_y - min_y) as u32;
        let mut coverage = vec![0.0f32; (width * height) as usize];

        for glyph in &glyphs {
            let (_, bitmap) = self.font.rasterize_config(glyph.key);
            let ox = glyph.x.round() as i64 - min_x;
            let oy = glyph.y.round() as i64 - min_y;
            for gy in 0..glyph.height {
                for gx in 0..glyph.width {
                    let x = ox + gx as i64;
                    let y = oy + gy as i64;
                    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                        continue;
                    }
                    let i = y as usize * width as usize + x as usize;
                    let value = bitmap[gy * glyph.width + gx] as f32 / 255.0;
                    coverage[i] = coverage[i].max(value);
                }
            }
        }

        TextMask {
            width,
            height,
            coverage,
        }
    }
}

/// Composite text at `(x, y)`: a black outline of `border` pixels, then the
/// fill color, both at `opacity`
pub fn draw_text(
    frame: &mut Frame,
    mask: &TextMask,
    x: i64,
    y: i64,
    color: [u8; 3],
    border: u32,
    opacity: f32,
) {
    if mask.is_empty() || opacity <= 0.0 {
        return;
    }
    let (width, height) = frame.dimensions();
    let b = border as i64;

    let x_start = (x - b).max(0);
    let y_start = (y - b).max(0);
    let x_end = (x + mask.width() as i64 + b).min(width as i64);
    let y_end = (y + mask.height() as i64 + b).min(height as i64);

    for py in y_start..y_end {
        for px in x_start..x_end {
            let mx = px - x;
            let my = py - y;

            let mut outline = 0.0f32;
            if b > 0 {
                for dy in -b..=b {
                    for dx in -b..=b {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        outline = outline.max(mask.coverage(mx - dx, my - dy));
                    }
                }
            }
            let fill = mask.coverage(mx, my);
            if outline == 0.0 && fill == 0.0 {
                continue;
            }

            let pixel = frame.get_pixel_mut(px as u32, py as u32);
            if outline > 0.0 {
                let alpha = outline * opacity;
                for channel in pixel.iter_mut() {
                    *channel = blend(*channel, 0, alpha);
                }
            }
            if fill > 0.0 {
                let alpha = fill * opacity;
                for (channel, &c) in pixel.iter_mut().zip(color.iter()) {
                    *channel = blend(*channel, c, alpha);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: u32) -> TextMask {
        TextMask::from_coverage(size, size, vec![1.0; (size * size) as usize]).unwrap()
    }

    #[test]
    fn test_opaque_fill_and_outline() {
        let mut frame = Frame::new_filled(20, 20, [100, 100, 100]);
        draw_text(&mut frame, &square_mask(4), 8, 8, [255, 255, 0], 1, 1.0);

        assert_eq!(frame.get_pixel(9, 9), [255, 255, 0]);
        assert_eq!(frame.get_pixel(7, 9), [0, 0, 0], "outline left of glyph");
        assert_eq!(frame.get_pixel(12, 12), [0, 0, 0], "outline corner");
        assert_eq!(frame.get_pixel(5, 5), [100, 100, 100]);
    }

    #[test]
    fn test_partial_opacity_blends() {
        let mut frame = Frame::new_filled(10, 10, [0, 0, 0]);
        draw_text(&mut frame, &square_mask(2), 4, 4, [200, 200, 200], 0, 0.5);
        assert_eq!(frame.get_pixel(4, 4), [100, 100, 100]);
    }

    #[test]
    fn test_clipped_at_frame_edges() {
        let mut frame = Frame::new_filled(6, 6, [10, 10, 10]);
        draw_text(&mut frame, &square_mask(4), -2, 4, [255, 0, 0], 1, 1.0);
        assert_eq!(frame.get_pixel(0, 5), [255, 0, 0]);
    }

    #[test]
    fn test_mask_rejects_bad_length() {
        assert!(TextMask::from_coverage(3, 3, vec![0.0; 8]).is_none());
    }
}
