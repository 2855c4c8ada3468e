use image::{ImageBuffer, Rgb, RgbImage};

/// A single video frame
///
/// Thin wrapper around an RGB image buffer. Pixel order is always RGB24,
/// which is also the layout exchanged with ffmpeg over pipes.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    /// Create a new frame filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get a mutable reference to a pixel at the given coordinates
    pub fn get_pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        &mut self.buffer.get_pixel_mut(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }

    /// Raw RGB24 bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Size in bytes of one raw RGB24 record of the given resolution
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Multiply every channel by `factor`, saturating
    pub fn scale(&mut self, factor: f32) {
        for value in self.buffer.iter_mut() {
            *value = (*value as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Position of a frame within the run, handed to every effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Output index of the frame, before timeline edits
    pub index: usize,
    /// Number of frames in the source video
    pub total_frames: usize,
    pub fps: f64,
}

impl FrameContext {
    pub fn new(index: usize, total_frames: usize, fps: f64) -> Self {
        Self {
            index,
            total_frames,
            fps,
        }
    }

    /// `index / total_frames`, 0 for an empty run
    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.index as f64 / self.total_frames as f64
        }
    }

    /// Playback time of this frame in seconds
    pub fn seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.index as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Stream properties discovered by probing the input container
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Seconds
    pub duration: f64,
    /// Exact when the container reports it, otherwise `duration * fps`
    pub frame_count: usize,
    pub has_audio: bool,
}

impl VideoInfo {
    pub fn frame_bytes(&self) -> usize {
        Frame::byte_len(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_roundtrip() {
        let mut frame = Frame::new_black(4, 3);
        frame.set_pixel(1, 2, [10, 20, 30]);

        let bytes = frame.as_bytes().to_vec();
        assert_eq!(bytes.len(), Frame::byte_len(4, 3));

        let back = Frame::from_rgb_bytes(4, 3, bytes).unwrap();
        assert_eq!(back.get_pixel(1, 2), [10, 20, 30]);
        assert_eq!(back, frame);
    }

    #[test]
    fn test_from_rgb_bytes_rejects_short_buffer() {
        assert!(Frame::from_rgb_bytes(4, 4, vec![0; 10]).is_none());
    }

    #[test]
    fn test_scale_saturates() {
        let mut frame = Frame::new_filled(2, 2, [200, 100, 0]);
        frame.scale(2.0);
        assert_eq!(frame.get_pixel(0, 0), [255, 200, 0]);
    }

    #[test]
    fn test_context_progress_and_time() {
        let ctx = FrameContext::new(50, 100, 25.0);
        assert_eq!(ctx.progress(), 0.5);
        assert_eq!(ctx.seconds(), 2.0);
        assert_eq!(FrameContext::new(3, 0, 0.0).progress(), 0.0);
    }
}
