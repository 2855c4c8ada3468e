use crate::video::types::Frame;

/// Pre-decoded frames of an auxiliary video, looped by index
///
/// Built once before frame processing starts and shared read-only by all
/// workers, so no worker ever opens a decoder of its own.
#[derive(Debug, Clone)]
pub struct FrameCache {
    frames: Vec<Frame>,
}

impl FrameCache {
    /// Returns `None` for an empty frame list
    pub fn new(frames: Vec<Frame>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self { frames })
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame for output index `index`, wrapping around the cache length
    pub fn get(&self, index: usize) -> &Frame {
        &self.frames[index % self.frames.len()]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frames[0].dimensions()
    }
}
