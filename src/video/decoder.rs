use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Stdio};

use tracing::{debug, warn};

use crate::{
    error::{EncodeError, Result, SourceError},
    video::{frame_cache::FrameCache, probe::MediaToolchain, types::Frame},
};

/// Anything that yields decoded frames in stream order
pub trait FrameSource {
    /// Next frame, or `None` at the end of the stream
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Splits a byte stream into fixed-size RGB24 frame records
pub struct RawFrameReader<R: Read> {
    reader: R,
    width: u32,
    height: u32,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
        }
    }
}

impl<R: Read> FrameSource for RawFrameReader<R> {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame_bytes = Frame::byte_len(self.width, self.height);
        let mut buffer = vec![0u8; frame_bytes];
        let mut filled = 0;

        while filled < frame_bytes {
            match self.reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < frame_bytes {
            return Err(SourceError::DecodeFailed {
                reason: format!("truncated frame record: {} of {} bytes", filled, frame_bytes),
            }
            .into());
        }

        Frame::from_rgb_bytes(self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| {
                SourceError::DecodeFailed {
                    reason: "frame buffer size mismatch".to_string(),
                }
                .into()
            })
    }
}

/// Sequential decoder backed by an ffmpeg subprocess
///
/// ffmpeg writes raw RGB24 frames to its stdout; this is the single reader
/// of the source for the whole run.
pub struct FrameDecoder {
    child: Child,
    reader: RawFrameReader<BufReader<ChildStdout>>,
}

impl FrameDecoder {
    /// Start decoding `path`, scaled to `width x height` when `scale` is set
    pub fn spawn(
        toolchain: &MediaToolchain,
        path: &Path,
        width: u32,
        height: u32,
        scale: bool,
    ) -> Result<Self> {
        let mut cmd = toolchain.ffmpeg_command();
        cmd.arg("-i").arg(path);
        if scale {
            cmd.args(["-vf", &format!("scale={}:{}", width, height)]);
        }
        cmd.args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Spawning decoder: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|_| EncodeError::ToolMissing {
            tool: toolchain.ffmpeg.display().to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SourceError::DecodeFailed {
            reason: "decoder stdout unavailable".to_string(),
        })?;

        let capacity = Frame::byte_len(width, height).max(8192);
        Ok(Self {
            child,
            reader: RawFrameReader::new(BufReader::with_capacity(capacity, stdout), width, height),
        })
    }

    /// Wait for a fully drained decoder and check its exit status
    pub fn finish(mut self) -> Result<()> {
        let status = self.child.wait()?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = self.child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(SourceError::DecodeFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr.trim()),
            }
            .into());
        }
        Ok(())
    }

    /// Stop decoding early
    pub fn close(mut self) {
        if let Err(e) = self.child.kill() {
            debug!("Decoder already exited: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap decoder process: {}", e);
        }
    }
}

impl FrameSource for FrameDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        self.reader.read_frame()
    }
}

/// Source index shown at output position `index` with frame swapping
///
/// Within every window of `interval` frames the first two frames trade
/// places, provided both exist. Every other index maps to itself.
pub fn frame_swap_source(index: usize, interval: usize, total_frames: usize) -> usize {
    if interval < 2 {
        return index;
    }
    let window_start = (index / interval) * interval;
    if window_start + 1 >= total_frames {
        return index;
    }
    match index % interval {
        0 => window_start + 1,
        1 => window_start,
        _ => index,
    }
}

/// Wraps a sequential source and emits frames in frame-swapped order
///
/// Only adjacent pairs are swapped, so one frame of lookahead suffices.
pub struct SwapReader<S: FrameSource> {
    source: S,
    interval: usize,
    total_frames: usize,
    position: usize,
    pending: Option<Frame>,
}

impl<S: FrameSource> SwapReader<S> {
    pub fn new(source: S, interval: usize, total_frames: usize) -> Self {
        Self {
            source,
            interval,
            total_frames,
            position: 0,
            pending: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: FrameSource> FrameSource for SwapReader<S> {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            self.position += 1;
            return Ok(Some(frame));
        }

        let Some(frame) = self.source.read_frame()? else {
            return Ok(None);
        };
        let index = self.position;
        self.position += 1;

        if frame_swap_source(index, self.interval, self.total_frames) == index + 1 {
            if let Some(next) = self.source.read_frame()? {
                self.pending = Some(frame);
                return Ok(Some(next));
            }
        }
        Ok(Some(frame))
    }
}

/// Upper bound on the raw bytes held by one auxiliary frame cache
pub const CACHE_BYTE_BUDGET: usize = 512 * 1024 * 1024;

/// Frames a cache of `width`x`height` may hold: at most `requested` and
/// within [`CACHE_BYTE_BUDGET`], but never fewer than one
pub fn cache_frame_limit(width: u32, height: u32, requested: usize) -> usize {
    let per_frame = Frame::byte_len(width, height).max(1);
    requested.min(CACHE_BYTE_BUDGET / per_frame).max(1)
}

/// Decode up to `limit` frames of an auxiliary video into a cache
///
/// With `size` set, ffmpeg scales the frames; otherwise the native
/// resolution is probed and kept. Decoding stops at the end of the clip or
/// at the byte budget, whichever comes first; lookups loop over what was
/// cached.
pub fn decode_to_cache(
    toolchain: &MediaToolchain,
    path: &Path,
    size: Option<(u32, u32)>,
    limit: usize,
) -> Result<FrameCache> {
    let (width, height) = match size {
        Some(size) => size,
        None => {
            let info = toolchain.probe(path)?;
            (info.width, info.height)
        }
    };

    let limit = cache_frame_limit(width, height, limit);
    let mut decoder = FrameDecoder::spawn(toolchain, path, width, height, size.is_some())?;
    let mut frames = Vec::new();
    while frames.len() < limit {
        match decoder.read_frame()? {
            Some(frame) => frames.push(frame),
            None => break,
        }
    }

    if frames.len() < limit {
        decoder.finish()?;
    } else {
        decoder.close();
    }
    debug!("Cached {} frames of {:?} at {}x{}", frames.len(), path, width, height);

    FrameCache::new(frames).ok_or_else(|| {
        SourceError::DecodeFailed {
            reason: format!("no frames decoded from {}", path.display()),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream_of(count: u8, width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        for i in 0..count {
            bytes.extend(std::iter::repeat(i).take(Frame::byte_len(width, height)));
        }
        bytes
    }

    fn ids<S: FrameSource>(mut source: S) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(frame) = source.read_frame().unwrap() {
            out.push(frame.get_pixel(0, 0)[0]);
        }
        out
    }

    #[test]
    fn test_raw_reader_splits_records() {
        let reader = RawFrameReader::new(Cursor::new(stream_of(3, 4, 2)), 4, 2);
        assert_eq!(ids(reader), vec![0, 1, 2]);
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut bytes = stream_of(1, 4, 2);
        bytes.extend([9u8; 5]);
        let mut reader = RawFrameReader::new(Cursor::new(bytes), 4, 2);
        assert!(reader.read_frame().unwrap().is_some());
        assert!(reader.read_frame().is_err());
    }

    #[test]
    fn test_swap_is_an_involution() {
        let (interval, total) = (5, 23);
        for i in 0..total {
            let j = frame_swap_source(i, interval, total);
            assert_eq!(frame_swap_source(j, interval, total), i);
        }
        assert_eq!(frame_swap_source(10, interval, total), 11);
        assert_eq!(frame_swap_source(11, interval, total), 10);
        assert_eq!(frame_swap_source(12, interval, total), 12);
    }

    #[test]
    fn test_swap_is_a_permutation() {
        let (interval, total) = (4, 17);
        let mut sources: Vec<usize> = (0..total).map(|i| frame_swap_source(i, interval, total)).collect();
        sources.sort_unstable();
        assert_eq!(sources, (0..total).collect::<Vec<_>>());
        // The last window has a single frame and stays put
        assert_eq!(frame_swap_source(16, interval, total), 16);
    }

    #[test]
    fn test_cache_limit_respects_budget() {
        // 1080p RGB24 is ~6 MB per frame
        let limit = cache_frame_limit(1920, 1080, 9000);
        assert!(limit < 9000);
        assert!(limit * Frame::byte_len(1920, 1080) <= CACHE_BYTE_BUDGET);

        assert_eq!(cache_frame_limit(64, 36, 120), 120);
        assert_eq!(cache_frame_limit(64, 36, 0), 1);
        assert_eq!(cache_frame_limit(100_000, 100_000, 10), 1);
    }

    #[test]
    fn test_swap_reader_matches_remap() {
        let (interval, total) = (3, 8u8);
        let reader = RawFrameReader::new(Cursor::new(stream_of(total, 2, 2)), 2, 2);
        let swapped = ids(SwapReader::new(reader, interval, total as usize));

        let expected: Vec<u8> = (0..total as usize)
            .map(|i| frame_swap_source(i, interval, total as usize) as u8)
            .collect();
        assert_eq!(swapped, expected);
        assert_eq!(swapped, vec![1, 0, 2, 4, 3, 5, 7, 6]);
    }
}
