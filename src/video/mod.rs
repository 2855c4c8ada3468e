//! # Video Processing Module
//!
//! Probing, raw-frame decode and encode through the external media
//! toolchain, the batched parallel frame pipeline and the metadata pass.

pub mod decoder;
pub mod encoder;
pub mod frame_cache;
pub mod metadata;
pub mod pipeline;
pub mod probe;
pub mod types;

pub use decoder::{FrameDecoder, FrameSource, SwapReader};
pub use encoder::{EncodeSettings, FfmpegEncoder, FrameSink};
pub use frame_cache::FrameCache;
pub use pipeline::{FramePipeline, TimelineEditor};
pub use probe::MediaToolchain;
pub use types::{Frame, FrameContext, VideoInfo};
