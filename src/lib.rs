//! # vidremix
//!
//! Re-render a video through a chain of visual and audio perturbations so the
//! result looks and sounds like the source while its content signatures
//! (perceptual hashes, audio fingerprints, container metadata) differ.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vidremix::{Config, RemixEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.vignette.enabled = true;
//! config.hash.enabled = true;
//! config.run.seed = Some(42);
//!
//! let report = RemixEngine::new(config)
//!     .process("input.mp4", "output.mp4")
//!     .await?;
//! println!("{} frames written", report.frames_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`effects`] - per-frame effects and the ordered effect chain
//! - [`video`] - probing, decode/encode subprocesses, the parallel frame pipeline
//! - [`audio`] - soundtrack loading and the sequential audio stages
//! - [`composition`] - the run orchestrator
//! - [`config`] - validated configuration and per-run random rolls
//! - [`subtitles`] - timed subtitle tracks
//!
//! The media toolchain (`ffmpeg`, `ffprobe`) is invoked as external
//! processes from explicitly configured paths.

pub mod audio;
pub mod composition;
pub mod config;
pub mod effects;
pub mod error;
pub mod subtitles;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{RemixEngine, RunReport},
    config::Config,
    effects::{Effect, EffectChain},
    error::{RemixError, Result},
};
