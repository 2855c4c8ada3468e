//! # Audio Module
//!
//! Loads the soundtrack, runs it through the perturbation stages and writes
//! the WAV handed to the encoder.
//!
//! ## Stages
//!
//! - **Silence shaping**: long pauses are cut and partially re-inserted
//! - **Fingerprint disruption**: pitch shift, subliminal noise, micro-silences
//! - **Background music**: a looped track mixed under the voice
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vidremix::audio::{AudioLoader, AudioPipeline};
//! use vidremix::config::AudioConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let voice = AudioLoader::load("voice.wav").await?;
//! let config = AudioConfig {
//!     fingerprint_enabled: true,
//!     ..AudioConfig::default()
//! };
//! let processed = AudioPipeline::new(&config, 7).process(voice);
//! AudioLoader::save_wav(&processed, "processed.wav")?;
//! # Ok(())
//! # }
//! ```

pub mod fingerprint;
pub mod loader;
pub mod mix;
pub mod pipeline;
pub mod silence;
pub mod types;

pub use loader::AudioLoader;
pub use pipeline::AudioPipeline;
pub use types::AudioBuffer;
