//! # Effect Library
//!
//! Per-frame visual transformations applied by the frame pipeline. Each
//! effect is a small struct implementing [`Effect`]; an [`EffectChain`]
//! holds the enabled ones in their fixed application order.
//!
//! ## Built-in Effects
//!
//! - **Geometry**: flip, rotation, crop-and-resize
//! - **Photometric**: saturation/brightness/contrast, color shift, fades, vignette
//! - **Overlays**: watermark, titles, subtitles, picture-in-picture, stickers
//! - **Blur**: background bands, periodic border blur, edge blur
//! - **Frequency**: FFT phase scramble, DCT coefficient perturbation
//! - **Disruption**: perceptual-hash noise, texture noise, dynamic border
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rand::{rngs::SmallRng, SeedableRng};
//! use vidremix::effects::{Effect, Vignette};
//! use vidremix::video::types::{Frame, FrameContext};
//!
//! let vignette = Vignette { strength: 0.3, radius: 0.8 };
//! let mut frame = Frame::new_filled(64, 64, [200, 200, 200]);
//! let ctx = FrameContext::new(0, 1, 30.0);
//! vignette.apply(&mut frame, &ctx, &mut SmallRng::seed_from_u64(0))?;
//! # Ok::<(), vidremix::RemixError>(())
//! ```

pub mod blur;
pub mod chain;
pub mod color;
pub mod composite;
pub mod disruption;
pub mod frequency;
pub mod geometry;
pub mod photometric;
pub mod text;
pub mod traits;
pub mod watermark;

pub use chain::{EffectAssets, EffectChain};
pub use traits::Effect;

pub use blur::{BackgroundBlur, EdgeBlur, PeriodicBlur};
pub use composite::{PictureInPicture, Sticker, StickerChoice, StickerSet, Subtitles, Titles};
pub use disruption::{DynamicBorder, HashDisruption, TextureNoise};
pub use frequency::{DctPerturbation, PhaseScramble};
pub use geometry::{CropResize, Orientation};
pub use photometric::{ColorShift, Fade, Sbc, Vignette};
pub use text::{TextMask, TextRenderer};
pub use watermark::{ImageMark, Watermark, WatermarkAsset};
