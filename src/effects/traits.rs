use rand::rngs::SmallRng;

use crate::{
    error::Result,
    video::types::{Frame, FrameContext},
};

/// A single per-frame visual transformation
///
/// Effects run inside the worker pool, so they must be `Send + Sync` and keep
/// no mutable state of their own. Any randomness comes from the per-frame RNG
/// passed in, which makes a frame's output independent of scheduling order.
pub trait Effect: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Transform the frame in place
    ///
    /// # Returns
    ///
    /// `Ok(())` when applied. An `Err` means a precondition failed; the effect
    /// must detect this before touching any pixel so the frame passes through
    /// unchanged.
    fn apply(&self, frame: &mut Frame, ctx: &FrameContext, rng: &mut SmallRng) -> Result<()>;
}
