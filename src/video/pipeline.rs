use std::sync::Arc;
use std::time::Instant;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    config::{IntroOutroFill, TimelineConfig},
    effects::{blur::blur_frame, EffectChain},
    error::Result,
    video::{
        decoder::FrameSource,
        encoder::FrameSink,
        types::{Frame, FrameContext},
    },
};

/// Kernel size used for blurred intro/outro frames
const FILL_BLUR_KERNEL: usize = 51;

/// Counters reported at the end of a pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub frames: usize,
    pub batches: usize,
}

/// Batched, order-preserving parallel transform of a frame stream
///
/// Frames are read sequentially from a single source, grouped into batches,
/// transformed in parallel by a bounded worker pool and re-sorted by index
/// before any frame of the batch reaches the sink.
pub struct FramePipeline {
    chain: Arc<EffectChain>,
    pool: rayon::ThreadPool,
    batch_size: usize,
    seed: u64,
    total_frames: usize,
    fps: f64,
}

impl FramePipeline {
    pub fn new(
        chain: EffectChain,
        batch_size: usize,
        workers: usize,
        seed: u64,
        total_frames: usize,
        fps: f64,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("vidremix-worker-{}", i))
            .build()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        Ok(Self {
            chain: Arc::new(chain),
            pool,
            batch_size: batch_size.max(1),
            seed,
            total_frames,
            fps,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Apply the effect chain to every frame of a batch
    ///
    /// The result is sorted by frame index regardless of input order.
    pub fn process_batch(&self, batch: Vec<(usize, Frame)>) -> Vec<(usize, Frame)> {
        let chain = &self.chain;
        let (seed, total, fps) = (self.seed, self.total_frames, self.fps);

        let mut processed: Vec<(usize, Frame)> = self.pool.install(|| {
            batch
                .into_par_iter()
                .map(|(index, mut frame)| {
                    let ctx = FrameContext::new(index, total, fps);
                    chain.apply_all(&mut frame, &ctx, seed);
                    (index, frame)
                })
                .collect()
        });
        processed.sort_by_key(|(index, _)| *index);
        processed
    }

    /// Drain `source` through the chain into `sink`
    pub fn run<S: FrameSource, K: FrameSink>(&self, source: &mut S, sink: &mut K) -> Result<PipelineStats> {
        let started = Instant::now();
        let mut stats = PipelineStats::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut next_index = 0;

        loop {
            let next = source.read_frame()?;
            let exhausted = next.is_none();
            if let Some(frame) = next {
                batch.push((next_index, frame));
                next_index += 1;
            }

            if batch.len() == self.batch_size || (exhausted && !batch.is_empty()) {
                let processed = self.process_batch(std::mem::take(&mut batch));
                for (_, frame) in &processed {
                    sink.write_frame(frame)?;
                }
                stats.frames += processed.len();
                stats.batches += 1;

                if stats.batches % 10 == 0 {
                    info!(
                        "   Processed {}/{} frames ({:.1} fps)",
                        stats.frames,
                        self.total_frames,
                        stats.frames as f64 / started.elapsed().as_secs_f64().max(1e-6)
                    );
                }
            }

            if exhausted {
                break;
            }
        }

        debug!(
            "Pipeline finished: {} frames in {} batches, {:.2}s",
            stats.frames,
            stats.batches,
            started.elapsed().as_secs_f64()
        );
        Ok(stats)
    }
}

/// Counters for timeline edits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineStats {
    pub written: usize,
    pub dropped: usize,
    pub duplicated: usize,
    pub intro: usize,
    pub outro: usize,
}

/// Single-threaded timeline edits on the ordered output stream
///
/// Prepends intro frames before the first real frame, randomly drops or
/// duplicates later frames and appends outro frames on [`finish`]. The first
/// real frame is never dropped. When disabled, frames pass straight through.
///
/// [`finish`]: TimelineEditor::finish
pub struct TimelineEditor<K: FrameSink> {
    sink: K,
    config: Option<TimelineConfig>,
    rng: SmallRng,
    last: Option<Frame>,
    stats: TimelineStats,
}

impl<K: FrameSink> TimelineEditor<K> {
    pub fn new(sink: K, config: &TimelineConfig, seed: u64) -> Self {
        Self {
            sink,
            config: config.enabled.then(|| config.clone()),
            rng: SmallRng::seed_from_u64(seed ^ 0x7133_11E5),
            last: None,
            stats: TimelineStats::default(),
        }
    }

    fn emit(&mut self, frame: &Frame) -> Result<()> {
        self.sink.write_frame(frame)?;
        self.stats.written += 1;
        Ok(())
    }

    /// Write intro/outro frames before the first or after the last real frame
    fn emit_fill(&mut self, source: &Frame, count: u32, fill: IntroOutroFill) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let fill_frame = fill_frame(source, fill);
        for _ in 0..count {
            self.emit(&fill_frame)?;
        }
        Ok(())
    }

    /// Append the outro frames and hand back the sink with the edit counters
    pub fn finish(mut self) -> Result<(K, TimelineStats)> {
        if let (Some(config), Some(last)) = (self.config.clone(), self.last.take()) {
            self.emit_fill(&last, config.outro_frames, config.fill)?;
            self.stats.outro = config.outro_frames as usize;
            if self.stats.dropped + self.stats.duplicated > 0 {
                info!(
                    "   Timeline: {} frames dropped, {} duplicated",
                    self.stats.dropped, self.stats.duplicated
                );
            }
        }
        Ok((self.sink, self.stats))
    }

    /// Give up on the stream without writing the outro
    pub fn into_inner(self) -> K {
        self.sink
    }
}

impl<K: FrameSink> FrameSink for TimelineEditor<K> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let Some(config) = self.config.clone() else {
            return self.emit(frame);
        };

        if self.last.is_none() {
            self.emit_fill(frame, config.intro_frames, config.fill)?;
            self.stats.intro = config.intro_frames as usize;
            self.emit(frame)?;
        } else {
            if config.drop_ratio > 0.0 && self.rng.gen_bool(config.drop_ratio) {
                self.stats.dropped += 1;
                return Ok(());
            }
            self.emit(frame)?;
            if config.duplicate_ratio > 0.0 && self.rng.gen_bool(config.duplicate_ratio) {
                self.emit(frame)?;
                self.stats.duplicated += 1;
            }
        }
        self.last = Some(frame.clone());
        Ok(())
    }
}

/// Synthetic intro/outro frame derived from a real frame
pub fn fill_frame(source: &Frame, fill: IntroOutroFill) -> Frame {
    let (width, height) = source.dimensions();
    match fill {
        IntroOutroFill::Black => Frame::new_black(width, height),
        IntroOutroFill::White => Frame::new_filled(width, height, [255, 255, 255]),
        IntroOutroFill::Blur => blur_frame(source, FILL_BLUR_KERNEL),
    }
}
