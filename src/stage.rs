//! Per-pixel stage execution over the partitioner/barrier substrate.
//!
//! A [`ConvolutionStage`] owns the threading choice (worker count + [`Strategy`]) and runs any
//! per-pixel gather over it: kernel convolution, single-buffer maps (greyscale) and two-buffer
//! zips (magnitude). Inputs are borrowed immutably for the whole stage; every output index is
//! written by exactly one worker, so the output needs no lock.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::{
    buffer::{AtomicSamples, PixelBuffer, Rgb, pixel_count},
    foundation::error::{ParconvError, ParconvResult},
    kernel::Kernel,
    parallel::{CompletionBarrier, Strategy, WorkPartitioner, partition::validate_workers},
};

/// Counters for one stage invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageStats {
    pub strategy: Strategy,
    /// Worker count the stage was configured with (always 1 for [`Strategy::Sequential`]).
    pub workers: u32,
    /// Output pixels computed.
    pub items: u64,
    /// Pixels computed by each worker; sums to `items` whenever `items > 0`.
    pub per_worker: Vec<u64>,
    pub elapsed: Duration,
}

/// Threading configuration for per-pixel stages.
#[derive(Clone, Debug)]
pub struct ConvolutionStage {
    workers: u32,
    strategy: Strategy,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl ConvolutionStage {
    /// Validate the configuration up front; nothing is spawned until a stage runs.
    ///
    /// [`Strategy::RayonRows`] builds its pool here and reuses it for every stage.
    pub fn new(workers: u32, strategy: Strategy) -> ParconvResult<Self> {
        validate_workers(workers)?;
        let (workers, pool) = match strategy {
            Strategy::Sequential => (1, None),
            Strategy::RayonRows => (workers, Some(Arc::new(build_thread_pool(workers)?))),
            Strategy::StaticChunks | Strategy::DynamicCursor => (workers, None),
        };
        Ok(Self {
            workers,
            strategy,
            pool,
        })
    }

    pub fn sequential() -> Self {
        Self {
            workers: 1,
            strategy: Strategy::Sequential,
            pool: None,
        }
    }

    pub fn workers(&self) -> u32 {
        self.workers
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Convolve `input` with `kernel` using clamp-to-edge sampling.
    pub fn apply(&self, input: &PixelBuffer, kernel: &Kernel) -> ParconvResult<PixelBuffer> {
        self.apply_with_stats(input, kernel).map(|(out, _)| out)
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(strategy = %self.strategy, workers = self.workers, side = kernel.side())
    )]
    pub fn apply_with_stats(
        &self,
        input: &PixelBuffer,
        kernel: &Kernel,
    ) -> ParconvResult<(PixelBuffer, StageStats)> {
        let (w, h) = input.dimensions();
        self.execute("convolve", w, h, |idx| convolve_pixel(input, kernel, idx))
    }

    /// Point-wise transform of every pixel.
    ///
    /// A panic in `f` on a worker thread comes back as [`ParconvError::Worker`]. Under
    /// [`Strategy::Sequential`] `f` runs on the calling thread and a panic unwinds through the
    /// caller.
    pub fn map<F>(&self, input: &PixelBuffer, f: F) -> ParconvResult<(PixelBuffer, StageStats)>
    where
        F: Fn(Rgb) -> Rgb + Sync,
    {
        let (w, h) = input.dimensions();
        self.execute("map", w, h, |idx| f(input.at(idx)))
    }

    /// Point-wise combination of two equally sized buffers.
    pub fn zip<F>(
        &self,
        a: &PixelBuffer,
        b: &PixelBuffer,
        f: F,
    ) -> ParconvResult<(PixelBuffer, StageStats)>
    where
        F: Fn(Rgb, Rgb) -> Rgb + Sync,
    {
        a.ensure_same_dimensions(b)?;
        let (w, h) = a.dimensions();
        self.execute("zip", w, h, |idx| f(a.at(idx), b.at(idx)))
    }

    fn execute<F>(
        &self,
        op: &'static str,
        width: u32,
        height: u32,
        pixel: F,
    ) -> ParconvResult<(PixelBuffer, StageStats)>
    where
        F: Fn(usize) -> Rgb + Sync,
    {
        let started = Instant::now();
        let n = pixel_count(width, height)?;

        let (samples, per_worker) = if n == 0 {
            (Vec::new(), Vec::new())
        } else {
            match self.strategy {
                Strategy::Sequential => ((0..n).map(&pixel).collect(), vec![n as u64]),
                Strategy::StaticChunks | Strategy::DynamicCursor => {
                    self.run_workers(n as u32, &pixel)?
                }
                Strategy::RayonRows => self.run_rayon_rows(width as usize, n, &pixel)?,
            }
        };

        let out = PixelBuffer::new(width, height, samples)?;
        let stats = StageStats {
            strategy: self.strategy,
            workers: self.workers,
            items: n as u64,
            per_worker,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            op,
            strategy = %stats.strategy,
            workers = stats.workers,
            items = stats.items,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "stage complete"
        );
        Ok((out, stats))
    }

    fn run_workers<F>(&self, item_count: u32, pixel: &F) -> ParconvResult<(Vec<Rgb>, Vec<u64>)>
    where
        F: Fn(usize) -> Rgb + Sync,
    {
        let policy = self.strategy.partition_policy().ok_or_else(|| {
            ParconvError::invalid_configuration(format!(
                "strategy '{}' does not use worker partitioning",
                self.strategy
            ))
        })?;
        let partitioner = WorkPartitioner::new(policy, item_count, self.workers)?;
        let barrier = CompletionBarrier::new(self.workers)?;
        let sink = AtomicSamples::new(item_count as usize);

        let outcomes: Vec<ParconvResult<u64>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..self.workers)
                .map(|k| {
                    let token = barrier.token();
                    let assignment = partitioner.assignment(k);
                    let sink = &sink;
                    std::thread::Builder::new()
                        .name(format!("parconv-worker-{k}"))
                        .spawn_scoped(s, move || -> ParconvResult<u64> {
                            let mut processed = 0u64;
                            for idx in assignment {
                                sink.store(idx as usize, pixel(idx as usize));
                                processed += 1;
                            }
                            tracing::trace!(worker = k, processed, "worker done");
                            token.signal_done()?;
                            Ok(processed)
                        })
                })
                .collect();

            // Spawn failures drop their token, which signals, so this always returns.
            barrier.wait_for_all();

            handles
                .into_iter()
                .enumerate()
                .map(|(k, handle)| {
                    let handle = handle.map_err(|e| {
                        ParconvError::worker(format!("failed to spawn worker {k}: {e}"))
                    })?;
                    handle.join().map_err(|payload| {
                        ParconvError::worker(format!(
                            "worker {k} panicked: {}",
                            panic_message(payload.as_ref())
                        ))
                    })?
                })
                .collect()
        });

        let per_worker = outcomes.into_iter().collect::<ParconvResult<Vec<u64>>>()?;
        let processed: u64 = per_worker.iter().sum();
        if processed != u64::from(item_count) {
            return Err(ParconvError::worker(format!(
                "workers processed {processed} of {item_count} pixels"
            )));
        }
        Ok((sink.into_samples(), per_worker))
    }

    fn run_rayon_rows<F>(
        &self,
        width: usize,
        n: usize,
        pixel: &F,
    ) -> ParconvResult<(Vec<Rgb>, Vec<u64>)>
    where
        F: Fn(usize) -> Rgb + Sync,
    {
        let pool = self.pool.as_ref().ok_or_else(|| {
            ParconvError::invalid_configuration("rayon-rows stage has no thread pool")
        })?;
        let counts: Vec<AtomicU64> = (0..self.workers).map(|_| AtomicU64::new(0)).collect();
        let mut out = vec![Rgb::default(); n];

        // `install` re-raises a worker panic on this thread; surface it as a stage error instead.
        panic::catch_unwind(AssertUnwindSafe(|| {
            pool.install(|| {
                out.par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(y, row)| {
                        let base = y * width;
                        for (x, px) in row.iter_mut().enumerate() {
                            *px = pixel(base + x);
                        }
                        let slot = rayon::current_thread_index().unwrap_or(0) % counts.len();
                        counts[slot].fetch_add(row.len() as u64, Ordering::Relaxed);
                    });
            })
        }))
        .map_err(|payload| {
            ParconvError::worker(format!(
                "rayon worker panicked: {}",
                panic_message(payload.as_ref())
            ))
        })?;

        Ok((out, counts.into_iter().map(AtomicU64::into_inner).collect()))
    }
}

/// Weighted sum of the clamped neighbourhood around pixel `index`.
#[inline]
fn convolve_pixel(input: &PixelBuffer, kernel: &Kernel, index: usize) -> Rgb {
    let w = input.width() as i64;
    let h = input.height() as i64;
    let x = index as i64 % w;
    let y = index as i64 / w;
    let r = kernel.radius() as i64;

    let mut acc = Rgb::default();
    for ky in 0..kernel.side() {
        let sy = (y + ky as i64 - r).clamp(0, h - 1);
        for kx in 0..kernel.side() {
            let sx = (x + kx as i64 - r).clamp(0, w - 1);
            let weight = kernel.weight(kx, ky);
            let sample = input.at((sy * w + sx) as usize);
            acc.r += sample.r * weight;
            acc.g += sample.g * weight;
            acc.b += sample.b * weight;
        }
    }
    acc
}

fn build_thread_pool(workers: u32) -> ParconvResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers as usize)
        .thread_name(|i| format!("parconv-rayon-{i}"))
        .build()
        .map_err(|e| ParconvError::worker(format!("failed to build rayon thread pool: {e}")))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |x, y| {
            Rgb::new(
                x as f32 / w as f32,
                y as f32 / h as f32,
                ((x * 7 + y * 3) % 11) as f32 / 10.0,
            )
        })
        .unwrap()
    }

    fn stages(workers: u32) -> Vec<ConvolutionStage> {
        Strategy::ALL
            .into_iter()
            .map(|s| ConvolutionStage::new(workers, s).unwrap())
            .collect()
    }

    #[test]
    fn zero_workers_is_rejected_before_running() {
        for strategy in Strategy::ALL {
            assert!(matches!(
                ConvolutionStage::new(0, strategy),
                Err(ParconvError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn sequential_reports_single_worker() {
        let stage = ConvolutionStage::new(8, Strategy::Sequential).unwrap();
        assert_eq!(stage.workers(), 1);
        let (_, stats) = stage
            .apply_with_stats(&gradient_image(3, 3), &Kernel::identity(3).unwrap())
            .unwrap();
        assert_eq!(stats.per_worker, vec![9]);
    }

    #[test]
    fn identity_kernel_reproduces_input_exactly() {
        let input = gradient_image(9, 7);
        let kernel = Kernel::identity(5).unwrap();
        for stage in stages(3) {
            assert_eq!(stage.apply(&input, &kernel).unwrap(), input, "{}", stage.strategy());
        }
    }

    #[test]
    fn box_kernel_on_single_pixel_clamps_to_that_pixel() {
        let px = Rgb::new(0.2, 0.6, 0.9);
        let input = PixelBuffer::filled(1, 1, px).unwrap();
        let kernel = Kernel::box_filter(3).unwrap();
        for stage in stages(2) {
            let out = stage.apply(&input, &kernel).unwrap();
            assert!(out.at(0).max_abs_diff(px) < 1e-6, "{}", stage.strategy());
        }
    }

    #[test]
    fn edge_samples_clamp_instead_of_wrapping() {
        // Kernel that only reads the left neighbour: column 0 must read itself.
        let kernel = Kernel::from_rows([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]])
            .unwrap();
        let input = PixelBuffer::from_fn(3, 1, |x, _| Rgb::splat(x as f32)).unwrap();
        let out = ConvolutionStage::sequential().apply(&input, &kernel).unwrap();
        let xs: Vec<f32> = out.samples().iter().map(|p| p.r).collect();
        assert_eq!(xs, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn strategies_agree_with_sequential() {
        let input = gradient_image(17, 13);
        let kernel = Kernel::gaussian_5x5();
        let reference = ConvolutionStage::sequential().apply(&input, &kernel).unwrap();
        for workers in [1, 2, 3, 8] {
            for stage in stages(workers) {
                let out = stage.apply(&input, &kernel).unwrap();
                assert!(
                    out.max_abs_diff(&reference).unwrap() <= 1e-6,
                    "{} x{workers}",
                    stage.strategy()
                );
            }
        }
    }

    #[test]
    fn per_worker_counts_cover_every_pixel() {
        let input = gradient_image(10, 10);
        let kernel = Kernel::identity(3).unwrap();
        for stage in stages(4) {
            let (_, stats) = stage.apply_with_stats(&input, &kernel).unwrap();
            assert_eq!(stats.items, 100);
            assert_eq!(stats.per_worker.iter().sum::<u64>(), 100, "{}", stage.strategy());
        }
        let static_stage = ConvolutionStage::new(3, Strategy::StaticChunks).unwrap();
        let (_, stats) = static_stage.apply_with_stats(&input, &kernel).unwrap();
        assert_eq!(stats.per_worker, vec![33, 33, 34]);
    }

    #[test]
    fn more_workers_than_pixels_is_fine() {
        let input = gradient_image(2, 1);
        let kernel = Kernel::identity(3).unwrap();
        for stage in stages(16) {
            assert_eq!(stage.apply(&input, &kernel).unwrap(), input);
        }
    }

    #[test]
    fn empty_image_returns_empty_buffer() {
        let input = PixelBuffer::new(0, 5, Vec::new()).unwrap();
        for stage in stages(4) {
            let (out, stats) = stage
                .apply_with_stats(&input, &Kernel::gaussian_5x5())
                .unwrap();
            assert_eq!(out.dimensions(), (0, 5));
            assert!(out.is_empty());
            assert!(stats.per_worker.is_empty());
        }
    }

    #[test]
    fn zip_rejects_mismatched_dimensions() {
        let a = gradient_image(3, 3);
        let b = gradient_image(3, 2);
        let stage = ConvolutionStage::new(2, Strategy::DynamicCursor).unwrap();
        assert!(matches!(
            stage.zip(&a, &b, |x, _| x),
            Err(ParconvError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn map_applies_to_every_pixel() {
        let input = gradient_image(5, 4);
        for stage in stages(3) {
            let (out, _) = stage
                .map(&input, |p| Rgb::new(p.r * 2.0, 0.0, 1.0))
                .unwrap();
            for (a, b) in input.samples().iter().zip(out.samples()) {
                assert_eq!(b.r, a.r * 2.0);
                assert_eq!(b.b, 1.0);
            }
        }
    }

    #[test]
    fn worker_panic_is_reported_not_hung() {
        let input = gradient_image(8, 8);
        for strategy in [
            Strategy::StaticChunks,
            Strategy::DynamicCursor,
            Strategy::RayonRows,
        ] {
            let stage = ConvolutionStage::new(4, strategy).unwrap();
            let err = stage
                .map(&input, |p| {
                    if p.r > 0.8 {
                        panic!("bad pixel");
                    }
                    p
                })
                .unwrap_err();
            assert!(
                matches!(&err, ParconvError::Worker(msg) if msg.contains("bad pixel")),
                "{err}"
            );
        }
    }
}
