//! Five-stage Sobel edge pipeline.
//!
//! Pipeline:
//! 1. Gaussian blur (convolution)
//! 2. Greyscale (point-wise luminosity)
//! 3. Horizontal gradient (convolution of 2)
//! 4. Vertical gradient (convolution of 2)
//! 5. Magnitude (point-wise combination of 3 and 4)
//!
//! Each stage consumes the complete output of its predecessor; a stage only starts after the
//! previous one has returned, and every stage returns only after all of its workers finished.
//!
//! The default magnitude is the per-channel sum `gx + gy`, not `sqrt(gx² + gy²)`. That is the
//! reproducible contract of this pipeline; [`MagnitudeMode::Euclidean`] is available as an
//! explicit opt-in.
//!
//! Intermediate buffers are not clamped, so a `Sum` edge map is signed: a dark-to-bright edge along
//! +x or +y yields negative values, which [`PixelBuffer::to_rgba8`] encodes as black. Encoded `Sum`
//! output only shows edges with a positive response; `Euclidean` shows both directions.
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    buffer::{PixelBuffer, Rgb},
    foundation::error::ParconvResult,
    kernel::Kernel,
    stage::{ConvolutionStage, StageStats},
};

/// Luminosity weights applied to `(r, g, b)` by the greyscale stage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LumaWeights {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for LumaWeights {
    fn default() -> Self {
        Self {
            r: 0.3,
            g: 0.59,
            b: 0.11,
        }
    }
}

impl LumaWeights {
    #[inline]
    pub fn luminance(self, px: Rgb) -> f32 {
        self.r * px.r + self.g * px.g + self.b * px.b
    }
}

/// How the two gradient buffers are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MagnitudeMode {
    /// `gx + gy` per channel.
    #[default]
    Sum,
    /// `sqrt(gx² + gy²)` per channel.
    Euclidean,
}

impl MagnitudeMode {
    #[inline]
    pub fn combine(self, gx: Rgb, gy: Rgb) -> Rgb {
        match self {
            MagnitudeMode::Sum => Rgb::new(gx.r + gy.r, gx.g + gy.g, gx.b + gy.b),
            MagnitudeMode::Euclidean => Rgb::new(
                gx.r.hypot(gy.r),
                gx.g.hypot(gy.g),
                gx.b.hypot(gy.b),
            ),
        }
    }
}

/// Kernel set used by the pipeline; defaults to the named 5×5 constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdgeKernels {
    pub blur: Kernel,
    pub horizontal: Kernel,
    pub vertical: Kernel,
}

impl Default for EdgeKernels {
    fn default() -> Self {
        Self {
            blur: Kernel::gaussian_5x5(),
            horizontal: Kernel::sobel_horizontal_5x5(),
            vertical: Kernel::sobel_vertical_5x5(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Blur,
    Greyscale,
    GradientX,
    GradientY,
    Magnitude,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Blur => "blur",
            StageKind::Greyscale => "greyscale",
            StageKind::GradientX => "gradient-x",
            StageKind::GradientY => "gradient-y",
            StageKind::Magnitude => "magnitude",
        }
    }
}

/// Per-stage counters for one pipeline run, in execution order.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub stages: Vec<(StageKind, StageStats)>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct EdgePipeline {
    stage: ConvolutionStage,
    kernels: EdgeKernels,
    luma: LumaWeights,
    magnitude: MagnitudeMode,
}

impl EdgePipeline {
    pub fn new(stage: ConvolutionStage) -> Self {
        Self {
            stage,
            kernels: EdgeKernels::default(),
            luma: LumaWeights::default(),
            magnitude: MagnitudeMode::default(),
        }
    }

    pub fn with_kernels(mut self, kernels: EdgeKernels) -> Self {
        self.kernels = kernels;
        self
    }

    pub fn with_luma(mut self, luma: LumaWeights) -> Self {
        self.luma = luma;
        self
    }

    pub fn with_magnitude(mut self, magnitude: MagnitudeMode) -> Self {
        self.magnitude = magnitude;
        self
    }

    pub fn stage(&self) -> &ConvolutionStage {
        &self.stage
    }

    pub fn kernels(&self) -> &EdgeKernels {
        &self.kernels
    }

    pub fn magnitude(&self) -> MagnitudeMode {
        self.magnitude
    }

    /// Run all five stages and return the edge map (same dimensions as `input`).
    pub fn run(&self, input: &PixelBuffer) -> ParconvResult<PixelBuffer> {
        self.run_with_report(input).map(|(out, _)| out)
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            width = input.width(),
            height = input.height(),
            strategy = %self.stage.strategy(),
            workers = self.stage.workers(),
        )
    )]
    pub fn run_with_report(
        &self,
        input: &PixelBuffer,
    ) -> ParconvResult<(PixelBuffer, PipelineReport)> {
        let started = Instant::now();
        let mut stages = Vec::with_capacity(5);

        let (blurred, stats) = self.stage.apply_with_stats(input, &self.kernels.blur)?;
        stages.push((StageKind::Blur, stats));

        let luma = self.luma;
        let (grey, stats) = self
            .stage
            .map(&blurred, |px| Rgb::splat(luma.luminance(px)))?;
        stages.push((StageKind::Greyscale, stats));
        drop(blurred);

        let (gx, stats) = self
            .stage
            .apply_with_stats(&grey, &self.kernels.horizontal)?;
        stages.push((StageKind::GradientX, stats));

        let (gy, stats) = self.stage.apply_with_stats(&grey, &self.kernels.vertical)?;
        stages.push((StageKind::GradientY, stats));

        let mode = self.magnitude;
        let (edges, stats) = self.stage.zip(&gx, &gy, |a, b| mode.combine(a, b))?;
        stages.push((StageKind::Magnitude, stats));

        let report = PipelineReport {
            stages,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            elapsed_us = report.elapsed.as_micros() as u64,
            "edge pipeline complete"
        );
        Ok((edges, report))
    }
}
