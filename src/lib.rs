//! Parallel 2D convolution and Sobel edge detection.
//!
//! The crate applies a square kernel to every pixel of an image and distributes that work over
//! a selectable strategy:
//!
//! - [`Strategy::Sequential`]: one worker, no partitioning.
//! - [`Strategy::StaticChunks`]: fixed contiguous index ranges per worker.
//! - [`Strategy::DynamicCursor`]: workers claim single indices from a shared atomic cursor.
//! - [`Strategy::RayonRows`]: rows scheduled on a rayon pool.
//!
//! Every strategy produces the same pixels. [`EdgePipeline`] chains blur, greyscale, two
//! gradient convolutions and a magnitude step over one [`ConvolutionStage`].
#![forbid(unsafe_code)]

pub mod buffer;
pub mod codec;
pub mod config;
mod foundation;
pub mod kernel;
pub mod parallel;
pub mod pipeline;
pub mod stage;

pub use crate::buffer::{PixelBuffer, Rgb};
pub use crate::config::PipelineConfig;
pub use crate::foundation::error::{ParconvError, ParconvResult};
pub use crate::kernel::{GAUSSIAN_5X5, Kernel, SOBEL_HORIZONTAL_5X5, SOBEL_VERTICAL_5X5};
pub use crate::parallel::{
    CompletionBarrier, CompletionToken, PartitionPolicy, PartitionRange, Strategy,
    WorkPartitioner, static_ranges,
};
pub use crate::pipeline::{
    EdgeKernels, EdgePipeline, LumaWeights, MagnitudeMode, PipelineReport, StageKind,
};
pub use crate::stage::{ConvolutionStage, StageStats};
