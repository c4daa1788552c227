//! JSON pipeline configuration.
//!
//! ```json
//! {
//!   "workers": 8,
//!   "strategy": "dynamic-cursor",
//!   "magnitude": "sum",
//!   "luma": { "r": 0.3, "g": 0.59, "b": 0.11 },
//!   "kernels": { "blur": [[0, 0, 0], [0, 1, 0], [0, 0, 0]] }
//! }
//! ```
//!
//! Every field is optional. `workers: null` (or absent) leaves the choice to the caller.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    foundation::error::{ParconvError, ParconvResult},
    kernel::Kernel,
    parallel::Strategy,
    pipeline::{EdgeKernels, EdgePipeline, LumaWeights, MagnitudeMode},
    stage::ConvolutionStage,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub workers: Option<u32>,
    pub strategy: Strategy,
    pub magnitude: MagnitudeMode,
    pub luma: LumaWeights,
    pub kernels: EdgeKernels,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> ParconvResult<Self> {
        let value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| ParconvError::config(format!("parse pipeline config: {e}")))?;

        // Shape errors in kernel tables surface as InvalidKernel rather than a generic
        // deserialization failure.
        if let Some(kernels) = value.get("kernels").and_then(serde_json::Value::as_object) {
            for (name, rows) in kernels {
                let Ok(rows) = serde_json::from_value::<Vec<Vec<f32>>>(rows.clone()) else {
                    continue;
                };
                Kernel::try_from(rows).map_err(|e| match e {
                    ParconvError::InvalidKernel(msg) => {
                        ParconvError::invalid_kernel(format!("kernels.{name}: {msg}"))
                    }
                    other => other,
                })?;
            }
        }

        serde_json::from_value(value)
            .map_err(|e| ParconvError::config(format!("parse pipeline config: {e}")))
    }

    pub fn load(path: &Path) -> ParconvResult<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            ParconvError::config(format!("read pipeline config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&s)
    }

    /// Build the pipeline, using `fallback_workers` when the config leaves `workers` unset.
    pub fn build_pipeline(&self, fallback_workers: u32) -> ParconvResult<EdgePipeline> {
        let workers = self.workers.unwrap_or(fallback_workers);
        let stage = ConvolutionStage::new(workers, self.strategy)?;
        Ok(EdgePipeline::new(stage)
            .with_kernels(self.kernels.clone())
            .with_luma(self.luma)
            .with_magnitude(self.magnitude))
    }
}
