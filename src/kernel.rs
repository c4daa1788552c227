//! Square convolution kernels with odd side length.
//!
//! Kernels are immutable once built and shared read-only by every worker of a stage. The named
//! 5×5 tables used by the edge pipeline live here as plain constants; [`EdgeKernels`] passes them
//! explicitly so tests can substitute their own.
//!
//! [`EdgeKernels`]: crate::pipeline::EdgeKernels
use serde::{Deserialize, Serialize};

use crate::foundation::error::{ParconvError, ParconvResult};

/// Normalized 5×5 Gaussian noise-reduction weights (sum ≈ 0.987).
pub const GAUSSIAN_5X5: [[f32; 5]; 5] = [
    [0.003, 0.013, 0.022, 0.013, 0.003],
    [0.013, 0.059, 0.097, 0.059, 0.013],
    [0.022, 0.097, 0.159, 0.097, 0.022],
    [0.013, 0.059, 0.097, 0.059, 0.013],
    [0.003, 0.013, 0.022, 0.013, 0.003],
];

/// Horizontal 5×5 Sobel gradient (un-normalized).
pub const SOBEL_HORIZONTAL_5X5: [[f32; 5]; 5] = [
    [2.0, 1.0, 0.0, -1.0, -2.0],
    [2.0, 1.0, 0.0, -1.0, -2.0],
    [4.0, 2.0, 0.0, -2.0, -4.0],
    [2.0, 1.0, 0.0, -1.0, -2.0],
    [2.0, 1.0, 0.0, -1.0, -2.0],
];

/// Vertical 5×5 Sobel gradient (un-normalized).
pub const SOBEL_VERTICAL_5X5: [[f32; 5]; 5] = [
    [2.0, 2.0, 4.0, 2.0, 2.0],
    [1.0, 1.0, 2.0, 1.0, 1.0],
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [-1.0, -1.0, -2.0, -1.0, -1.0],
    [-2.0, -2.0, -4.0, -2.0, -2.0],
];

/// Square weight matrix, stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f32>>", into = "Vec<Vec<f32>>")]
pub struct Kernel {
    side: usize,
    weights: Vec<f32>,
}

impl Kernel {
    /// Build a kernel from `side * side` row-major weights. `side` must be odd.
    pub fn new(side: usize, weights: Vec<f32>) -> ParconvResult<Self> {
        if side == 0 {
            return Err(ParconvError::invalid_kernel("side length must be positive"));
        }
        if side % 2 == 0 {
            return Err(ParconvError::invalid_kernel(format!(
                "side length must be odd, got {side}"
            )));
        }
        if weights.len() != side * side {
            return Err(ParconvError::invalid_kernel(format!(
                "expected {} weights for side {side}, got {}",
                side * side,
                weights.len()
            )));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(ParconvError::invalid_kernel(format!(
                "weights must be finite, got {w}"
            )));
        }
        Ok(Self { side, weights })
    }

    pub fn from_rows<const N: usize>(rows: [[f32; N]; N]) -> ParconvResult<Self> {
        Self::new(N, rows.iter().flatten().copied().collect())
    }

    pub fn gaussian_5x5() -> Self {
        Self::from_const(&GAUSSIAN_5X5)
    }

    pub fn sobel_horizontal_5x5() -> Self {
        Self::from_const(&SOBEL_HORIZONTAL_5X5)
    }

    pub fn sobel_vertical_5x5() -> Self {
        Self::from_const(&SOBEL_VERTICAL_5X5)
    }

    /// All-zero kernel with a single `1.0` at the centre.
    pub fn identity(side: usize) -> ParconvResult<Self> {
        let mut weights = vec![0.0; side * side];
        if let Some(centre) = weights.get_mut((side * side) / 2) {
            *centre = 1.0;
        }
        Self::new(side, weights)
    }

    /// Box filter whose weights sum to one.
    pub fn box_filter(side: usize) -> ParconvResult<Self> {
        let n = side * side;
        Self::new(side, vec![1.0 / n.max(1) as f32; n])
    }

    fn from_const(rows: &[[f32; 5]; 5]) -> Self {
        Self {
            side: 5,
            weights: rows.iter().flatten().copied().collect(),
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Offset from the top-left cell to the centre cell.
    pub fn radius(&self) -> usize {
        self.side / 2
    }

    #[inline]
    pub fn weight(&self, kx: usize, ky: usize) -> f32 {
        self.weights[ky * self.side + kx]
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

impl TryFrom<Vec<Vec<f32>>> for Kernel {
    type Error = ParconvError;

    fn try_from(rows: Vec<Vec<f32>>) -> ParconvResult<Self> {
        let side = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != side) {
            return Err(ParconvError::invalid_kernel(format!(
                "kernel must be square: row {i} has {} weights, expected {side}",
                row.len()
            )));
        }
        Self::new(side, rows.into_iter().flatten().collect())
    }
}

impl From<Kernel> for Vec<Vec<f32>> {
    fn from(k: Kernel) -> Self {
        k.weights.chunks(k.side).map(<[f32]>::to_vec).collect()
    }
}
