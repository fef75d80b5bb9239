// src/covariance.rs

use crate::error::{KarhunenLoeveError, Result};
use log::trace;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Covariance function of a vector-valued random field.
///
/// `block(s, t)` is the `output_dimension x output_dimension` covariance between the
/// field values at `s` and `t`. Implementations must be symmetric,
/// `block(s, t) = block(t, s)ᵗ`, and positive semidefinite.
pub trait CovarianceModel: Send + Sync {
    fn input_dimension(&self) -> usize;
    fn output_dimension(&self) -> usize;
    fn block(&self, s: ArrayView1<f64>, t: ArrayView1<f64>) -> Array2<f64>;

    /// Covariance matrix of the field at `points` (one point per row).
    ///
    /// Entry `[i·d + k][j·d + l]` is `block(p_i, p_j)[k][l]`. Block rows are
    /// evaluated in parallel.
    fn discretize(&self, points: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (point_count, point_dimension) = points.dim();
        if point_dimension != self.input_dimension() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Covariance model expects points of dimension {} but got dimension {}.",
                self.input_dimension(),
                point_dimension
            )));
        }
        let d = self.output_dimension();
        if d == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Covariance model has output dimension 0.".into()));
        }
        if point_count == 0 {
            return Ok(Array2::zeros((0, 0)));
        }
        let block_rows: Vec<Array2<f64>> = (0..point_count)
            .into_par_iter()
            .map(|i| {
                let mut block_row = Array2::<f64>::zeros((d, point_count * d));
                for j in 0..point_count {
                    let block = self.block(points.row(i), points.row(j));
                    if block.dim() != (d, d) {
                        return Err(KarhunenLoeveError::InvalidArgument(format!(
                            "Covariance model returned a {:?} block for points ({}, {}), expected ({}, {}).",
                            block.dim(),
                            i,
                            j,
                            d,
                            d
                        )));
                    }
                    block_row.slice_mut(s![.., j * d..(j + 1) * d]).assign(&block);
                }
                Ok(block_row)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut matrix = Array2::<f64>::zeros((point_count * d, point_count * d));
        for (i, block_row) in block_rows.iter().enumerate() {
            matrix.slice_mut(s![i * d..(i + 1) * d, ..]).assign(block_row);
        }
        trace!("Discretized covariance model over {} points (matrix {}x{}).", point_count, point_count * d, point_count * d);
        Ok(matrix)
    }
}

/// Correlation profile `ρ(r)` of a stationary model, `r` being the scaled distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationKernel {
    /// `exp(-r²/2)`
    SquaredExponential,
    /// `exp(-r)`
    AbsoluteExponential,
    /// `(1 + √5 r + 5r²/3) exp(-√5 r)`
    Matern52,
}

impl CorrelationKernel {
    pub fn evaluate(&self, r: f64) -> f64 {
        match self {
            CorrelationKernel::SquaredExponential => (-0.5 * r * r).exp(),
            CorrelationKernel::AbsoluteExponential => (-r).exp(),
            CorrelationKernel::Matern52 => {
                let sqrt5_r = 5.0_f64.sqrt() * r;
                (1.0 + sqrt5_r + sqrt5_r * sqrt5_r / 3.0) * (-sqrt5_r).exp()
            }
        }
    }
}

/// Stationary model `C(s, t) = diag(a) · R · diag(a) · ρ(‖(s - t) / θ‖)`.
///
/// `θ` holds one correlation length per input axis, `a` one amplitude per output
/// component, and `R` is the correlation between output components (identity by default).
#[derive(Debug, Clone)]
pub struct StationaryCovarianceModel {
    kernel: CorrelationKernel,
    scale: Array1<f64>,
    amplitude: Array1<f64>,
    output_covariance: Array2<f64>,
}

impl StationaryCovarianceModel {
    pub fn new(kernel: CorrelationKernel, scale: Array1<f64>, amplitude: Array1<f64>) -> Result<Self> {
        if scale.is_empty() || amplitude.is_empty() {
            return Err(KarhunenLoeveError::InvalidArgument("Scale and amplitude must be non-empty.".into()));
        }
        if scale.iter().any(|&v| !(v.is_finite() && v > 0.0)) {
            return Err(KarhunenLoeveError::InvalidArgument(format!("Scale components must be finite and positive, got {}.", scale)));
        }
        if amplitude.iter().any(|&v| !(v.is_finite() && v > 0.0)) {
            return Err(KarhunenLoeveError::InvalidArgument(format!("Amplitude components must be finite and positive, got {}.", amplitude)));
        }
        let output_covariance = Array2::from_diag(&amplitude.mapv(|a| a * a));
        Ok(Self { kernel, scale, amplitude, output_covariance })
    }

    pub fn squared_exponential(scale: Array1<f64>, amplitude: Array1<f64>) -> Result<Self> {
        Self::new(CorrelationKernel::SquaredExponential, scale, amplitude)
    }

    pub fn absolute_exponential(scale: Array1<f64>, amplitude: Array1<f64>) -> Result<Self> {
        Self::new(CorrelationKernel::AbsoluteExponential, scale, amplitude)
    }

    /// Replaces the output correlation `R` (symmetric, unit diagonal, `d x d`).
    pub fn with_output_correlation(mut self, correlation: Array2<f64>) -> Result<Self> {
        let d = self.amplitude.len();
        if correlation.dim() != (d, d) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Output correlation must be {}x{}, got {:?}.",
                d,
                d,
                correlation.dim()
            )));
        }
        for i in 0..d {
            if (correlation[[i, i]] - 1.0).abs() > 1e-12 {
                return Err(KarhunenLoeveError::InvalidArgument(format!("Output correlation diagonal entry {} is not 1.", i)));
            }
            for j in 0..i {
                if (correlation[[i, j]] - correlation[[j, i]]).abs() > 1e-12 {
                    return Err(KarhunenLoeveError::InvalidArgument(format!("Output correlation is not symmetric at ({}, {}).", i, j)));
                }
            }
        }
        let amplitude = &self.amplitude;
        self.output_covariance = Array2::from_shape_fn((d, d), |(i, j)| amplitude[i] * correlation[[i, j]] * amplitude[j]);
        Ok(self)
    }

    pub fn kernel(&self) -> CorrelationKernel {
        self.kernel
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn amplitude(&self) -> &Array1<f64> {
        &self.amplitude
    }
}

impl CovarianceModel for StationaryCovarianceModel {
    fn input_dimension(&self) -> usize {
        self.scale.len()
    }

    fn output_dimension(&self) -> usize {
        self.amplitude.len()
    }

    fn block(&self, s: ArrayView1<f64>, t: ArrayView1<f64>) -> Array2<f64> {
        let r = s
            .iter()
            .zip(t.iter())
            .zip(self.scale.iter())
            .map(|((a, b), theta)| {
                let u = (a - b) / theta;
                u * u
            })
            .sum::<f64>()
            .sqrt();
        &self.output_covariance * self.kernel.evaluate(r)
    }
}

/// Covariance model given by an arbitrary block function.
#[derive(Clone)]
pub struct UserDefinedCovarianceModel {
    input_dimension: usize,
    output_dimension: usize,
    function: Arc<dyn Fn(ArrayView1<f64>, ArrayView1<f64>) -> Array2<f64> + Send + Sync>,
}

impl UserDefinedCovarianceModel {
    pub fn new<G>(input_dimension: usize, output_dimension: usize, function: G) -> Self
    where
        G: Fn(ArrayView1<f64>, ArrayView1<f64>) -> Array2<f64> + Send + Sync + 'static,
    {
        Self { input_dimension, output_dimension, function: Arc::new(function) }
    }

    /// Scalar model from a function returning `C(s, t)`.
    pub fn scalar<G>(input_dimension: usize, function: G) -> Self
    where
        G: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Send + Sync + 'static,
    {
        Self::new(input_dimension, 1, move |s, t| Array2::from_elem((1, 1), function(s, t)))
    }
}

impl fmt::Debug for UserDefinedCovarianceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDefinedCovarianceModel")
            .field("input_dimension", &self.input_dimension)
            .field("output_dimension", &self.output_dimension)
            .finish()
    }
}

impl CovarianceModel for UserDefinedCovarianceModel {
    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn block(&self, s: ArrayView1<f64>, t: ArrayView1<f64>) -> Array2<f64> {
        (self.function)(s, t)
    }
}
