// src/distribution.rs

use crate::domain::{Domain, Interval};
use crate::error::{KarhunenLoeveError, Result};
use ndarray::{Array1, ArrayView1};
use rand::RngCore;
use rand_distr::{Distribution as RandDistribution, Normal, Uniform};

// Half-width, in standard deviations, of the numerical range of a normal marginal.
const NORMAL_RANGE_STD_DEVS: f64 = 8.0;

/// Reference probability distribution of a weighted experiment.
pub trait Distribution: Send + Sync {
    fn dimension(&self) -> usize;
    fn pdf(&self, point: ArrayView1<f64>) -> f64;
    /// Numerical support, as a box.
    fn range(&self) -> Interval;
    fn sample(&self, rng: &mut dyn RngCore) -> Array1<f64>;
}

/// Uniform distribution over a box.
#[derive(Debug, Clone)]
pub struct UniformBox {
    bounds: Interval,
    density: f64,
}

impl UniformBox {
    pub fn new(bounds: Interval) -> Result<Self> {
        if let Some(axis) = bounds.first_empty_axis() {
            return Err(KarhunenLoeveError::DegenerateDomain {
                axis,
                lower: bounds.lower()[axis],
                upper: bounds.upper()[axis],
            });
        }
        let volume = bounds.volume();
        if !(volume.is_finite() && volume > 0.0) {
            return Err(KarhunenLoeveError::InvalidArgument(format!("Uniform distribution needs a finite positive volume, got {}.", volume)));
        }
        Ok(Self { bounds, density: 1.0 / volume })
    }

    pub fn bounds(&self) -> &Interval {
        &self.bounds
    }
}

impl Distribution for UniformBox {
    fn dimension(&self) -> usize {
        self.bounds.lower().len()
    }

    fn pdf(&self, point: ArrayView1<f64>) -> f64 {
        if self.bounds.contains(point) {
            self.density
        } else {
            0.0
        }
    }

    fn range(&self) -> Interval {
        self.bounds.clone()
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array1<f64> {
        let lower = self.bounds.lower();
        let upper = self.bounds.upper();
        Array1::from_shape_fn(lower.len(), |i| Uniform::new_inclusive(lower[i], upper[i]).sample(&mut *rng))
    }
}

/// Product of independent normal marginals.
#[derive(Debug, Clone)]
pub struct IndependentNormal {
    mean: Array1<f64>,
    std_dev: Array1<f64>,
    range: Interval,
}

impl IndependentNormal {
    pub fn new(mean: Array1<f64>, std_dev: Array1<f64>) -> Result<Self> {
        if mean.is_empty() || mean.len() != std_dev.len() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Mean ({}) and standard deviation ({}) must have the same non-zero length.",
                mean.len(),
                std_dev.len()
            )));
        }
        if std_dev.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(KarhunenLoeveError::InvalidArgument(format!("Standard deviations must be finite and positive, got {}.", std_dev)));
        }
        let lower = &mean - &(&std_dev * NORMAL_RANGE_STD_DEVS);
        let upper = &mean + &(&std_dev * NORMAL_RANGE_STD_DEVS);
        let range = Interval::new(lower, upper)?;
        Ok(Self { mean, std_dev, range })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn std_dev(&self) -> &Array1<f64> {
        &self.std_dev
    }

    /// Standard normal distribution in `dimension` dimensions.
    pub fn standard(dimension: usize) -> Result<Self> {
        Self::new(Array1::zeros(dimension), Array1::ones(dimension))
    }
}

impl Distribution for IndependentNormal {
    fn dimension(&self) -> usize {
        self.mean.len()
    }

    fn pdf(&self, point: ArrayView1<f64>) -> f64 {
        let normalization = (2.0 * std::f64::consts::PI).sqrt();
        point
            .iter()
            .zip(self.mean.iter().zip(self.std_dev.iter()))
            .map(|(x, (m, s))| {
                let z = (x - m) / s;
                (-0.5 * z * z).exp() / (normalization * s)
            })
            .product()
    }

    fn range(&self) -> Interval {
        self.range.clone()
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array1<f64> {
        Array1::from_shape_fn(self.mean.len(), |i| {
            match Normal::new(self.mean[i], self.std_dev[i]) {
                Ok(normal) => normal.sample(&mut *rng),
                Err(_) => self.mean[i],
            }
        })
    }
}
