// src/domain.rs

use crate::error::{KarhunenLoeveError, Result};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A subset of `R^n` used as the integration domain of a Fredholm problem.
pub trait Domain: Send + Sync {
    fn dimension(&self) -> usize;
    /// Whether `point` belongs to the domain. `point` must have `dimension()` components.
    fn contains(&self, point: ArrayView1<f64>) -> bool;
    /// Lower corner of the axis-aligned bounding box.
    fn lower_bound(&self) -> Array1<f64>;
    /// Upper corner of the axis-aligned bounding box.
    fn upper_bound(&self) -> Array1<f64>;
}

/// Axis-aligned box `[lower_0, upper_0] x ... x [lower_n, upper_n]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl Interval {
    pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Interval bounds have different dimensions ({} and {}).",
                lower.len(),
                upper.len()
            )));
        }
        if lower.is_empty() {
            return Err(KarhunenLoeveError::InvalidArgument("Interval must have dimension at least 1.".into()));
        }
        if lower.iter().chain(upper.iter()).any(|v| v.is_nan()) {
            return Err(KarhunenLoeveError::InvalidArgument("Interval bounds contain NaN.".into()));
        }
        Ok(Self { lower, upper })
    }

    /// The hypercube `[lower, upper]^dimension`.
    pub fn cube(dimension: usize, lower: f64, upper: f64) -> Result<Self> {
        Self::new(Array1::from_elem(dimension, lower), Array1::from_elem(dimension, upper))
    }

    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }

    pub fn widths(&self) -> Array1<f64> {
        &self.upper - &self.lower
    }

    pub fn center(&self) -> Array1<f64> {
        (&self.upper + &self.lower) * 0.5
    }

    pub fn volume(&self) -> f64 {
        self.widths().iter().map(|w| w.max(0.0)).product()
    }

    /// First axis along which the box has no interior, if any.
    pub fn first_empty_axis(&self) -> Option<usize> {
        self.lower.iter().zip(self.upper.iter()).position(|(l, u)| !(u > l))
    }

    pub fn is_empty(&self) -> bool {
        self.first_empty_axis().is_some()
    }

    /// Bounding box of an arbitrary domain.
    pub fn bounding_box(domain: &dyn Domain) -> Result<Self> {
        Self::new(domain.lower_bound(), domain.upper_bound())
    }

    /// Component-wise comparison of the bounds with an absolute tolerance.
    pub fn approx_eq(&self, other: &Interval, tolerance: f64) -> bool {
        self.lower.len() == other.lower.len()
            && Zip::from(&self.lower).and(&other.lower).all(|a, b| (a - b).abs() <= tolerance)
            && Zip::from(&self.upper).and(&other.upper).all(|a, b| (a - b).abs() <= tolerance)
    }
}

impl Domain for Interval {
    fn dimension(&self) -> usize {
        self.lower.len()
    }

    fn contains(&self, point: ArrayView1<f64>) -> bool {
        point.len() == self.lower.len()
            && Zip::from(&point).and(&self.lower).and(&self.upper).all(|x, l, u| *x >= *l && *x <= *u)
    }

    fn lower_bound(&self) -> Array1<f64> {
        self.lower.clone()
    }

    fn upper_bound(&self) -> Array1<f64> {
        self.upper.clone()
    }
}

/// Closed Euclidean ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    center: Array1<f64>,
    radius: f64,
}

impl Ball {
    pub fn new(center: Array1<f64>, radius: f64) -> Result<Self> {
        if center.is_empty() {
            return Err(KarhunenLoeveError::InvalidArgument("Ball center must have dimension at least 1.".into()));
        }
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(KarhunenLoeveError::InvalidArgument(format!("Ball radius must be finite and non-negative, got {}.", radius)));
        }
        Ok(Self { center, radius })
    }

    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Domain for Ball {
    fn dimension(&self) -> usize {
        self.center.len()
    }

    fn contains(&self, point: ArrayView1<f64>) -> bool {
        if point.len() != self.center.len() {
            return false;
        }
        let squared_distance: f64 = point.iter().zip(self.center.iter()).map(|(x, c)| (x - c) * (x - c)).sum();
        squared_distance <= self.radius * self.radius
    }

    fn lower_bound(&self) -> Array1<f64> {
        self.center.mapv(|c| c - self.radius)
    }

    fn upper_bound(&self) -> Array1<f64> {
        self.center.mapv(|c| c + self.radius)
    }
}

/// Sublevel set `{x in bounds : f(x) <= level}`.
#[derive(Clone)]
pub struct LevelSet {
    function: Arc<dyn Fn(ArrayView1<f64>) -> f64 + Send + Sync>,
    level: f64,
    bounds: Interval,
}

impl LevelSet {
    pub fn new<G>(function: G, level: f64, bounds: Interval) -> Self
    where
        G: Fn(ArrayView1<f64>) -> f64 + Send + Sync + 'static,
    {
        Self { function: Arc::new(function), level, bounds }
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}

impl fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelSet").field("level", &self.level).field("bounds", &self.bounds).finish()
    }
}

impl Domain for LevelSet {
    fn dimension(&self) -> usize {
        self.bounds.dimension()
    }

    fn contains(&self, point: ArrayView1<f64>) -> bool {
        self.bounds.contains(point) && (self.function)(point) <= self.level
    }

    fn lower_bound(&self) -> Array1<f64> {
        self.bounds.lower_bound()
    }

    fn upper_bound(&self) -> Array1<f64> {
        self.bounds.upper_bound()
    }
}

/// Affine map sending one box onto another, axis by axis:
/// `y_i = target_center_i + factor_i * (x_i - source_center_i)` with
/// `factor_i = target_width_i / source_width_i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineScaling {
    source_center: Array1<f64>,
    target_center: Array1<f64>,
    factors: Array1<f64>,
}

impl AffineScaling {
    pub fn between(source: &Interval, target: &Interval) -> Result<Self> {
        if source.dimension() != target.dimension() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Cannot scale a box of dimension {} onto a box of dimension {}.",
                source.dimension(),
                target.dimension()
            )));
        }
        if let Some(axis) = source.first_empty_axis() {
            return Err(KarhunenLoeveError::DegenerateDomain {
                axis,
                lower: source.lower()[axis],
                upper: source.upper()[axis],
            });
        }
        let factors = target.widths() / source.widths();
        if factors.iter().any(|f| !f.is_finite()) {
            return Err(KarhunenLoeveError::InvalidArgument(
                "Scaling between boxes requires finite widths; the source box is unbounded.".into(),
            ));
        }
        Ok(Self { source_center: source.center(), target_center: target.center(), factors })
    }

    pub fn dimension(&self) -> usize {
        self.factors.len()
    }

    pub fn apply(&self, point: ArrayView1<f64>) -> Array1<f64> {
        let mut image = point.to_owned();
        Zip::from(&mut image)
            .and(&self.source_center)
            .and(&self.target_center)
            .and(&self.factors)
            .for_each(|x, s, t, f| *x = t + f * (*x - s));
        image
    }

    pub fn inverse(&self) -> Self {
        Self {
            source_center: self.target_center.clone(),
            target_center: self.source_center.clone(),
            factors: self.factors.mapv(|f| 1.0 / f),
        }
    }

    /// Jacobian determinant of the map (product of the per-axis factors).
    pub fn normalization_factor(&self) -> f64 {
        self.factors.iter().product()
    }
}
