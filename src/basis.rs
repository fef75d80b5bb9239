// src/basis.rs

use crate::error::{KarhunenLoeveError, Result};
use ndarray::ArrayView1;
use std::sync::Arc;

/// Real-valued function of one point.
pub type ScalarFunction = Arc<dyn Fn(ArrayView1<f64>) -> f64 + Send + Sync>;

/// Indexable family of scalar functions used as a projection basis.
pub trait FunctionalBasis: Send + Sync {
    fn input_dimension(&self) -> usize;
    fn build(&self, index: usize) -> Result<ScalarFunction>;
}

/// Univariate orthonormal polynomial families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolynomialFamily {
    /// Orthonormal with respect to the uniform density on `[-1, 1]`.
    Legendre,
    /// Orthonormal with respect to the standard normal density.
    Hermite,
}

impl PolynomialFamily {
    /// Value of the orthonormal polynomial of degree `degree` at `x`.
    pub fn evaluate(&self, degree: usize, x: f64) -> f64 {
        match self {
            PolynomialFamily::Legendre => {
                let (mut previous, mut current) = (0.0, 1.0);
                for n in 0..degree {
                    let n = n as f64;
                    let next = ((2.0 * n + 1.0) * x * current - n * previous) / (n + 1.0);
                    previous = current;
                    current = next;
                }
                current * (2.0 * degree as f64 + 1.0).sqrt()
            }
            PolynomialFamily::Hermite => {
                let (mut previous, mut current) = (0.0, 1.0);
                let mut factorial = 1.0;
                for n in 0..degree {
                    let next = x * current - n as f64 * previous;
                    previous = current;
                    current = next;
                    factorial *= (n + 1) as f64;
                }
                current / factorial.sqrt()
            }
        }
    }
}

/// Tensor products of univariate orthonormal polynomials.
///
/// Multi-indices are enumerated by increasing total degree; within a degree the
/// first component decreases, so in dimension 2 the order is
/// `(0,0) (1,0) (0,1) (2,0) (1,1) (0,2) ...`.
#[derive(Debug, Clone)]
pub struct OrthonormalProductBasis {
    families: Vec<PolynomialFamily>,
}

impl OrthonormalProductBasis {
    pub fn new(families: Vec<PolynomialFamily>) -> Result<Self> {
        if families.is_empty() {
            return Err(KarhunenLoeveError::InvalidArgument("Product basis needs at least one marginal family.".into()));
        }
        Ok(Self { families })
    }

    pub fn legendre(dimension: usize) -> Result<Self> {
        Self::new(vec![PolynomialFamily::Legendre; dimension])
    }

    pub fn hermite(dimension: usize) -> Result<Self> {
        Self::new(vec![PolynomialFamily::Hermite; dimension])
    }

    /// Multi-index of the `index`-th basis function.
    pub fn multi_index(&self, index: usize) -> Vec<usize> {
        let dimension = self.families.len();
        let mut remaining = index;
        let mut degree = 0;
        loop {
            let count = indices_of_degree(dimension, degree);
            if remaining < count {
                return nth_index_of_degree(dimension, degree, remaining);
            }
            remaining -= count;
            degree += 1;
        }
    }
}

// Number of multi-indices of length `dimension` summing to `degree`: C(degree + dimension - 1, dimension - 1).
fn indices_of_degree(dimension: usize, degree: usize) -> usize {
    let mut count: usize = 1;
    for k in 1..dimension {
        count = count * (degree + k) / k;
    }
    count
}

fn nth_index_of_degree(dimension: usize, degree: usize, mut rank: usize) -> Vec<usize> {
    let mut multi_index = Vec::with_capacity(dimension);
    let mut left = degree;
    for axis in 0..dimension {
        if axis + 1 == dimension {
            multi_index.push(left);
            break;
        }
        // First component decreasing: try the largest value first.
        let mut value = left;
        loop {
            let tail = indices_of_degree(dimension - axis - 1, left - value);
            if rank < tail {
                break;
            }
            rank -= tail;
            value -= 1;
        }
        multi_index.push(value);
        left -= value;
    }
    multi_index
}

impl FunctionalBasis for OrthonormalProductBasis {
    fn input_dimension(&self) -> usize {
        self.families.len()
    }

    fn build(&self, index: usize) -> Result<ScalarFunction> {
        let multi_index = self.multi_index(index);
        let families = self.families.clone();
        Ok(Arc::new(move |point: ArrayView1<f64>| {
            families
                .iter()
                .zip(multi_index.iter())
                .zip(point.iter())
                .map(|((family, &degree), &x)| family.evaluate(degree, x))
                .product()
        }))
    }
}
