// src/experiment.rs

use crate::distribution::{Distribution, IndependentNormal, UniformBox};
use crate::error::{KarhunenLoeveError, Result};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use log::debug;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Generator of `(node, weight)` pairs approximating integrals against the
/// density of `distribution()`: `∫ f dP ≈ Σ_i weight_i f(node_i)`.
pub trait WeightedExperiment: Send + Sync {
    fn distribution(&self) -> &dyn Distribution;
    /// Number of nodes produced by `generate_with_weights`.
    fn size(&self) -> usize;
    /// Nodes (one per row) and their weights.
    fn generate_with_weights(&self) -> Result<(Array2<f64>, Array1<f64>)>;
}

/// Seeded Monte Carlo sampling with equal weights `1 / size`.
#[derive(Clone)]
pub struct MonteCarloExperiment {
    distribution: Arc<dyn Distribution>,
    size: usize,
    seed: u64,
}

impl MonteCarloExperiment {
    pub fn new(distribution: Arc<dyn Distribution>, size: usize, seed: u64) -> Result<Self> {
        if size == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Monte Carlo experiment size must be positive.".into()));
        }
        Ok(Self { distribution, size, seed })
    }
}

impl WeightedExperiment for MonteCarloExperiment {
    fn distribution(&self) -> &dyn Distribution {
        self.distribution.as_ref()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn generate_with_weights(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let dimension = self.distribution.dimension();
        let mut nodes = Array2::<f64>::zeros((self.size, dimension));
        for mut row in nodes.rows_mut() {
            row.assign(&self.distribution.sample(&mut rng));
        }
        let weights = Array1::from_elem(self.size, 1.0 / self.size as f64);
        Ok((nodes, weights))
    }
}

/// One-dimensional Gauss rule for a probability measure: nodes and weights summing to 1.
#[derive(Debug, Clone)]
pub struct GaussRule {
    pub nodes: Array1<f64>,
    pub weights: Array1<f64>,
}

/// Orthogonal polynomial family whose Jacobi matrix defines a Gauss rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaussFamily {
    /// Uniform measure on `[-1, 1]`.
    Legendre,
    /// Standard normal measure.
    Hermite,
}

impl GaussFamily {
    // Off-diagonal recurrence coefficient between degrees k-1 and k (the diagonal is zero for both families).
    fn beta(&self, k: usize) -> f64 {
        let k = k as f64;
        match self {
            GaussFamily::Legendre => k / (4.0 * k * k - 1.0).sqrt(),
            GaussFamily::Hermite => k.sqrt(),
        }
    }

    /// `size`-point rule computed with the Golub-Welsch algorithm: the nodes are the
    /// eigenvalues of the symmetric tridiagonal Jacobi matrix and the weights the
    /// squared first components of its normalized eigenvectors.
    pub fn rule(&self, size: usize) -> Result<GaussRule> {
        if size == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Gauss rule size must be positive.".into()));
        }
        let mut jacobi = Array2::<f64>::zeros((size, size));
        for k in 1..size {
            let beta = self.beta(k);
            jacobi[[k - 1, k]] = beta;
            jacobi[[k, k - 1]] = beta;
        }
        let backend = LinAlgBackendProvider::<f64>::new();
        let eigh = backend.eigh_upper(&jacobi)?;
        let weights = eigh.eigenvectors.row(0).mapv(|v| v * v);
        // Symmetric rules: pin the middle node of odd rules to exactly zero.
        let mut nodes = eigh.eigenvalues;
        if size % 2 == 1 {
            nodes[size / 2] = 0.0;
        }
        let total: f64 = weights.sum();
        Ok(GaussRule { nodes, weights: weights / total })
    }
}

/// Tensor product of one-dimensional Gauss rules for a product distribution.
#[derive(Clone)]
pub struct GaussProductExperiment {
    distribution: Arc<dyn Distribution>,
    marginal_rules: Vec<GaussRule>,
}

impl GaussProductExperiment {
    /// Gauss-Legendre product rule for a uniform distribution on a box.
    pub fn uniform(distribution: UniformBox, marginal_sizes: &[usize]) -> Result<Self> {
        check_marginal_sizes(distribution.dimension(), marginal_sizes)?;
        let lower = distribution.bounds().lower().clone();
        let upper = distribution.bounds().upper().clone();
        let marginal_rules = marginal_sizes
            .iter()
            .enumerate()
            .map(|(axis, &size)| {
                let reference = GaussFamily::Legendre.rule(size)?;
                let center = 0.5 * (lower[axis] + upper[axis]);
                let half_width = 0.5 * (upper[axis] - lower[axis]);
                Ok(GaussRule { nodes: reference.nodes.mapv(|t| center + half_width * t), weights: reference.weights })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { distribution: Arc::new(distribution), marginal_rules })
    }

    /// Gauss-Hermite product rule for independent normal marginals.
    pub fn normal(distribution: IndependentNormal, marginal_sizes: &[usize]) -> Result<Self> {
        check_marginal_sizes(distribution.dimension(), marginal_sizes)?;
        let marginal_rules = marginal_sizes
            .iter()
            .enumerate()
            .map(|(axis, &size)| {
                let reference = GaussFamily::Hermite.rule(size)?;
                let mean = distribution.mean()[axis];
                let std_dev = distribution.std_dev()[axis];
                Ok(GaussRule { nodes: reference.nodes.mapv(|t| mean + std_dev * t), weights: reference.weights })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { distribution: Arc::new(distribution), marginal_rules })
    }

    pub fn marginal_rules(&self) -> &[GaussRule] {
        &self.marginal_rules
    }
}

fn check_marginal_sizes(dimension: usize, marginal_sizes: &[usize]) -> Result<()> {
    if marginal_sizes.len() != dimension {
        return Err(KarhunenLoeveError::InvalidArgument(format!(
            "Expected {} marginal sizes, got {}.",
            dimension,
            marginal_sizes.len()
        )));
    }
    if marginal_sizes.iter().any(|&m| m == 0) {
        return Err(KarhunenLoeveError::InvalidArgument("Marginal sizes must be positive.".into()));
    }
    Ok(())
}

impl WeightedExperiment for GaussProductExperiment {
    fn distribution(&self) -> &dyn Distribution {
        self.distribution.as_ref()
    }

    fn size(&self) -> usize {
        self.marginal_rules.iter().map(|rule| rule.nodes.len()).product()
    }

    fn generate_with_weights(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        let size = self.size();
        let dimension = self.marginal_rules.len();
        let mut nodes = Array2::<f64>::zeros((size, dimension));
        let mut weights = Array1::<f64>::ones(size);
        // The first axis varies fastest.
        for flat in 0..size {
            let mut remainder = flat;
            for (axis, rule) in self.marginal_rules.iter().enumerate() {
                let m = rule.nodes.len();
                let index = remainder % m;
                remainder /= m;
                nodes[[flat, axis]] = rule.nodes[index];
                weights[flat] *= rule.weights[index];
            }
        }
        debug!("Generated {} Gauss product nodes in dimension {}.", size, dimension);
        Ok((nodes, weights))
    }
}
