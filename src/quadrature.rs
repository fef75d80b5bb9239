// src/quadrature.rs

use crate::basis::{FunctionalBasis, ScalarFunction};
use crate::covariance::CovarianceModel;
use crate::domain::{AffineScaling, Domain, Interval};
use crate::eigenpairs::{norm2, retained_count, sort_decreasing};
use crate::error::{KarhunenLoeveError, Result};
use crate::experiment::WeightedExperiment;
use crate::linalg_backends::{BackendCholesky, BackendEigh, BackendTriangularSolve, LinAlgBackendProvider};
use crate::result::{KarhunenLoeveFunction, KarhunenLoeveResult};
use crate::settings;
use log::{debug, info, trace, warn};
use ndarray::{s, Array1, Array2, ArrayView1, Zip};
use std::sync::Arc;
use std::time::Instant;

// Bounding boxes closer than this (absolute, per bound) are treated as identical.
const SAME_BOUNDS_TOLERANCE: f64 = 1e-12;

/// Configuration of a [`QuadratureFactory`].
#[derive(Clone, Debug)]
pub struct QuadratureConfig {
    /// Number of basis functions used in the Galerkin projection.
    pub basis_size: usize,
    /// Compose the basis functions with the inverse of the domain rescaling, so
    /// that they are evaluated in the coordinates of the experiment distribution.
    pub must_scale: bool,
    /// Relative eigenvalue threshold: modes with `λ_j <= threshold · |λ_0|` are dropped.
    pub threshold: f64,
    /// Optional cap on the number of retained modes.
    pub max_modes: Option<usize>,
}

impl Default for QuadratureConfig {
    fn default() -> Self {
        QuadratureConfig {
            basis_size: 10,
            must_scale: false,
            threshold: 0.0,
            max_modes: None,
        }
    }
}

/// Karhunen-Loeve decomposition by Galerkin projection on a functional basis,
/// with integrals computed by a weighted experiment.
///
/// Construction fixes everything that does not depend on the covariance model:
/// the integration nodes lying inside the domain and their Lebesgue weights
/// `w_i = √(J · rawWeight_i / pdf(rawNode_i))` (`J` being the Jacobian of the
/// rescaling onto the domain), the design matrix `Θ[i][j] = w_i · θ_j(x_i)` and the
/// Cholesky factor `L` of `Θᵗ·Θ + εI`.
#[derive(Clone)]
pub struct QuadratureFactory {
    dimension: usize,
    config: QuadratureConfig,
    regularization_factor: f64,
    functions: Arc<Vec<ScalarFunction>>,
    scaling: Option<AffineScaling>,
    normalization_factor: f64,
    generated_node_count: usize,
    /// Kept nodes in domain coordinates. Shape: `(node_count, dimension)`
    nodes: Array2<f64>,
    weights: Array1<f64>,
    /// Shape: `(node_count, basis_size)`
    design_matrix: Array2<f64>,
    /// Shape: `(basis_size, basis_size)`
    cholesky_factor: Array2<f64>,
}

impl std::fmt::Debug for QuadratureFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadratureFactory")
            .field("dimension", &self.dimension)
            .field("config", &self.config)
            .field("regularization_factor", &self.regularization_factor)
            .field("node_count", &self.nodes.nrows())
            .field("generated_node_count", &self.generated_node_count)
            .field("normalization_factor", &self.normalization_factor)
            .finish()
    }
}

/// Block-diagonal replication `M ⊗ I_d`: entry `[i·d + k][j·d + k] = M[i][j]`.
fn replicate_over_components(matrix: &Array2<f64>, d: usize) -> Array2<f64> {
    if d == 1 {
        return matrix.clone();
    }
    let (rows, cols) = matrix.dim();
    let mut expanded = Array2::<f64>::zeros((rows * d, cols * d));
    for ((i, j), &value) in matrix.indexed_iter() {
        if value != 0.0 {
            for k in 0..d {
                expanded[[i * d + k, j * d + k]] = value;
            }
        }
    }
    expanded
}

impl QuadratureFactory {
    /// Creates a factory whose Gram matrix is regularized by the
    /// `QuadratureFactory-RegularizationFactor` setting.
    pub fn new(
        domain: &dyn Domain,
        experiment: &dyn WeightedExperiment,
        basis: &dyn FunctionalBasis,
        config: QuadratureConfig,
    ) -> Result<Self> {
        let regularization_factor = settings::get_scalar(settings::QUADRATURE_REGULARIZATION_FACTOR);
        Self::with_regularization(domain, experiment, basis, config, regularization_factor)
    }

    /// Creates a factory adding `regularization_factor` to the diagonal of `Θᵗ·Θ`.
    pub fn with_regularization(
        domain: &dyn Domain,
        experiment: &dyn WeightedExperiment,
        basis: &dyn FunctionalBasis,
        config: QuadratureConfig,
        regularization_factor: f64,
    ) -> Result<Self> {
        let start_time = Instant::now();
        if !(config.threshold.is_finite() && config.threshold >= 0.0) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Threshold must be finite and non-negative, got {}.",
                config.threshold
            )));
        }
        if !(regularization_factor.is_finite() && regularization_factor >= 0.0) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Regularization factor must be finite and non-negative, got {}.",
                regularization_factor
            )));
        }
        if config.basis_size == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Basis size must be positive.".into()));
        }

        // --- Dimensions and bounding boxes ---
        let dimension = domain.dimension();
        let distribution = experiment.distribution();
        if distribution.dimension() != dimension {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Domain dimension {} does not match experiment distribution dimension {}.",
                dimension,
                distribution.dimension()
            )));
        }
        if basis.input_dimension() != dimension {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Domain dimension {} does not match basis input dimension {}.",
                dimension,
                basis.input_dimension()
            )));
        }
        let domain_box = Interval::bounding_box(domain)?;
        if let Some(axis) = domain_box.first_empty_axis() {
            return Err(KarhunenLoeveError::DegenerateDomain {
                axis,
                lower: domain_box.lower()[axis],
                upper: domain_box.upper()[axis],
            });
        }
        if domain_box.volume().is_infinite() {
            return Err(KarhunenLoeveError::InvalidArgument("Integration domain must be bounded.".into()));
        }

        // --- Rescaling from the distribution range onto the domain box ---
        let distribution_range = distribution.range();
        let scaling = if distribution_range.approx_eq(&domain_box, SAME_BOUNDS_TOLERANCE) {
            None
        } else {
            Some(AffineScaling::between(&distribution_range, &domain_box)?)
        };
        let normalization_factor = scaling.as_ref().map_or(1.0, |map| map.normalization_factor());
        debug!(
            "Quadrature rescaling active: {}, normalization factor {}.",
            scaling.is_some(),
            normalization_factor
        );

        // --- Basis functions ---
        let inverse_scaling = match (&scaling, config.must_scale) {
            (Some(map), true) => Some(map.inverse()),
            _ => None,
        };
        let mut functions: Vec<ScalarFunction> = Vec::with_capacity(config.basis_size);
        for index in 0..config.basis_size {
            let function = basis.build(index)?;
            let function: ScalarFunction = match &inverse_scaling {
                Some(inverse) => {
                    let inverse = inverse.clone();
                    Arc::new(move |point: ArrayView1<f64>| function(inverse.apply(point).view()))
                }
                None => function,
            };
            functions.push(function);
        }

        // --- Integration nodes and weights ---
        let (raw_nodes, raw_weights) = experiment.generate_with_weights()?;
        let generated_node_count = raw_nodes.nrows();
        if raw_nodes.ncols() != dimension || raw_weights.len() != generated_node_count {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Experiment produced nodes of shape {:?} and {} weights, expected {} columns and one weight per node.",
                raw_nodes.dim(),
                raw_weights.len(),
                dimension
            )));
        }
        let mut kept_nodes: Vec<Array1<f64>> = Vec::with_capacity(generated_node_count);
        let mut kept_weights: Vec<f64> = Vec::with_capacity(generated_node_count);
        for (raw_node, &raw_weight) in raw_nodes.rows().into_iter().zip(raw_weights.iter()) {
            let density = distribution.pdf(raw_node);
            let node = match &scaling {
                Some(map) => map.apply(raw_node),
                None => raw_node.to_owned(),
            };
            if !domain.contains(node.view()) {
                continue;
            }
            if !(density > 0.0) {
                trace!("Skipping node {:?} with non-positive density {}.", node, density);
                continue;
            }
            kept_weights.push((normalization_factor * raw_weight / density).sqrt());
            kept_nodes.push(node);
        }
        if kept_nodes.is_empty() {
            return Err(KarhunenLoeveError::NoIntegrationNodes { generated: generated_node_count });
        }
        let node_count = kept_nodes.len();
        let mut nodes = Array2::<f64>::zeros((node_count, dimension));
        for (mut row, node) in nodes.rows_mut().into_iter().zip(kept_nodes.iter()) {
            row.assign(node);
        }
        let weights = Array1::from_vec(kept_weights);
        debug!("Kept {} of {} integration nodes inside the domain.", node_count, generated_node_count);

        // --- Design matrix and Cholesky factor of its Gram matrix ---
        let mut design_matrix = Array2::<f64>::zeros((node_count, config.basis_size));
        Zip::indexed(&mut design_matrix).par_for_each(|(i, j), entry| {
            *entry = weights[i] * functions[j](nodes.row(i));
        });
        let mut gram = design_matrix.t().dot(&design_matrix);
        if regularization_factor > 0.0 {
            gram.diag_mut().mapv_inplace(|v| v + regularization_factor);
        }
        let backend = LinAlgBackendProvider::<f64>::new();
        let cholesky_factor = backend.cholesky_lower(&gram).map_err(|e| {
            KarhunenLoeveError::SingularGram(format!(
                "Θᵗ·Θ of size {} built from {} nodes is not positive definite; use a richer quadrature, a smaller basis or a regularization factor ({})",
                config.basis_size, node_count, e
            ))
        })?;

        info!(
            "Built quadrature factory: dimension {}, basis size {}, {} of {} nodes kept, threshold={}, regularization={} in {:?}",
            dimension,
            config.basis_size,
            node_count,
            generated_node_count,
            config.threshold,
            regularization_factor,
            start_time.elapsed()
        );
        Ok(Self {
            dimension,
            config,
            regularization_factor,
            functions: Arc::new(functions),
            scaling,
            normalization_factor,
            generated_node_count,
            nodes,
            weights,
            design_matrix,
            cholesky_factor,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &QuadratureConfig {
        &self.config
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn regularization_factor(&self) -> f64 {
        self.regularization_factor
    }

    /// Integration nodes kept inside the domain, in domain coordinates.
    pub fn nodes(&self) -> &Array2<f64> {
        &self.nodes
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn design_matrix(&self) -> &Array2<f64> {
        &self.design_matrix
    }

    pub fn cholesky_factor(&self) -> &Array2<f64> {
        &self.cholesky_factor
    }

    /// Number of nodes produced by the experiment before filtering.
    pub fn generated_node_count(&self) -> usize {
        self.generated_node_count
    }

    pub fn normalization_factor(&self) -> f64 {
        self.normalization_factor
    }

    pub fn is_scaled(&self) -> bool {
        self.scaling.is_some()
    }

    /// Basis functions, composed with the inverse rescaling when requested.
    pub fn functions(&self) -> &Arc<Vec<ScalarFunction>> {
        &self.functions
    }

    /// Retained eigenfunctions as combinations of the basis functions, with their eigenvalues.
    pub fn build(&self, covariance_model: &dyn CovarianceModel) -> Result<KarhunenLoeveResult> {
        if covariance_model.input_dimension() != self.dimension {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Covariance model input dimension {} does not match domain dimension {}.",
                covariance_model.input_dimension(),
                self.dimension
            )));
        }
        let node_count = self.nodes.nrows();
        let basis_size = self.config.basis_size;
        let d = covariance_model.output_dimension();
        info!(
            "Starting quadrature Karhunen-Loeve decomposition: {} nodes, basis size {}, output dimension {}",
            node_count, basis_size, d
        );
        let overall_start_time = Instant::now();

        // --- Weighted covariance W·C·W ---
        let mut covariance = covariance_model.discretize(self.nodes.view())?;
        if covariance.dim() != (node_count * d, node_count * d) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Discretized covariance has shape {:?}, expected ({}, {}).",
                covariance.dim(),
                node_count * d,
                node_count * d
            )));
        }
        let augmented_weights = Array1::from_shape_fn(node_count * d, |p| self.weights[p / d]);
        Zip::indexed(&mut covariance).for_each(|(p, q), entry| {
            *entry *= augmented_weights[p] * augmented_weights[q];
        });

        // --- Reduced generalized eigenproblem Θᵗ·C·Θ v = λ L·Lᵗ v ---
        let design_matrix = replicate_over_components(&self.design_matrix, d);
        let cholesky_factor = replicate_over_components(&self.cholesky_factor, d);
        let reduced = design_matrix.t().dot(&covariance.dot(&design_matrix));
        debug!("Formed reduced matrix Θᵗ·C·Θ of shape {:?}.", reduced.dim());

        let backend = LinAlgBackendProvider::<f64>::new();
        let half_solved = backend.solve_lower(&cholesky_factor, &reduced)?;
        let standard = backend.solve_lower(&cholesky_factor, &half_solved.t().to_owned())?;
        let standard = (&standard + &standard.t()) * 0.5;
        let eigh = backend.eigh_upper(&standard)?;
        let generalized_eigenvectors = backend.solve_lower_transpose(&cholesky_factor, &eigh.eigenvectors)?;

        let sorted = sort_decreasing(&eigh.eigenvalues, &generalized_eigenvectors);
        let retained = retained_count(&sorted.eigenvalues, self.config.threshold, self.config.max_modes);
        let positive_total: f64 = sorted.eigenvalues.iter().filter(|&&v| v > 0.0).sum();
        let retained_total: f64 = sorted.eigenvalues.iter().take(retained).sum();
        let selection_ratio = if positive_total > 0.0 { retained_total / positive_total } else { 0.0 };

        // --- Normalization ‖Θ·a‖ = 1, first coefficient non-negative ---
        let eigenvalues = sorted.eigenvalues.slice(s![..retained]).to_owned();
        let mut modes = Vec::with_capacity(retained);
        let mut projection = Array2::<f64>::zeros((retained, node_count * d));
        for j in 0..retained {
            let mut a = sorted.eigenvectors.column(j).to_owned();
            let image = design_matrix.dot(&a);
            let norm = norm2(&image);
            if !(norm.is_finite() && norm > 0.0) {
                return Err(KarhunenLoeveError::SingularGram(format!(
                    "eigenvector {} has a vanishing design matrix image (‖Θa‖ = {})",
                    j, norm
                )));
            }
            let factor = if a[0] < 0.0 { -1.0 / norm } else { 1.0 / norm };
            a *= factor;
            trace!("Mode {}: eigenvalue {:.6e}, design norm {:.6e}.", j, eigenvalues[j], norm);

            // ξ_j = (Θa)ᵗ·W·f / √λ_j
            let scaled_image = &image * factor;
            let inverse_root = 1.0 / eigenvalues[j].sqrt();
            projection
                .row_mut(j)
                .assign(&(&scaled_image * &augmented_weights * inverse_root));

            let coefficients = Array2::from_shape_fn((basis_size, d), |(i, k)| a[i * d + k]);
            modes.push(KarhunenLoeveFunction::BasisCombination {
                functions: Arc::clone(&self.functions),
                input_dimension: self.dimension,
                coefficients,
            });
        }
        if retained == 0 {
            warn!("Quadrature decomposition retained no mode (leading eigenvalue {:?}).", sorted.eigenvalues.first());
        }
        info!(
            "Finished quadrature Karhunen-Loeve decomposition: retained {} of {} modes in {:?}",
            retained,
            sorted.eigenvalues.len(),
            overall_start_time.elapsed()
        );
        let zero_function = KarhunenLoeveFunction::BasisCombination {
            functions: Arc::clone(&self.functions),
            input_dimension: self.dimension,
            coefficients: Array2::zeros((basis_size, d)),
        };
        Ok(KarhunenLoeveResult {
            eigenvalues,
            modes,
            zero_function,
            fields: None,
            projection,
            threshold: self.config.threshold,
            selection_ratio,
        })
    }
}
