// src/p1.rs

use crate::covariance::CovarianceModel;
use crate::eigenpairs::{real_parts, retained_count, sort_decreasing};
use crate::error::{KarhunenLoeveError, Result};
use crate::linalg_backends::{BackendEig, LinAlgBackendProvider};
use crate::mesh::Mesh;
use crate::result::{Field, KarhunenLoeveFunction, KarhunenLoeveResult};
use crate::settings;
use log::{debug, info, trace, warn};
use ndarray::{Array1, Array2};
use std::sync::Arc;
use std::time::Instant;

/// Karhunen-Loeve decomposition over the P1 finite element space of a mesh.
///
/// The Fredholm problem `∫ C(s, t) φ(s) ds = λ φ(t)` is discretized by
/// interpolating the covariance at the mesh vertices, which turns it into the
/// eigenproblem of `C · G`, `C` being the covariance matrix at the vertices and
/// `G` the Gram matrix of the P1 shape functions replicated over the output
/// components. Eigenvectors are normalized to `aᵗ G a = 1` and oriented so that
/// their first component is non-negative.
#[derive(Debug, Clone)]
pub struct P1Factory {
    mesh: Arc<Mesh>,
    threshold: f64,
    max_modes: Option<usize>,
    regularization_factor: f64,
    imaginary_part_tolerance: f64,
    /// Scalar P1 Gram matrix, regularized. Shape: `(vertex_count, vertex_count)`
    gram: Array2<f64>,
}

// Everything computed by one decomposition, shared by `build` and `build_as_process_sample`.
struct P1Decomposition {
    eigenvalues: Array1<f64>,
    /// Normalized, sign-fixed eigenvectors as columns. Shape: `(N·d, K)`
    coefficients: Array2<f64>,
    augmented_gram: Array2<f64>,
    output_dimension: usize,
    selection_ratio: f64,
}

impl P1Factory {
    /// Creates a factory whose Gram matrix is regularized by the
    /// `P1Factory-RegularizationFactor` setting.
    pub fn new(mesh: Mesh, threshold: f64) -> Result<Self> {
        Self::with_regularization(mesh, threshold, settings::get_scalar(settings::P1_REGULARIZATION_FACTOR))
    }

    /// Creates a factory adding `regularization_factor` to the diagonal of the Gram matrix.
    ///
    /// The `KarhunenLoeve-ImaginaryPartTolerance` setting is read here and kept for every build.
    pub fn with_regularization(mesh: Mesh, threshold: f64, regularization_factor: f64) -> Result<Self> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Threshold must be finite and non-negative, got {}.",
                threshold
            )));
        }
        if !(regularization_factor.is_finite() && regularization_factor >= 0.0) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Regularization factor must be finite and non-negative, got {}.",
                regularization_factor
            )));
        }
        let imaginary_part_tolerance = settings::get_scalar(settings::IMAGINARY_PART_TOLERANCE);
        let start_time = Instant::now();
        let mut gram = mesh.compute_p1_gram()?;
        if regularization_factor > 0.0 {
            gram.diag_mut().mapv_inplace(|v| v + regularization_factor);
        }
        info!(
            "Built P1 factory: {} vertices, {} simplices, threshold={}, regularization={} in {:?}",
            mesh.vertex_count(),
            mesh.simplex_count(),
            threshold,
            regularization_factor,
            start_time.elapsed()
        );
        Ok(Self {
            mesh: Arc::new(mesh),
            threshold,
            max_modes: None,
            regularization_factor,
            imaginary_part_tolerance,
            gram,
        })
    }

    /// Keeps at most `max_modes` modes in addition to the threshold rule.
    pub fn with_max_modes(mut self, max_modes: usize) -> Self {
        self.max_modes = Some(max_modes);
        self
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn gram(&self) -> &Array2<f64> {
        &self.gram
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_modes(&self) -> Option<usize> {
        self.max_modes
    }

    pub fn regularization_factor(&self) -> f64 {
        self.regularization_factor
    }

    /// Relative imaginary part above which eigenvalues of `C·G` are reported.
    pub fn imaginary_part_tolerance(&self) -> f64 {
        self.imaginary_part_tolerance
    }

    /// Gram matrix of the P1 shape functions over `output_dimension` components:
    /// `G[i·d + k][j·d + k] = gram[i][j]`, zero across different components.
    pub fn augmented_gram(&self, output_dimension: usize) -> Array2<f64> {
        let vertex_count = self.gram.nrows();
        let d = output_dimension;
        let mut augmented = Array2::<f64>::zeros((vertex_count * d, vertex_count * d));
        for i in 0..vertex_count {
            for j in 0..=i {
                let value = self.gram[[i, j]];
                for k in 0..d {
                    augmented[[i * d + k, j * d + k]] = value;
                    augmented[[j * d + k, i * d + k]] = value;
                }
            }
        }
        augmented
    }

    fn decompose(&self, covariance_model: &dyn CovarianceModel) -> Result<P1Decomposition> {
        if covariance_model.input_dimension() != self.mesh.dimension() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Covariance model input dimension {} does not match mesh dimension {}.",
                covariance_model.input_dimension(),
                self.mesh.dimension()
            )));
        }
        let vertex_count = self.mesh.vertex_count();
        let d = covariance_model.output_dimension();
        let augmented_dimension = vertex_count * d;
        info!(
            "Starting P1 Karhunen-Loeve decomposition: {} vertices, output dimension {}, augmented dimension {}",
            vertex_count, d, augmented_dimension
        );
        let overall_start_time = Instant::now();

        let augmented_gram = self.augmented_gram(d);
        let covariance = covariance_model.discretize(self.mesh.vertices())?;
        if covariance.dim() != (augmented_dimension, augmented_dimension) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Discretized covariance has shape {:?}, expected ({}, {}).",
                covariance.dim(),
                augmented_dimension,
                augmented_dimension
            )));
        }
        // C·G is not symmetric; a general eigensolver is required.
        let operator = covariance.dot(&augmented_gram);
        debug!("Formed C·G operator of shape {:?}.", operator.dim());

        let backend = LinAlgBackendProvider::<f64>::new();
        let (raw_eigenvalues, raw_eigenvectors) =
            real_parts(backend.eig_general(&operator)?, self.imaginary_part_tolerance);
        let sorted = sort_decreasing(&raw_eigenvalues, &raw_eigenvectors);
        let retained = retained_count(&sorted.eigenvalues, self.threshold, self.max_modes);

        let positive_total: f64 = sorted.eigenvalues.iter().filter(|&&v| v > 0.0).sum();
        let retained_total: f64 = sorted.eigenvalues.iter().take(retained).sum();
        let selection_ratio = if positive_total > 0.0 { retained_total / positive_total } else { 0.0 };

        let mut coefficients = Array2::<f64>::zeros((augmented_dimension, retained));
        for j in 0..retained {
            let a = sorted.eigenvectors.column(j);
            let energy = a.dot(&augmented_gram.dot(&a));
            if !(energy.is_finite() && energy > 0.0) {
                return Err(KarhunenLoeveError::SingularGram(format!(
                    "eigenvector {} has non-positive energy aᵗGa = {}",
                    j, energy
                )));
            }
            let norm = energy.sqrt();
            let factor = if a[0] < 0.0 { -1.0 / norm } else { 1.0 / norm };
            trace!("Mode {}: eigenvalue {:.6e}, Gram norm {:.6e}.", j, sorted.eigenvalues[j], norm);
            coefficients.column_mut(j).assign(&a.mapv(|v| v * factor));
        }
        if retained == 0 {
            warn!("P1 decomposition retained no mode (leading eigenvalue {:?}).", sorted.eigenvalues.first());
        }
        info!(
            "Finished P1 Karhunen-Loeve decomposition: retained {} of {} modes in {:?}",
            retained,
            sorted.eigenvalues.len(),
            overall_start_time.elapsed()
        );
        Ok(P1Decomposition {
            eigenvalues: sorted.eigenvalues.slice(ndarray::s![..retained]).to_owned(),
            coefficients,
            augmented_gram,
            output_dimension: d,
            selection_ratio,
        })
    }

    fn fields_of(&self, decomposition: &P1Decomposition) -> Result<Vec<Field>> {
        let vertex_count = self.mesh.vertex_count();
        let d = decomposition.output_dimension;
        decomposition
            .coefficients
            .columns()
            .into_iter()
            .map(|a| {
                let values = Array2::from_shape_fn((vertex_count, d), |(i, k)| a[i * d + k]);
                Field::new(Arc::clone(&self.mesh), values)
            })
            .collect()
    }

    /// Retained eigenfunctions as vertex fields, with their eigenvalues in decreasing order.
    pub fn build_as_process_sample(&self, covariance_model: &dyn CovarianceModel) -> Result<(Vec<Field>, Array1<f64>)> {
        let decomposition = self.decompose(covariance_model)?;
        let fields = self.fields_of(&decomposition)?;
        Ok((fields, decomposition.eigenvalues))
    }

    /// Retained eigenfunctions as P1 interpolating functions, with their eigenvalues.
    pub fn build(&self, covariance_model: &dyn CovarianceModel) -> Result<KarhunenLoeveResult> {
        let decomposition = self.decompose(covariance_model)?;
        let fields = self.fields_of(&decomposition)?;
        let zero_function = KarhunenLoeveFunction::P1Interpolation {
            mesh: Arc::clone(&self.mesh),
            values: Array2::zeros((self.mesh.vertex_count(), decomposition.output_dimension)),
        };
        let modes = fields
            .iter()
            .map(|field| KarhunenLoeveFunction::P1Interpolation {
                mesh: Arc::clone(field.mesh()),
                values: field.values().clone(),
            })
            .collect();
        // ξ_k = a_kᵗ G f / √λ_k
        let mut projection = decomposition.coefficients.t().dot(&decomposition.augmented_gram);
        for (mut row, &lambda) in projection.rows_mut().into_iter().zip(decomposition.eigenvalues.iter()) {
            row /= lambda.sqrt();
        }
        Ok(KarhunenLoeveResult {
            eigenvalues: decomposition.eigenvalues,
            modes,
            zero_function,
            fields: Some(fields),
            projection,
            threshold: self.threshold,
            selection_ratio: decomposition.selection_ratio,
        })
    }
}
