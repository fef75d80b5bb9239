// src/result.rs

use crate::basis::ScalarFunction;
use crate::error::{KarhunenLoeveError, Result};
use crate::mesh::Mesh;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::fmt;
use std::sync::Arc;

/// Values of a vector-valued field at the vertices of a mesh.
#[derive(Debug, Clone)]
pub struct Field {
    mesh: Arc<Mesh>,
    /// Shape: `(vertex_count, output_dimension)`
    values: Array2<f64>,
}

impl Field {
    pub fn new(mesh: Arc<Mesh>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != mesh.vertex_count() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Field has {} values but the mesh has {} vertices.",
                values.nrows(),
                mesh.vertex_count()
            )));
        }
        Ok(Self { mesh, values })
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn output_dimension(&self) -> usize {
        self.values.ncols()
    }
}

/// A mode of a Karhunen-Loeve decomposition, or any linear combination of modes.
#[derive(Clone)]
pub enum KarhunenLoeveFunction {
    /// P1 interpolation of vertex values.
    P1Interpolation {
        mesh: Arc<Mesh>,
        /// Shape: `(vertex_count, output_dimension)`
        values: Array2<f64>,
    },
    /// `x -> Σ_j coefficients[j, ·] · functions[j](x)`.
    BasisCombination {
        functions: Arc<Vec<ScalarFunction>>,
        /// Dimension of the points the functions accept.
        input_dimension: usize,
        /// Shape: `(basis_size, output_dimension)`
        coefficients: Array2<f64>,
    },
}

impl fmt::Debug for KarhunenLoeveFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KarhunenLoeveFunction::P1Interpolation { mesh, values } => f
                .debug_struct("P1Interpolation")
                .field("vertex_count", &mesh.vertex_count())
                .field("values", values)
                .finish(),
            KarhunenLoeveFunction::BasisCombination { functions, input_dimension, coefficients } => f
                .debug_struct("BasisCombination")
                .field("basis_size", &functions.len())
                .field("input_dimension", input_dimension)
                .field("coefficients", coefficients)
                .finish(),
        }
    }
}

impl KarhunenLoeveFunction {
    pub fn input_dimension(&self) -> usize {
        match self {
            KarhunenLoeveFunction::P1Interpolation { mesh, .. } => mesh.dimension(),
            KarhunenLoeveFunction::BasisCombination { input_dimension, .. } => *input_dimension,
        }
    }

    pub fn output_dimension(&self) -> usize {
        self.coefficients().ncols()
    }

    /// The zero function over the same mesh or basis as `self`.
    pub fn zeroed(&self) -> Self {
        match self {
            KarhunenLoeveFunction::P1Interpolation { mesh, values } => {
                KarhunenLoeveFunction::P1Interpolation { mesh: Arc::clone(mesh), values: Array2::zeros(values.raw_dim()) }
            }
            KarhunenLoeveFunction::BasisCombination { functions, input_dimension, coefficients } => {
                KarhunenLoeveFunction::BasisCombination {
                    functions: Arc::clone(functions),
                    input_dimension: *input_dimension,
                    coefficients: Array2::zeros(coefficients.raw_dim()),
                }
            }
        }
    }

    /// Vertex values (P1) or basis coefficients (basis combination).
    pub fn coefficients(&self) -> &Array2<f64> {
        match self {
            KarhunenLoeveFunction::P1Interpolation { values, .. } => values,
            KarhunenLoeveFunction::BasisCombination { coefficients, .. } => coefficients,
        }
    }

    pub fn evaluate(&self, point: ArrayView1<f64>) -> Result<Array1<f64>> {
        match self {
            KarhunenLoeveFunction::P1Interpolation { mesh, values } => mesh.interpolate(values.view(), point),
            KarhunenLoeveFunction::BasisCombination { functions, input_dimension, coefficients } => {
                if point.len() != *input_dimension {
                    return Err(KarhunenLoeveError::InvalidArgument(format!(
                        "Point has dimension {} but the function expects dimension {}.",
                        point.len(),
                        input_dimension
                    )));
                }
                let mut value = Array1::<f64>::zeros(coefficients.ncols());
                for (function, row) in functions.iter().zip(coefficients.rows()) {
                    value.scaled_add(function(point), &row);
                }
                Ok(value)
            }
        }
    }

    /// Values at each row of `points`, shape `(points.nrows(), output_dimension)`.
    pub fn evaluate_many(&self, points: ArrayView2<f64>) -> Result<Array2<f64>> {
        let mut output = Array2::<f64>::zeros((points.nrows(), self.output_dimension()));
        for (point, mut row) in points.rows().into_iter().zip(output.rows_mut()) {
            row.assign(&self.evaluate(point)?);
        }
        Ok(output)
    }

    /// `Σ_k weights[k] · functions[k]`. All functions must share the same mesh or
    /// the same basis.
    pub fn linear_combination(functions: &[KarhunenLoeveFunction], weights: ArrayView1<f64>) -> Result<Self> {
        if functions.len() != weights.len() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Got {} functions but {} weights.",
                functions.len(),
                weights.len()
            )));
        }
        let first = functions
            .first()
            .ok_or_else(|| KarhunenLoeveError::InvalidArgument("Cannot combine an empty set of functions.".into()))?;
        let mut combined = Array2::<f64>::zeros(first.coefficients().raw_dim());
        for (function, &weight) in functions.iter().zip(weights.iter()) {
            let compatible = match (first, function) {
                (
                    KarhunenLoeveFunction::P1Interpolation { mesh: a, .. },
                    KarhunenLoeveFunction::P1Interpolation { mesh: b, .. },
                ) => Arc::ptr_eq(a, b) || a == b,
                (
                    KarhunenLoeveFunction::BasisCombination { functions: a, .. },
                    KarhunenLoeveFunction::BasisCombination { functions: b, .. },
                ) => Arc::ptr_eq(a, b),
                _ => false,
            };
            if !compatible || function.coefficients().raw_dim() != combined.raw_dim() {
                return Err(KarhunenLoeveError::InvalidArgument(
                    "Functions must share the same mesh or basis to be combined.".into(),
                ));
            }
            combined.scaled_add(weight, function.coefficients());
        }
        Ok(match first {
            KarhunenLoeveFunction::P1Interpolation { mesh, .. } => {
                KarhunenLoeveFunction::P1Interpolation { mesh: Arc::clone(mesh), values: combined }
            }
            KarhunenLoeveFunction::BasisCombination { functions, input_dimension, .. } => {
                KarhunenLoeveFunction::BasisCombination {
                    functions: Arc::clone(functions),
                    input_dimension: *input_dimension,
                    coefficients: combined,
                }
            }
        })
    }
}

/// Truncated Karhunen-Loeve decomposition: eigenvalues in decreasing order and the matching modes.
#[derive(Debug, Clone)]
pub struct KarhunenLoeveResult {
    pub(crate) eigenvalues: Array1<f64>,
    pub(crate) modes: Vec<KarhunenLoeveFunction>,
    /// Zero function of the discretization, returned by `lift` when no mode is retained.
    pub(crate) zero_function: KarhunenLoeveFunction,
    pub(crate) fields: Option<Vec<Field>>,
    /// Shape: `(mode_count, point_count * output_dimension)`
    pub(crate) projection: Array2<f64>,
    pub(crate) threshold: f64,
    pub(crate) selection_ratio: f64,
}

impl KarhunenLoeveResult {
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn modes(&self) -> &[KarhunenLoeveFunction] {
        &self.modes
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Share of the total positive spectrum carried by the retained eigenvalues.
    pub fn selection_ratio(&self) -> f64 {
        self.selection_ratio
    }

    /// The modes as fields over the mesh; only available for P1 decompositions.
    pub fn modes_as_process_sample(&self) -> Option<&[Field]> {
        self.fields.as_deref()
    }

    pub fn projection_matrix(&self) -> &Array2<f64> {
        &self.projection
    }

    /// KL coordinates `ξ_k = <f, φ_k> / √λ_k` of a function sampled at the
    /// discretization points (mesh vertices or kept quadrature nodes), one point per row.
    pub fn project(&self, values: ArrayView2<f64>) -> Result<Array1<f64>> {
        if values.len() != self.projection.ncols() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Projection expects {} values, got {:?}.",
                self.projection.ncols(),
                values.dim()
            )));
        }
        let flattened = Array1::from_iter(values.iter().copied());
        Ok(self.projection.dot(&flattened))
    }

    /// `Σ_k √λ_k ξ_k φ_k`.
    pub fn lift(&self, coordinates: ArrayView1<f64>) -> Result<KarhunenLoeveFunction> {
        if coordinates.len() != self.modes.len() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Lift expects {} coordinates, got {}.",
                self.modes.len(),
                coordinates.len()
            )));
        }
        if self.modes.is_empty() {
            return Ok(self.zero_function.clone());
        }
        let weights = &coordinates * &self.eigenvalues.mapv(f64::sqrt);
        KarhunenLoeveFunction::linear_combination(&self.modes, weights.view())
    }
}
