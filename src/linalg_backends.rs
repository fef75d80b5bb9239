// src/linalg_backends.rs

/// A provider struct that dispatches to the selected linear algebra backend
/// based on compile-time feature flags.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

// --- Common imports needed by multiple sections ---
use ndarray::{Array1, Array2};
use std::marker::PhantomData;
use crate::error::ThreadSafeStdError;

// --- Trait Definitions ---

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues, sorted in ascending order.
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvector_matrix.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Output of a general (non-symmetric) eigendecomposition of a real matrix.
///
/// Complex eigenpairs are split into real and imaginary parts. Only the real
/// part of the eigenvectors is kept; no ordering is guaranteed.
#[derive(Debug)]
pub struct EigOutput<F: 'static> {
    pub eigenvalues_re: Array1<F>,
    pub eigenvalues_im: Array1<F>,
    /// Real parts of the right eigenvectors, one per column.
    pub eigenvectors_re: Array2<F>,
}

/// Trait for symmetric eigendecomposition (similar to LAPACK's DSYEVR or DSYEVD).
/// Implementers will typically expect `matrix` to be symmetric.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>, ThreadSafeStdError>;
}

/// Trait for the eigendecomposition of a general square real matrix (similar to LAPACK's DGEEV).
pub trait BackendEig<F: 'static + Copy + Send + Sync> {
    fn eig_general(&self, matrix: &Array2<F>) -> Result<EigOutput<F>, ThreadSafeStdError>;
}

/// Trait for the Cholesky factorization of a symmetric positive definite matrix.
pub trait BackendCholesky<F: 'static + Copy + Send + Sync> {
    /// Returns `L`, lower triangular with an exactly zero strict upper part, such that `L·Lᵗ = matrix`.
    fn cholesky_lower(&self, matrix: &Array2<F>) -> Result<Array2<F>, ThreadSafeStdError>;
}

/// Trait for solves against a lower triangular factor.
pub trait BackendTriangularSolve<F: 'static + Copy + Send + Sync> {
    /// Solves `L·X = rhs`.
    fn solve_lower(&self, lower: &Array2<F>, rhs: &Array2<F>) -> Result<Array2<F>, ThreadSafeStdError>;
    /// Solves `Lᵗ·X = rhs`.
    fn solve_lower_transpose(&self, lower: &Array2<F>, rhs: &Array2<F>) -> Result<Array2<F>, ThreadSafeStdError>;
}

// --- NdarrayLinAlgBackend Implementation ---
use ndarray_linalg::{Cholesky as NdLinalgCholesky, Diag, Eig as NdLinalgEig, Eigh as NdLinalgEigh, SolveTriangular, UPLO};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

// Helper to convert ndarray-linalg's error to ThreadSafeStdError
fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

fn check_square(matrix_dims: (usize, usize), operation: &str) -> Result<(), ThreadSafeStdError> {
    if matrix_dims.0 != matrix_dims.1 {
        return Err(format!(
            "Matrix must be square for {} (got {}x{}).",
            operation, matrix_dims.0, matrix_dims.1
        )
        .into());
    }
    Ok(())
}

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        check_square(matrix.dim(), "symmetric eigendecomposition")?;
        if matrix.is_empty() {
            return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendEig<f64> for NdarrayLinAlgBackend {
    fn eig_general(&self, matrix: &Array2<f64>) -> Result<EigOutput<f64>, ThreadSafeStdError> {
        check_square(matrix.dim(), "general eigendecomposition")?;
        if matrix.is_empty() {
            return Ok(EigOutput {
                eigenvalues_re: Array1::zeros(0),
                eigenvalues_im: Array1::zeros(0),
                eigenvectors_re: Array2::zeros((0, 0)),
            });
        }
        let (eigenvalues, eigenvectors) = matrix.eig().map_err(to_dyn_error)?;
        Ok(EigOutput {
            eigenvalues_re: eigenvalues.mapv(|z| z.re),
            eigenvalues_im: eigenvalues.mapv(|z| z.im),
            eigenvectors_re: eigenvectors.mapv(|z| z.re),
        })
    }
}

impl BackendCholesky<f64> for NdarrayLinAlgBackend {
    fn cholesky_lower(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        check_square(matrix.dim(), "Cholesky factorization")?;
        if matrix.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }
        let mut lower = matrix.cholesky(UPLO::Lower).map_err(to_dyn_error)?;
        let n = lower.nrows();
        for i in 0..n {
            for j in (i + 1)..n {
                lower[[i, j]] = 0.0;
            }
        }
        Ok(lower)
    }
}

impl BackendTriangularSolve<f64> for NdarrayLinAlgBackend {
    fn solve_lower(&self, lower: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        check_square(lower.dim(), "triangular solve")?;
        if lower.nrows() != rhs.nrows() {
            return Err(format!("Triangular solve: factor has {} rows but right-hand side has {}.", lower.nrows(), rhs.nrows()).into());
        }
        if rhs.is_empty() {
            return Ok(rhs.clone());
        }
        lower.solve_triangular(UPLO::Lower, Diag::NonUnit, rhs).map_err(to_dyn_error)
    }

    fn solve_lower_transpose(&self, lower: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        check_square(lower.dim(), "triangular solve")?;
        if lower.nrows() != rhs.nrows() {
            return Err(format!("Triangular solve: factor has {} rows but right-hand side has {}.", lower.nrows(), rhs.nrows()).into());
        }
        if rhs.is_empty() {
            return Ok(rhs.clone());
        }
        let upper = lower.t().to_owned();
        upper.solve_triangular(UPLO::Upper, Diag::NonUnit, rhs).map_err(to_dyn_error)
    }
}


// --- FaerLinAlgBackend Implementation ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code { // Encapsulate faer-specific code and its imports
    use super::{BackendCholesky, BackendEig, BackendEigh, BackendTriangularSolve, EigOutput, EighOutput};
    use crate::error::ThreadSafeStdError;
    use ndarray::{Array1, Array2};
    use faer::{Mat, MatRef, Par, Side};
    use faer::linalg::triangular_solve::{solve_lower_triangular_in_place, solve_upper_triangular_in_place};

    fn to_dyn_error_faer(msg: String) -> ThreadSafeStdError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn ndarray_to_faer_mat(matrix: &Array2<f64>) -> Mat<f64> {
        Mat::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[[i, j]])
    }

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Array2<f64> {
        Array2::from_shape_fn((faer_mat.nrows(), faer_mat.ncols()), |(i, j)| faer_mat[(i, j)])
    }

    fn check_square(matrix: &Array2<f64>, operation: &str) -> Result<(), ThreadSafeStdError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(to_dyn_error_faer(format!("Matrix must be square for {}.", operation)));
        }
        Ok(())
    }

    impl BackendEigh<f64> for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
            check_square(matrix, "symmetric eigendecomposition")?;
            if matrix.is_empty() {
                return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
            }
            let faer_mat = ndarray_to_faer_mat(matrix);
            let eig = faer_mat
                .self_adjoint_eigen(Side::Upper)
                .map_err(|e| to_dyn_error_faer(format!("Faer symmetric eigendecomposition failed: {:?}", e)))?;
            let values = eig.S().column_vector();
            Ok(EighOutput {
                eigenvalues: Array1::from_shape_fn(values.nrows(), |i| values[i]),
                eigenvectors: faer_mat_to_ndarray(eig.U()),
            })
        }
    }

    impl BackendEig<f64> for FaerLinAlgBackend {
        fn eig_general(&self, matrix: &Array2<f64>) -> Result<EigOutput<f64>, ThreadSafeStdError> {
            check_square(matrix, "general eigendecomposition")?;
            let n = matrix.nrows();
            if n == 0 {
                return Ok(EigOutput {
                    eigenvalues_re: Array1::zeros(0),
                    eigenvalues_im: Array1::zeros(0),
                    eigenvectors_re: Array2::zeros((0, 0)),
                });
            }
            let faer_mat = ndarray_to_faer_mat(matrix);
            let eig = faer_mat
                .eigen()
                .map_err(|e| to_dyn_error_faer(format!("Faer eigendecomposition failed: {:?}", e)))?;
            let values = eig.S().column_vector();
            let vectors = eig.U();
            Ok(EigOutput {
                eigenvalues_re: Array1::from_shape_fn(n, |i| values[i].re),
                eigenvalues_im: Array1::from_shape_fn(n, |i| values[i].im),
                eigenvectors_re: Array2::from_shape_fn((n, n), |(i, j)| vectors[(i, j)].re),
            })
        }
    }

    impl BackendCholesky<f64> for FaerLinAlgBackend {
        fn cholesky_lower(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
            check_square(matrix, "Cholesky factorization")?;
            if matrix.is_empty() {
                return Ok(Array2::zeros((0, 0)));
            }
            let faer_mat = ndarray_to_faer_mat(matrix);
            let llt = faer_mat
                .llt(Side::Lower)
                .map_err(|e| to_dyn_error_faer(format!("Faer Cholesky factorization failed: {:?}", e)))?;
            let mut lower = faer_mat_to_ndarray(llt.L());
            let n = lower.nrows();
            for i in 0..n {
                for j in (i + 1)..n {
                    lower[[i, j]] = 0.0;
                }
            }
            Ok(lower)
        }
    }

    impl BackendTriangularSolve<f64> for FaerLinAlgBackend {
        fn solve_lower(&self, lower: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
            check_square(lower, "triangular solve")?;
            if rhs.is_empty() {
                return Ok(rhs.clone());
            }
            let factor = ndarray_to_faer_mat(lower);
            let mut solution = ndarray_to_faer_mat(rhs);
            solve_lower_triangular_in_place(factor.as_ref(), solution.as_mut(), Par::Seq);
            Ok(faer_mat_to_ndarray(solution.as_ref()))
        }

        fn solve_lower_transpose(&self, lower: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
            check_square(lower, "triangular solve")?;
            if rhs.is_empty() {
                return Ok(rhs.clone());
            }
            let factor = ndarray_to_faer_mat(lower);
            let mut solution = ndarray_to_faer_mat(rhs);
            solve_upper_triangular_in_place(factor.as_ref().transpose(), solution.as_mut(), Par::Seq);
            Ok(faer_mat_to_ndarray(solution.as_ref()))
        }
    }
} // End of faer_specific_code module

// --- LinAlgBackendProvider Dispatch ---

// --- Implement BackendEigh for Provider ---
impl BackendEigh<f64> for LinAlgBackendProvider<f64> {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eigh_upper(matrix)
        }
    }
}

// --- Implement BackendEig for Provider ---
impl BackendEig<f64> for LinAlgBackendProvider<f64> {
    fn eig_general(&self, matrix: &Array2<f64>) -> Result<EigOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eig_general(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eig_general(matrix)
        }
    }
}

// --- Implement BackendCholesky for Provider ---
impl BackendCholesky<f64> for LinAlgBackendProvider<f64> {
    fn cholesky_lower(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.cholesky_lower(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.cholesky_lower(matrix)
        }
    }
}

// --- Implement BackendTriangularSolve for Provider ---
impl BackendTriangularSolve<f64> for LinAlgBackendProvider<f64> {
    fn solve_lower(&self, lower: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.solve_lower(lower, rhs)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.solve_lower(lower, rhs)
        }
    }

    fn solve_lower_transpose(&self, lower: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.solve_lower_transpose(lower, rhs)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.solve_lower_transpose(lower, rhs)
        }
    }
}
