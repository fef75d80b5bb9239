// src/error.rs

use std::error::Error;
use std::fmt;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Errors raised while configuring or running a Karhunen-Loeve factory.
///
/// Configuration problems are reported eagerly, at construction time, and leave
/// no usable factory behind. Numerical failures of the dense kernels are
/// propagated unchanged; nothing is retried and no partial basis is returned.
#[derive(Debug)]
pub enum KarhunenLoeveError {
    /// An argument violates a documented precondition (dimension mismatch,
    /// negative threshold, malformed mesh or covariance output).
    InvalidArgument(String),
    /// The integration domain has an empty extent along `axis`.
    DegenerateDomain { axis: usize, lower: f64, upper: f64 },
    /// None of the `generated` quadrature nodes fell inside the integration domain.
    NoIntegrationNodes { generated: usize },
    /// The Gram matrix could not be Cholesky-factored.
    SingularGram(String),
    /// Failure reported by the dense linear algebra backend.
    LinearAlgebra(ThreadSafeStdError),
    /// A P1 function was evaluated at a point that no simplex of its mesh contains.
    PointOutsideMesh(Vec<f64>),
}

impl fmt::Display for KarhunenLoeveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KarhunenLoeveError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            KarhunenLoeveError::DegenerateDomain { axis, lower, upper } => write!(
                f,
                "degenerate integration domain: axis {} has lower bound {} and upper bound {}",
                axis, lower, upper
            ),
            KarhunenLoeveError::NoIntegrationNodes { generated } => write!(
                f,
                "no integration node lies inside the domain ({} nodes generated)",
                generated
            ),
            KarhunenLoeveError::SingularGram(msg) => {
                write!(f, "Gram matrix is not positive definite: {}", msg)
            }
            KarhunenLoeveError::LinearAlgebra(e) => write!(f, "linear algebra failure: {}", e),
            KarhunenLoeveError::PointOutsideMesh(point) => {
                write!(f, "point {:?} is outside of the mesh", point)
            }
        }
    }
}

impl Error for KarhunenLoeveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KarhunenLoeveError::LinearAlgebra(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ThreadSafeStdError> for KarhunenLoeveError {
    fn from(e: ThreadSafeStdError) -> Self {
        KarhunenLoeveError::LinearAlgebra(e)
    }
}

pub type Result<T> = std::result::Result<T, KarhunenLoeveError>;
