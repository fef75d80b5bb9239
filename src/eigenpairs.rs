// src/eigenpairs.rs

//! Ordering and truncation of eigenpairs shared by the factories.

use crate::linalg_backends::EigOutput;
use log::warn;
use ndarray::{s, Array1, Array2, Axis};

/// Eigenvalues in decreasing order with their eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct SortedEigenpairs {
    pub eigenvalues: Array1<f64>,
    pub eigenvectors: Array2<f64>,
}

/// Sorts eigenpairs by decreasing eigenvalue.
///
/// Works on a `D x (D + 1)` table whose row `j` holds eigenvector `j` followed by
/// `-λ_j`; rows are sorted by the last column (ascending, stable) and the
/// eigenvalues are negated back.
pub fn sort_decreasing(eigenvalues: &Array1<f64>, eigenvectors: &Array2<f64>) -> SortedEigenpairs {
    let count = eigenvalues.len();
    let dimension = eigenvectors.nrows();
    let mut table = Array2::<f64>::zeros((count, dimension + 1));
    for j in 0..count {
        table.slice_mut(s![j, ..dimension]).assign(&eigenvectors.column(j));
        table[[j, dimension]] = -eigenvalues[j];
    }
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|&a, &b| table[[a, dimension]].total_cmp(&table[[b, dimension]]));
    let sorted_table = table.select(Axis(0), &order);

    let sorted_eigenvalues = sorted_table.column(dimension).mapv(|v| -v);
    let sorted_eigenvectors = sorted_table.slice(s![.., ..dimension]).t().to_owned();
    SortedEigenpairs { eigenvalues: sorted_eigenvalues, eigenvectors: sorted_eigenvectors }
}

/// Number of leading eigenvalues kept: the longest prefix with `λ_j > threshold · |λ_0|`,
/// capped by `max_modes` when given.
///
/// `eigenvalues` must be sorted in decreasing order and `threshold >= 0`, so a
/// non-positive leading eigenvalue yields zero retained modes.
pub fn retained_count(eigenvalues: &Array1<f64>, threshold: f64, max_modes: Option<usize>) -> usize {
    if eigenvalues.is_empty() {
        return 0;
    }
    let cutoff = threshold * eigenvalues[0].abs();
    let count = eigenvalues.iter().take_while(|&&lambda| lambda > cutoff).count();
    match max_modes {
        Some(limit) => count.min(limit),
        None => count,
    }
}

/// Real parts of a general eigendecomposition.
///
/// Imaginary parts are dropped. Eigenvalues whose imaginary part exceeds
/// `tolerance`, relative to the largest `max(1, |Re λ|)`, are reported with a warning.
pub fn real_parts(decomposition: EigOutput<f64>, tolerance: f64) -> (Array1<f64>, Array2<f64>) {
    let scale = decomposition
        .eigenvalues_re
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let offending = decomposition
        .eigenvalues_im
        .iter()
        .filter(|im| im.abs() > tolerance * scale)
        .count();
    if offending > 0 {
        let largest = decomposition.eigenvalues_im.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        warn!(
            "{} eigenvalue(s) have a non-negligible imaginary part (largest {:.3e}); keeping the real parts.",
            offending, largest
        );
    }
    (decomposition.eigenvalues_re, decomposition.eigenvectors_re)
}

/// Euclidean norm of a vector.
pub fn norm2(vector: &Array1<f64>) -> f64 {
    vector.dot(vector).sqrt()
}
