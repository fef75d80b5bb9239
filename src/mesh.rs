// src/mesh.rs

use crate::domain::Domain;
use crate::error::{KarhunenLoeveError, Result};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{Determinant, Solve};
use serde::{Deserialize, Serialize};

// Barycentric coordinates down to -BARYCENTRIC_SLACK still count as inside.
const BARYCENTRIC_SLACK: f64 = 1e-12;

/// Simplicial mesh: `vertex_count x dimension` vertex coordinates and a list of
/// simplices, each given by `dimension + 1` vertex indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    vertices: Array2<f64>,
    simplices: Vec<Vec<usize>>,
}

/// Location of a point inside a mesh.
#[derive(Debug, Clone)]
pub struct SimplexLocation {
    pub simplex: usize,
    /// Barycentric coordinates, aligned with the vertex indices of the simplex.
    pub barycentric: Array1<f64>,
}

impl Mesh {
    /// Creates a mesh after checking that every simplex has `dimension + 1`
    /// valid vertex indices.
    pub fn new(vertices: Array2<f64>, simplices: Vec<Vec<usize>>) -> Result<Self> {
        let (vertex_count, dimension) = vertices.dim();
        if vertex_count == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Mesh must have at least one vertex.".into()));
        }
        if dimension == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Mesh vertices must have at least one coordinate.".into()));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(KarhunenLoeveError::InvalidArgument("Mesh vertices contain non-finite coordinates.".into()));
        }
        for (index, simplex) in simplices.iter().enumerate() {
            if simplex.len() != dimension + 1 {
                return Err(KarhunenLoeveError::InvalidArgument(format!(
                    "Simplex {} has {} vertices, expected {} for a mesh of dimension {}.",
                    index,
                    simplex.len(),
                    dimension + 1,
                    dimension
                )));
            }
            if let Some(&bad) = simplex.iter().find(|&&v| v >= vertex_count) {
                return Err(KarhunenLoeveError::InvalidArgument(format!(
                    "Simplex {} references vertex {} but the mesh has {} vertices.",
                    index, bad, vertex_count
                )));
            }
        }
        Ok(Self { vertices, simplices })
    }

    /// Regular mesh of `[lower, upper]` with `elements` segments of equal length.
    pub fn interval(lower: f64, upper: f64, elements: usize) -> Result<Self> {
        if elements == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Interval mesh needs at least one element.".into()));
        }
        if !(upper > lower) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Interval mesh bounds must satisfy lower < upper, got [{}, {}].",
                lower, upper
            )));
        }
        let step = (upper - lower) / elements as f64;
        let vertices = Array2::from_shape_fn((elements + 1, 1), |(i, _)| lower + step * i as f64);
        let simplices = (0..elements).map(|i| vec![i, i + 1]).collect();
        Self::new(vertices, simplices)
    }

    /// Regular triangulation of the rectangle `[lower_0, upper_0] x [lower_1, upper_1]`
    /// with `nx x ny` cells, each split along its main diagonal.
    pub fn rectangle(lower: [f64; 2], upper: [f64; 2], nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(KarhunenLoeveError::InvalidArgument("Rectangle mesh needs at least one cell per axis.".into()));
        }
        if !(upper[0] > lower[0] && upper[1] > lower[1]) {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Rectangle mesh bounds must satisfy lower < upper, got {:?} and {:?}.",
                lower, upper
            )));
        }
        let hx = (upper[0] - lower[0]) / nx as f64;
        let hy = (upper[1] - lower[1]) / ny as f64;
        let row = nx + 1;
        let vertices = Array2::from_shape_fn((row * (ny + 1), 2), |(v, k)| {
            if k == 0 {
                lower[0] + hx * (v % row) as f64
            } else {
                lower[1] + hy * (v / row) as f64
            }
        });
        let mut simplices = Vec::with_capacity(2 * nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let v00 = j * row + i;
                let v10 = v00 + 1;
                let v01 = v00 + row;
                let v11 = v01 + 1;
                simplices.push(vec![v00, v10, v11]);
                simplices.push(vec![v00, v11, v01]);
            }
        }
        Self::new(vertices, simplices)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.nrows()
    }

    pub fn dimension(&self) -> usize {
        self.vertices.ncols()
    }

    pub fn simplex_count(&self) -> usize {
        self.simplices.len()
    }

    pub fn vertices(&self) -> ArrayView2<'_, f64> {
        self.vertices.view()
    }

    pub fn vertex(&self, index: usize) -> ArrayView1<'_, f64> {
        self.vertices.row(index)
    }

    pub fn simplices(&self) -> &[Vec<usize>] {
        &self.simplices
    }

    // Columns are the edge vectors v_k - v_0, k = 1..=dimension.
    fn edge_matrix(&self, simplex: &[usize]) -> Array2<f64> {
        let dimension = self.dimension();
        let origin = self.vertices.row(simplex[0]);
        Array2::from_shape_fn((dimension, dimension), |(i, k)| self.vertices[[simplex[k + 1], i]] - origin[i])
    }

    /// Volume (length, area, ...) of simplex `index`.
    pub fn simplex_volume(&self, index: usize) -> Result<f64> {
        let simplex = self.simplices.get(index).ok_or_else(|| {
            KarhunenLoeveError::InvalidArgument(format!("Simplex index {} out of range ({} simplices).", index, self.simplices.len()))
        })?;
        let determinant = self
            .edge_matrix(simplex)
            .det()
            .map_err(|e| KarhunenLoeveError::LinearAlgebra(Box::new(e)))?;
        let factorial: f64 = (1..=self.dimension()).map(|k| k as f64).product();
        Ok(determinant.abs() / factorial)
    }

    /// Total volume of the mesh.
    pub fn volume(&self) -> Result<f64> {
        (0..self.simplices.len()).map(|s| self.simplex_volume(s)).sum()
    }

    /// Gram matrix of the P1 shape functions, `gram[i][j] = ∫ θ_i θ_j`.
    ///
    /// Each simplex `T` of dimension `n` contributes its exact local mass matrix
    /// `|T| (1 + δ_ab) / ((n + 1)(n + 2))`.
    pub fn compute_p1_gram(&self) -> Result<Array2<f64>> {
        let vertex_count = self.vertex_count();
        let dimension = self.dimension() as f64;
        let denominator = (dimension + 1.0) * (dimension + 2.0);
        let mut gram = Array2::<f64>::zeros((vertex_count, vertex_count));
        for (index, simplex) in self.simplices.iter().enumerate() {
            let volume = self.simplex_volume(index)?;
            let off_diagonal = volume / denominator;
            for &a in simplex {
                for &b in simplex {
                    gram[[a, b]] += if a == b { 2.0 * off_diagonal } else { off_diagonal };
                }
            }
        }
        debug!("Assembled P1 Gram matrix of size {}x{} over {} simplices.", vertex_count, vertex_count, self.simplices.len());
        Ok(gram)
    }

    /// Finds a simplex containing `point` together with the barycentric coordinates
    /// of the point in it. Flat simplices are skipped.
    pub fn locate(&self, point: ArrayView1<f64>) -> Option<SimplexLocation> {
        if point.len() != self.dimension() {
            return None;
        }
        for (index, simplex) in self.simplices.iter().enumerate() {
            let origin = self.vertices.row(simplex[0]);
            let offset = &point - &origin;
            let reduced = match self.edge_matrix(simplex).solve(&offset) {
                Ok(coordinates) => coordinates,
                Err(_) => continue,
            };
            if reduced.iter().any(|c| !c.is_finite()) {
                continue;
            }
            let mut barycentric = Array1::<f64>::zeros(simplex.len());
            barycentric[0] = 1.0 - reduced.sum();
            barycentric.slice_mut(ndarray::s![1..]).assign(&reduced);
            if barycentric.iter().all(|&c| c >= -BARYCENTRIC_SLACK) {
                return Some(SimplexLocation { simplex: index, barycentric });
            }
        }
        None
    }

    /// Evaluates the P1 interpolant of `values` (`vertex_count x d`) at `point`.
    pub fn interpolate(&self, values: ArrayView2<f64>, point: ArrayView1<f64>) -> Result<Array1<f64>> {
        if values.nrows() != self.vertex_count() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Field has {} rows but the mesh has {} vertices.",
                values.nrows(),
                self.vertex_count()
            )));
        }
        if point.len() != self.dimension() {
            return Err(KarhunenLoeveError::InvalidArgument(format!(
                "Point has dimension {} but the mesh has dimension {}.",
                point.len(),
                self.dimension()
            )));
        }
        let location = self
            .locate(point)
            .ok_or_else(|| KarhunenLoeveError::PointOutsideMesh(point.to_vec()))?;
        let simplex = &self.simplices[location.simplex];
        let mut value = Array1::<f64>::zeros(values.ncols());
        for (&vertex, &weight) in simplex.iter().zip(location.barycentric.iter()) {
            value.scaled_add(weight, &values.index_axis(Axis(0), vertex));
        }
        Ok(value)
    }
}

impl Domain for Mesh {
    fn dimension(&self) -> usize {
        self.vertices.ncols()
    }

    fn contains(&self, point: ArrayView1<f64>) -> bool {
        self.locate(point).is_some()
    }

    fn lower_bound(&self) -> Array1<f64> {
        self.vertices.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v))
    }

    fn upper_bound(&self) -> Array1<f64> {
        self.vertices.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v))
    }
}
