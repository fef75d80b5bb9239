// Karhunen-Loeve decomposition of covariance operators

#![doc = include_str!("../README.md")]

pub mod algorithm;
pub mod basis;
pub mod covariance;
pub mod distribution;
pub mod domain;
pub mod eigenpairs;
pub mod error;
pub mod experiment;
pub mod linalg_backends;
pub mod mesh;
pub mod p1;
pub mod quadrature;
pub mod result;
pub mod settings;

pub use algorithm::KarhunenLoeveAlgorithm;
pub use basis::{FunctionalBasis, OrthonormalProductBasis, PolynomialFamily, ScalarFunction};
pub use covariance::{CorrelationKernel, CovarianceModel, StationaryCovarianceModel, UserDefinedCovarianceModel};
pub use distribution::{Distribution, IndependentNormal, UniformBox};
pub use domain::{AffineScaling, Ball, Domain, Interval, LevelSet};
pub use error::{KarhunenLoeveError, Result};
pub use experiment::{GaussFamily, GaussProductExperiment, GaussRule, MonteCarloExperiment, WeightedExperiment};
pub use mesh::{Mesh, SimplexLocation};
pub use p1::P1Factory;
pub use quadrature::{QuadratureConfig, QuadratureFactory};
pub use result::{Field, KarhunenLoeveFunction, KarhunenLoeveResult};
