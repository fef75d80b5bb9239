// src/algorithm.rs

use crate::covariance::CovarianceModel;
use crate::error::Result;
use crate::p1::P1Factory;
use crate::quadrature::QuadratureFactory;
use crate::result::KarhunenLoeveResult;
use log::debug;

/// Choice of discretization for a Karhunen-Loeve decomposition.
#[derive(Debug, Clone)]
pub enum KarhunenLoeveAlgorithm {
    P1(P1Factory),
    Quadrature(QuadratureFactory),
}

impl KarhunenLoeveAlgorithm {
    pub fn build(&self, covariance_model: &dyn CovarianceModel) -> Result<KarhunenLoeveResult> {
        match self {
            KarhunenLoeveAlgorithm::P1(factory) => {
                debug!("Dispatching Karhunen-Loeve decomposition to the P1 factory.");
                factory.build(covariance_model)
            }
            KarhunenLoeveAlgorithm::Quadrature(factory) => {
                debug!("Dispatching Karhunen-Loeve decomposition to the quadrature factory.");
                factory.build(covariance_model)
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            KarhunenLoeveAlgorithm::P1(factory) => factory.threshold(),
            KarhunenLoeveAlgorithm::Quadrature(factory) => factory.threshold(),
        }
    }
}

impl From<P1Factory> for KarhunenLoeveAlgorithm {
    fn from(factory: P1Factory) -> Self {
        KarhunenLoeveAlgorithm::P1(factory)
    }
}

impl From<QuadratureFactory> for KarhunenLoeveAlgorithm {
    fn from(factory: QuadratureFactory) -> Self {
        KarhunenLoeveAlgorithm::Quadrature(factory)
    }
}
