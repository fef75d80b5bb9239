// src/settings.rs

//! Process-wide numeric settings.
//!
//! Factories read the values they need once, when they are constructed, so
//! changing a setting never affects an existing factory.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;

/// Diagonal regularization added to the P1 Gram matrix.
pub const P1_REGULARIZATION_FACTOR: &str = "P1Factory-RegularizationFactor";
/// Diagonal regularization added to the quadrature Gram matrix before its Cholesky factorization.
pub const QUADRATURE_REGULARIZATION_FACTOR: &str = "QuadratureFactory-RegularizationFactor";
/// Relative size of an eigenvalue imaginary part above which a warning is logged.
pub const IMAGINARY_PART_TOLERANCE: &str = "KarhunenLoeve-ImaginaryPartTolerance";

fn defaults() -> HashMap<String, f64> {
    let mut map = HashMap::new();
    map.insert(P1_REGULARIZATION_FACTOR.to_string(), 0.0);
    map.insert(QUADRATURE_REGULARIZATION_FACTOR.to_string(), 0.0);
    map.insert(IMAGINARY_PART_TOLERANCE.to_string(), 1e-8);
    map
}

static SETTINGS: Lazy<RwLock<HashMap<String, f64>>> = Lazy::new(|| RwLock::new(defaults()));

/// Returns the value of `key`, or `0.0` for an unknown key.
pub fn get_scalar(key: &str) -> f64 {
    // A poisoned lock still holds a consistent map of plain floats.
    let guard = SETTINGS.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.get(key).copied().unwrap_or(0.0)
}

/// Sets `key` to `value` for every factory constructed afterwards.
pub fn set_scalar(key: &str, value: f64) {
    let mut guard = SETTINGS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.insert(key.to_string(), value);
}

/// Restores every setting to its default value.
pub fn reset() {
    let mut guard = SETTINGS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = defaults();
}
