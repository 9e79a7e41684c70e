use crate::error::DensityError;
use crate::params::HyperParameters;
use ndarray::{Array1, ArrayView1};

/// A population density over a single physical quantity.
///
/// Implemented by the one-dimensional models in this crate, and accepted as the
/// chirp-mass reference model of [`Vamana`](crate::vamana::Vamana).
pub trait PopulationDensity: Send + Sync {
    /// Ordered names of the hyper-parameters this density consumes.
    fn variable_names(&self) -> Vec<String>;

    /// Evaluates the density at every point of `data`.
    fn evaluate(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError>;
}
