#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod backend;
pub mod config;
pub mod cosmology;
pub mod density;
pub mod error;
pub mod mixture;
pub mod params;
pub mod primitives;
pub mod redshift;
pub mod spline;
pub mod vamana;

pub use backend::{ArrayBackend, BackendKind, CpuBackend, RayonBackend};
pub use density::PopulationDensity;
pub use error::DensityError;
pub use mixture::{MixtureOfPowerLawsAndGaussians, MixtureSettings};
pub use params::{BinarySamples, HyperParameters};
pub use redshift::SplineRedshift;
pub use spline::InterpolationKind;
pub use vamana::Vamana;
