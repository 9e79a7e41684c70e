//! Exponentiated-spline merger-rate evolution in redshift.
//!
//! The rate evolves as `psi(z) = exp(f(z))` with `f` interpolated through
//! hyper-parameter nodes, and is normalised by the sensitive spacetime volume
//!
//! `V = integral dz  psi(z) / (1 + z)  dVc/dz`
//!
//! evaluated with the trapezoidal rule on a grid fixed at construction.

use crate::backend::ArrayBackend;
use crate::cosmology::{FlatLambdaCdm, RedshiftVolume};
use crate::density::PopulationDensity;
use crate::error::DensityError;
use crate::params::HyperParameters;
use crate::spline::{InterpolationKind, NodeSpline};
use ndarray::{Array1, ArrayView1, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the data column and the stem of every spline key.
pub const REDSHIFT_PARAMETER: &str = "redshift";

fn default_nodes() -> usize {
    10
}

/// Structural settings of a [`SplineRedshift`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineRedshiftSettings {
    pub z_max: f64,
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    #[serde(default)]
    pub kind: InterpolationKind,
    #[serde(default)]
    pub log_nodes: bool,
    #[serde(default)]
    pub regularize: bool,
}

impl SplineRedshiftSettings {
    pub fn new(z_max: f64) -> Self {
        Self {
            z_max,
            nodes: default_nodes(),
            kind: InterpolationKind::default(),
            log_nodes: false,
            regularize: false,
        }
    }

    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_kind(mut self, kind: InterpolationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_log_nodes(mut self, log_nodes: bool) -> Self {
        self.log_nodes = log_nodes;
        self
    }

    pub fn with_regularize(mut self, regularize: bool) -> Self {
        self.regularize = regularize;
        self
    }
}

/// Spline-shaped redshift evolution with comoving-volume normalisation.
#[derive(Debug, Clone)]
pub struct SplineRedshift {
    spline: NodeSpline,
    volume: RedshiftVolume,
    backend: Arc<dyn ArrayBackend>,
}

impl SplineRedshift {
    /// Builds the model against the Planck15 background cosmology.
    pub fn new(
        settings: &SplineRedshiftSettings,
        backend: Arc<dyn ArrayBackend>,
    ) -> Result<Self, DensityError> {
        Self::with_cosmology(settings, &FlatLambdaCdm::planck15(), backend)
    }

    pub fn with_cosmology(
        settings: &SplineRedshiftSettings,
        cosmology: &FlatLambdaCdm,
        backend: Arc<dyn ArrayBackend>,
    ) -> Result<Self, DensityError> {
        let volume = RedshiftVolume::new(backend.as_ref(), settings.z_max, cosmology)?;
        let spline = NodeSpline::new(
            REDSHIFT_PARAMETER,
            0.0,
            settings.z_max,
            settings.nodes,
            settings.kind,
            settings.log_nodes,
            settings.regularize,
        )?;
        Ok(Self {
            spline,
            volume,
            backend,
        })
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.spline.variable_names()
    }

    pub fn volume(&self) -> &RedshiftVolume {
        &self.volume
    }

    /// Unnormalised rate evolution `psi(z)`.
    pub fn psi_of_z(
        &self,
        redshift: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let nodes = self.spline.nodes_from(parameters)?;
        self.spline
            .p_x_unnormed(self.backend.as_ref(), redshift, &nodes)
    }

    /// Total sensitive spacetime volume for one hyper-parameter point.
    pub fn normalisation(&self, parameters: &HyperParameters) -> Result<f64, DensityError> {
        let zs = self.volume.zs();
        let psi = self.psi_of_z(zs, parameters)?;
        let integrand = Zip::from(&psi)
            .and(zs)
            .and(self.volume.dvc_dz())
            .map_collect(|&p, &z, &dvc| p * dvc / (1.0 + z));
        Ok(self.backend.trapz(integrand.view(), zs))
    }

    /// [`normalisation`](Self::normalisation) for many hyper-parameter points at once.
    pub fn normalisation_batch(
        &self,
        parameters: &[HyperParameters],
    ) -> Result<Array1<f64>, DensityError> {
        let values = parameters
            .par_iter()
            .map(|point| self.normalisation(point))
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(Array1::from_vec(values))
    }

    pub fn total_spacetime_volume(&self, parameters: &HyperParameters) -> Result<f64, DensityError> {
        self.normalisation(parameters)
    }

    /// `psi(z) / (1 + z) dVc/dz`, optionally zeroed above `z_max`.
    pub fn differential_spacetime_volume(
        &self,
        redshift: ArrayView1<f64>,
        parameters: &HyperParameters,
        bounds: bool,
    ) -> Result<Array1<f64>, DensityError> {
        let psi = self.psi_of_z(redshift, parameters)?;
        let dvc_dz = self.volume.dvc_dz_at(self.backend.as_ref(), redshift);
        let z_max = self.volume.z_max();
        Ok(Zip::from(&psi)
            .and(redshift)
            .and(&dvc_dz)
            .map_collect(|&p, &z, &dvc| {
                if bounds && z > z_max {
                    0.0
                } else {
                    p / (1.0 + z) * dvc
                }
            }))
    }

    /// Normalised redshift density of sources.
    pub fn probability(
        &self,
        redshift: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let normalisation = self.normalisation(parameters)?;
        let volume = self.differential_spacetime_volume(redshift, parameters, true)?;
        Ok(volume / normalisation)
    }
}

impl PopulationDensity for SplineRedshift {
    fn variable_names(&self) -> Vec<String> {
        SplineRedshift::variable_names(self)
    }

    fn evaluate(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        self.probability(data, parameters)
    }
}
