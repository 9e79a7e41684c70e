//! TOML evaluation configuration: which backend to use, which model to build
//! and the hyper-parameter point to evaluate it at.

use crate::backend::{ArrayBackend, BackendKind};
use crate::density::PopulationDensity;
use crate::error::DensityError;
use crate::mixture::{MixtureOfPowerLawsAndGaussians, MixtureSettings};
use crate::params::HyperParameters;
use crate::redshift::{SplineRedshift, SplineRedshiftSettings};
use crate::vamana::Vamana;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Configured model could not be constructed or evaluated: {0}")]
    DensityError(#[from] DensityError),
}

/// Structural description of a model, tagged by `type` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    SplineRedshift(SplineRedshiftSettings),
    Mixture(MixtureSettings),
    Vamana {
        n_components: usize,
        /// One-dimensional chirp-mass model used to reweight each component.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<Box<ModelSpec>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference_parameters: Option<HyperParameters>,
    },
}

impl ModelSpec {
    pub fn build(&self, backend: Arc<dyn ArrayBackend>) -> Result<Model, DensityError> {
        let model = match self {
            ModelSpec::SplineRedshift(settings) => {
                Model::SplineRedshift(SplineRedshift::new(settings, backend)?)
            }
            ModelSpec::Mixture(settings) => Model::Mixture(MixtureOfPowerLawsAndGaussians::new(
                settings.clone(),
                backend,
            )),
            ModelSpec::Vamana {
                n_components,
                reference,
                reference_parameters,
            } => {
                let mut vamana = Vamana::new(*n_components, backend.clone())?;
                if let Some(reference) = reference {
                    let base = reference.build(backend)?.into_density()?;
                    vamana = vamana.with_reference_model(base, reference_parameters.clone());
                }
                Model::Vamana(vamana)
            }
        };
        log::debug!(
            "Built {} model with {} hyper-parameters",
            model.kind(),
            model.variable_names().len()
        );
        Ok(model)
    }
}

/// A model constructed from a [`ModelSpec`].
#[derive(Debug, Clone)]
pub enum Model {
    SplineRedshift(SplineRedshift),
    Mixture(MixtureOfPowerLawsAndGaussians),
    Vamana(Vamana),
}

impl Model {
    pub fn kind(&self) -> &'static str {
        match self {
            Model::SplineRedshift(_) => "spline_redshift",
            Model::Mixture(_) => "mixture",
            Model::Vamana(_) => "vamana",
        }
    }

    pub fn variable_names(&self) -> Vec<String> {
        match self {
            Model::SplineRedshift(model) => model.variable_names(),
            Model::Mixture(model) => model.variable_names(),
            Model::Vamana(model) => model.variable_names(),
        }
    }

    /// Converts a one-dimensional model into a shareable density.
    pub fn into_density(self) -> Result<Arc<dyn PopulationDensity>, DensityError> {
        match self {
            Model::SplineRedshift(model) => Ok(Arc::new(model)),
            Model::Mixture(model) => Ok(Arc::new(model)),
            Model::Vamana(_) => Err(DensityError::UnsupportedSamples("vamana")),
        }
    }

    /// Evaluates a one-dimensional model. Vamana needs [`crate::BinarySamples`].
    pub fn evaluate(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        match self {
            Model::SplineRedshift(model) => model.probability(data, parameters),
            Model::Mixture(model) => model.evaluate(data, parameters),
            Model::Vamana(_) => Err(DensityError::UnsupportedSamples(self.kind())),
        }
    }
}

/// A complete evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub parameters: HyperParameters,
    pub model: ModelSpec,
}

impl EvaluationConfig {
    pub fn new(model: ModelSpec, parameters: HyperParameters) -> Self {
        Self {
            backend: BackendKind::default(),
            parameters,
            model,
        }
    }

    pub fn build_model(&self) -> Result<Model, DensityError> {
        self.model.build(self.backend.build())
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }
}
