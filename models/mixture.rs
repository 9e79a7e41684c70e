//! One-dimensional mixture of power-law segments and truncated Gaussians.
//!
//! The power-law part is a chain of `n_powerlaws` segments joined end to end at
//! the `break_i` hyper-parameters. Each segment is a power law normalised over
//! its own interval; adjacent segments are rescaled so the density is continuous
//! across every break, and the chain is renormalised to unit area.
//!
//! The Gaussian part is a weighted sum of `n_gaussians` normal distributions
//! truncated to `[minimum, gaussian_maximum]`. The Gaussian weights also set the
//! mixing fraction between the two parts: `mix = clip(sum(weights), 0, 1)`.
//!
//! Every hyper-parameter key is prefixed with the model `name`, and its first
//! underscore-delimited token can be renamed through `key_mapping`, so that for
//! example `alpha_1` is read from `mass_index_1`.

use crate::backend::ArrayBackend;
use crate::density::PopulationDensity;
use crate::error::DensityError;
use crate::params::HyperParameters;
use crate::primitives::{power_law, power_law_at, truncated_normal};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn default_gaussian_maximum() -> f64 {
    100.0
}

/// Structural settings of a [`MixtureOfPowerLawsAndGaussians`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureSettings {
    pub n_powerlaws: usize,
    pub n_gaussians: usize,
    /// Upper truncation shared by all Gaussian components.
    #[serde(default = "default_gaussian_maximum")]
    pub gaussian_maximum: f64,
    /// Prefix of every hyper-parameter key, e.g. `"mass_"`.
    #[serde(default)]
    pub name: String,
    /// Renames the leading token of standard keys, e.g. `alpha -> index`.
    #[serde(default)]
    pub key_mapping: BTreeMap<String, String>,
}

impl MixtureSettings {
    pub fn new(n_powerlaws: usize, n_gaussians: usize) -> Self {
        Self {
            n_powerlaws,
            n_gaussians,
            gaussian_maximum: default_gaussian_maximum(),
            name: String::new(),
            key_mapping: BTreeMap::new(),
        }
    }

    pub fn with_gaussian_maximum(mut self, gaussian_maximum: f64) -> Self {
        self.gaussian_maximum = gaussian_maximum;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_key_mapping<K, V>(mut self, mapping: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.key_mapping = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }
}

/// Renames the first underscore-delimited token of `key` through `mapping`.
fn remap_key(mapping: &BTreeMap<String, String>, key: &str) -> String {
    let (base, rest) = match key.split_once('_') {
        Some((base, rest)) => (base, Some(rest)),
        None => (key, None),
    };
    let base = mapping.get(base).map(String::as_str).unwrap_or(base);
    match rest {
        Some(rest) => format!("{base}_{rest}"),
        None => base.to_string(),
    }
}

/// Fully resolved keys of one power-law segment.
#[derive(Debug, Clone)]
struct PowerLawSegment {
    alpha: String,
    lower: String,
    upper: String,
}

/// Fully resolved keys of one Gaussian component.
#[derive(Debug, Clone)]
struct GaussianComponent {
    weight: String,
    mean: String,
    sigma: String,
}

/// Parameter values of one power-law segment at a given hyper-parameter point.
#[derive(Debug, Clone, Copy)]
struct SegmentBounds {
    alpha: f64,
    low: f64,
    high: f64,
}

/// A mixture of chained power laws and truncated Gaussians.
#[derive(Debug, Clone)]
pub struct MixtureOfPowerLawsAndGaussians {
    settings: MixtureSettings,
    segments: Vec<PowerLawSegment>,
    gaussians: Vec<GaussianComponent>,
    minimum_key: String,
    variable_names: Vec<String>,
    backend: Arc<dyn ArrayBackend>,
}

impl MixtureOfPowerLawsAndGaussians {
    pub fn new(settings: MixtureSettings, backend: Arc<dyn ArrayBackend>) -> Self {
        if settings.n_powerlaws == 0 && settings.n_gaussians == 0 {
            log::warn!(
                "Mixture '{}' has neither power-law nor Gaussian components; it will evaluate to zero everywhere.",
                settings.name
            );
        }

        let key = |canonical: &str| {
            format!(
                "{}{}",
                settings.name,
                remap_key(&settings.key_mapping, canonical)
            )
        };
        let indexed = |base: &str, index: usize, count: usize| {
            if count > 1 {
                key(&format!("{base}_{index}"))
            } else {
                key(base)
            }
        };

        let minimum_key = key("minimum");
        let maximum_key = key("maximum");

        let n_powerlaws = settings.n_powerlaws;
        let breaks: Vec<String> = (1..n_powerlaws)
            .map(|ii| key(&format!("break_{ii}")))
            .collect();
        let segments: Vec<PowerLawSegment> = (0..n_powerlaws)
            .map(|ii| PowerLawSegment {
                alpha: indexed("alpha", ii + 1, n_powerlaws),
                lower: if ii == 0 {
                    minimum_key.clone()
                } else {
                    breaks[ii - 1].clone()
                },
                upper: if ii + 1 == n_powerlaws {
                    maximum_key.clone()
                } else {
                    breaks[ii].clone()
                },
            })
            .collect();

        let n_gaussians = settings.n_gaussians;
        let gaussians: Vec<GaussianComponent> = (1..=n_gaussians)
            .map(|ii| GaussianComponent {
                weight: indexed("weight", ii, n_gaussians),
                mean: indexed("mean", ii, n_gaussians),
                sigma: indexed("sigma", ii, n_gaussians),
            })
            .collect();

        let mut variable_names: Vec<String> =
            segments.iter().map(|s| s.alpha.clone()).collect();
        variable_names.extend(breaks);
        variable_names.extend(gaussians.iter().map(|g| g.weight.clone()));
        variable_names.extend(gaussians.iter().map(|g| g.mean.clone()));
        variable_names.extend(gaussians.iter().map(|g| g.sigma.clone()));
        variable_names.push(minimum_key.clone());
        variable_names.push(maximum_key);

        Self {
            settings,
            segments,
            gaussians,
            minimum_key,
            variable_names,
            backend,
        }
    }

    pub fn settings(&self) -> &MixtureSettings {
        &self.settings
    }

    /// Ordered names of every hyper-parameter this mixture reads.
    pub fn variable_names(&self) -> Vec<String> {
        self.variable_names.clone()
    }

    /// Applies `key_mapping` to the first underscore-delimited token of `key`.
    pub fn replace_key(&self, key: &str) -> String {
        remap_key(&self.settings.key_mapping, key)
    }

    fn segment_bounds(&self, parameters: &HyperParameters) -> Result<Vec<SegmentBounds>, DensityError> {
        self.segments
            .iter()
            .map(|segment| {
                Ok(SegmentBounds {
                    alpha: parameters.require(&segment.alpha)?,
                    low: parameters.require(&segment.lower)?,
                    high: parameters.require(&segment.upper)?,
                })
            })
            .collect()
    }

    fn corrections_from(&self, bounds: &[SegmentBounds]) -> Result<Array1<f64>, DensityError> {
        let mut ratios = Vec::with_capacity(bounds.len());
        if !bounds.is_empty() {
            ratios.push(1.0);
        }
        for (left, right) in bounds.iter().tuple_windows() {
            let join = left.high;
            let from_left = power_law_at(join, left.alpha, left.low, left.high)?;
            let from_right = power_law_at(join, right.alpha, right.low, right.high)?;
            ratios.push(from_left / from_right);
        }
        Ok(self.backend.cumprod(Array1::from_vec(ratios).view()))
    }

    /// Cumulative factors that make adjacent power-law segments agree at
    /// their shared break. The first factor is always one.
    pub fn breakpoint_corrections(
        &self,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let bounds = self.segment_bounds(parameters)?;
        self.corrections_from(&bounds)
    }

    /// The continuous, unit-area chain of power-law segments.
    pub fn powerlaw_component(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let backend = self.backend.as_ref();
        let bounds = self.segment_bounds(parameters)?;
        match bounds.as_slice() {
            [] => Ok(Array1::zeros(data.len())),
            [single] => power_law(backend, data, single.alpha, single.low, single.high),
            segments => {
                let corrections = self.corrections_from(segments)?;
                let total = backend.sum(corrections.view());
                let last = segments.len() - 1;
                let mut density = Array1::<f64>::zeros(data.len());
                for (index, (segment, &correction)) in
                    segments.iter().zip(corrections.iter()).enumerate()
                {
                    let piece = power_law(backend, data, segment.alpha, segment.low, segment.high)?;
                    // Interior segments cover [low, high); the next segment owns the break.
                    let open_above = index < last;
                    Zip::from(&mut density)
                        .and(&piece)
                        .and(data)
                        .for_each(|d, &p, &x| {
                            if !(open_above && x >= segment.high) {
                                *d += correction * p;
                            }
                        });
                }
                Ok(density / total)
            }
        }
    }

    /// The weight-normalised sum of truncated Gaussians.
    pub fn gaussian_component(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let backend = self.backend.as_ref();
        let high = self.settings.gaussian_maximum;
        match self.gaussians.as_slice() {
            [] => Ok(Array1::zeros(data.len())),
            [single] => truncated_normal(
                backend,
                data,
                parameters.require(&single.mean)?,
                parameters.require(&single.sigma)?,
                parameters.require(&self.minimum_key)?,
                high,
            ),
            components => {
                let low = parameters.require(&self.minimum_key)?;
                let mut density = Array1::<f64>::zeros(data.len());
                let mut total_weight = 0.0;
                for component in components {
                    let weight = parameters.require(&component.weight)?;
                    let piece = truncated_normal(
                        backend,
                        data,
                        parameters.require(&component.mean)?,
                        parameters.require(&component.sigma)?,
                        low,
                        high,
                    )?;
                    density.scaled_add(weight, &piece);
                    total_weight += weight;
                }
                if total_weight <= 0.0 {
                    return Ok(Array1::zeros(data.len()));
                }
                Ok(density / total_weight)
            }
        }
    }

    /// Fraction of the population in the Gaussian part, `clip(sum(weights), 0, 1)`.
    pub fn mixing_fraction(&self, parameters: &HyperParameters) -> Result<f64, DensityError> {
        let total = self
            .gaussians
            .iter()
            .map(|component| parameters.require(&component.weight))
            .sum::<Result<f64, _>>()?;
        Ok(self.backend.clip(total, 0.0, 1.0))
    }

    /// Evaluates `(1 - mix) * powerlaw + mix * gaussian`.
    pub fn evaluate(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        if self.segments.is_empty() && self.gaussians.is_empty() {
            return Ok(Array1::zeros(data.len()));
        }
        let mix = self.mixing_fraction(parameters)?;
        let powerlaw = self.powerlaw_component(data, parameters)?;
        let gaussian = self.gaussian_component(data, parameters)?;
        Ok(powerlaw * (1.0 - mix) + gaussian * mix)
    }
}

impl PopulationDensity for MixtureOfPowerLawsAndGaussians {
    fn variable_names(&self) -> Vec<String> {
        MixtureOfPowerLawsAndGaussians::variable_names(self)
    }

    fn evaluate(
        &self,
        data: ArrayView1<f64>,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        MixtureOfPowerLawsAndGaussians::evaluate(self, data, parameters)
    }
}
