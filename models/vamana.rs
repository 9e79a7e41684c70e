//! Vamana: a multi-component model over chirp mass, aligned spins and mass ratio.
//!
//! Component `i` contributes
//!
//! `w_i * p_mc(Mc) * p_chi(chi_1) * p_chi(chi_2) * p_q(q)`
//!
//! where `p_mc` is a normal distribution truncated to the chirp-mass range,
//! `p_chi` a normal truncated to `[-1, 1]` and `p_q` a power law on `[qmin, 1]`.
//! The last weight is the residual `1 - sum(w_i)`, and the chirp-mass locations
//! are ordered by construction: the `mu_m_i` keys are fractional offsets in
//! log chirp mass whose running sum places each component.
//!
//! An optional reference model reweights the chirp-mass factor of each
//! component and renormalises it on a fixed chirp-mass grid.

use crate::backend::ArrayBackend;
use crate::density::PopulationDensity;
use crate::error::DensityError;
use crate::params::{BinarySamples, HyperParameters};
use crate::primitives::{power_law, truncated_normal};
use ndarray::{Array1, ArrayView1, Zip};
use std::fmt;
use std::sync::Arc;

pub const CHIRP_MASS_MINIMUM: f64 = 2.0;
pub const CHIRP_MASS_MAXIMUM: f64 = 100.0;
pub const CHIRP_MASS_GRID_POINTS: usize = 1000;

const SPIN_MINIMUM: f64 = -1.0;
const SPIN_MAXIMUM: f64 = 1.0;
const MASS_RATIO_MAXIMUM: f64 = 1.0;

/// Hyper-parameter keys read by one component.
///
/// The final component carries neither a weight nor a mass offset; both are
/// implied by the others.
#[derive(Debug, Clone)]
struct VamanaComponent {
    weight: Option<String>,
    mass_offset: Option<String>,
    sigma_m: String,
    mu_sz: String,
    sigma_sz: String,
    alpha_q: String,
    qmin: String,
}

impl VamanaComponent {
    fn new(index: usize, n_components: usize) -> Self {
        let explicit = index + 1 < n_components;
        Self {
            weight: explicit.then(|| format!("weight_{index}")),
            mass_offset: explicit.then(|| format!("mu_m_{index}")),
            sigma_m: format!("sigma_m_{index}"),
            mu_sz: format!("mu_sz_{index}"),
            sigma_sz: format!("sigma_sz_{index}"),
            alpha_q: format!("alpha_q_{index}"),
            qmin: format!("qmin_{index}"),
        }
    }
}

/// Reference-model values on the samples and on the chirp-mass grid.
struct ReferenceWeights {
    samples: Array1<f64>,
    grid: Array1<f64>,
}

#[derive(Clone)]
pub struct Vamana {
    components: Vec<VamanaComponent>,
    chirp_masses: Array1<f64>,
    base_model: Option<Arc<dyn PopulationDensity>>,
    reference_parameters: Option<HyperParameters>,
    backend: Arc<dyn ArrayBackend>,
}

impl fmt::Debug for Vamana {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vamana")
            .field("n_components", &self.components.len())
            .field("has_base_model", &self.base_model.is_some())
            .field("reference_parameters", &self.reference_parameters)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl Vamana {
    pub fn new(n_components: usize, backend: Arc<dyn ArrayBackend>) -> Result<Self, DensityError> {
        if n_components == 0 {
            return Err(DensityError::InvalidComponentCount(n_components));
        }
        let components = (0..n_components)
            .map(|ii| VamanaComponent::new(ii, n_components))
            .collect();
        let chirp_masses =
            backend.linspace(CHIRP_MASS_MINIMUM, CHIRP_MASS_MAXIMUM, CHIRP_MASS_GRID_POINTS);
        Ok(Self {
            components,
            chirp_masses,
            base_model: None,
            reference_parameters: None,
            backend,
        })
    }

    /// Reweights the chirp-mass factor by `base_model` evaluated at
    /// `reference_parameters`.
    pub fn with_reference_model(
        mut self,
        base_model: Arc<dyn PopulationDensity>,
        reference_parameters: Option<HyperParameters>,
    ) -> Self {
        self.base_model = Some(base_model);
        self.reference_parameters = reference_parameters;
        self
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn chirp_mass_grid(&self) -> ArrayView1<'_, f64> {
        self.chirp_masses.view()
    }

    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .components
            .iter()
            .filter_map(|c| c.weight.clone())
            .collect();
        names.extend(self.components.iter().filter_map(|c| c.mass_offset.clone()));
        names.extend(self.components.iter().map(|c| c.sigma_m.clone()));
        names.extend(self.components.iter().map(|c| c.mu_sz.clone()));
        names.extend(self.components.iter().map(|c| c.sigma_sz.clone()));
        names.extend(self.components.iter().map(|c| c.alpha_q.clone()));
        names.extend(self.components.iter().map(|c| c.qmin.clone()));
        names
    }

    /// Base model density at `mass`, or ones when no base model is set.
    pub fn reference_model(&self, mass: ArrayView1<f64>) -> Result<Array1<f64>, DensityError> {
        match &self.base_model {
            None => Ok(Array1::ones(mass.len())),
            Some(base) => {
                let parameters = self
                    .reference_parameters
                    .as_ref()
                    .ok_or(DensityError::MissingReferenceParameters)?;
                base.evaluate(mass, parameters)
            }
        }
    }

    fn reference_weights(
        &self,
        mass: ArrayView1<f64>,
    ) -> Result<Option<ReferenceWeights>, DensityError> {
        if self.base_model.is_none() {
            return Ok(None);
        }
        Ok(Some(ReferenceWeights {
            samples: self.reference_model(mass)?,
            grid: self.reference_model(self.chirp_masses.view())?,
        }))
    }

    /// Weight of the final component, `1 - sum(weight_i)`.
    pub fn residual_weight(&self, parameters: &HyperParameters) -> Result<f64, DensityError> {
        let mut total = 0.0;
        for key in self.components.iter().filter_map(|c| c.weight.as_deref()) {
            total += parameters.require(key)?;
        }
        Ok(1.0 - total)
    }

    /// Chirp-mass location of every component, in ascending order.
    pub fn component_mass_locations(
        &self,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let mut offsets = Vec::with_capacity(self.components.len());
        for key in self.components.iter().filter_map(|c| c.mass_offset.as_deref()) {
            offsets.push(parameters.require(key)?);
        }
        offsets.push(1.0 - offsets.iter().sum::<f64>());
        let fractions = self.backend.cumsum(Array1::from_vec(offsets).view());
        let ratio = CHIRP_MASS_MAXIMUM / CHIRP_MASS_MINIMUM;
        Ok(fractions.mapv(|c| CHIRP_MASS_MINIMUM * ratio.powf(c)))
    }

    fn component(&self, index: usize) -> Result<&VamanaComponent, DensityError> {
        self.components
            .get(index)
            .ok_or(DensityError::ComponentOutOfRange {
                index,
                count: self.components.len(),
            })
    }

    fn chirp_mass_density(
        &self,
        mass: ArrayView1<f64>,
        location: f64,
        fractional_width: f64,
        reference: Option<&ReferenceWeights>,
    ) -> Result<Array1<f64>, DensityError> {
        let sigma = fractional_width * location;
        let backend = self.backend.as_ref();
        let prob = truncated_normal(
            backend,
            mass,
            location,
            sigma,
            CHIRP_MASS_MINIMUM,
            CHIRP_MASS_MAXIMUM,
        )?;
        let Some(reference) = reference else {
            return Ok(prob);
        };
        let on_grid = truncated_normal(
            backend,
            self.chirp_masses.view(),
            location,
            sigma,
            CHIRP_MASS_MINIMUM,
            CHIRP_MASS_MAXIMUM,
        )?;
        let norm = backend.trapz((&reference.grid * &on_grid).view(), self.chirp_masses.view());
        Ok(prob * &reference.samples / norm)
    }

    fn spin_density(
        &self,
        spin: ArrayView1<f64>,
        component: &VamanaComponent,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        truncated_normal(
            self.backend.as_ref(),
            spin,
            parameters.require(&component.mu_sz)?,
            parameters.require(&component.sigma_sz)?,
            SPIN_MINIMUM,
            SPIN_MAXIMUM,
        )
    }

    fn mass_ratio_density(
        &self,
        mass_ratio: ArrayView1<f64>,
        component: &VamanaComponent,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        power_law(
            self.backend.as_ref(),
            mass_ratio,
            parameters.require(&component.alpha_q)?,
            parameters.require(&component.qmin)?,
            MASS_RATIO_MAXIMUM,
        )
    }

    /// Chirp-mass factor of component `index`, including any reference reweighting.
    pub fn p_mc(
        &self,
        mass: ArrayView1<f64>,
        parameters: &HyperParameters,
        index: usize,
    ) -> Result<Array1<f64>, DensityError> {
        let component = self.component(index)?;
        let locations = self.component_mass_locations(parameters)?;
        let reference = self.reference_weights(mass)?;
        self.chirp_mass_density(
            mass,
            locations[index],
            parameters.require(&component.sigma_m)?,
            reference.as_ref(),
        )
    }

    pub fn p_chi(
        &self,
        spin: ArrayView1<f64>,
        parameters: &HyperParameters,
        index: usize,
    ) -> Result<Array1<f64>, DensityError> {
        self.spin_density(spin, self.component(index)?, parameters)
    }

    pub fn p_mass_ratio(
        &self,
        mass_ratio: ArrayView1<f64>,
        parameters: &HyperParameters,
        index: usize,
    ) -> Result<Array1<f64>, DensityError> {
        self.mass_ratio_density(mass_ratio, self.component(index)?, parameters)
    }

    /// Joint density of the binaries in `samples`.
    ///
    /// Parameter points whose explicit weights exceed one evaluate to zero.
    pub fn evaluate(
        &self,
        samples: &BinarySamples,
        parameters: &HyperParameters,
    ) -> Result<Array1<f64>, DensityError> {
        let residual = self.residual_weight(parameters)?;
        if residual < 0.0 {
            log::debug!("Vamana weights exceed one (residual {residual}); returning zero density.");
            return Ok(Array1::zeros(samples.len()));
        }

        let reference = self.reference_weights(samples.chirp_mass)?;
        let locations = self.component_mass_locations(parameters)?;
        let mut density = Array1::<f64>::zeros(samples.len());
        for (component, &location) in self.components.iter().zip(locations.iter()) {
            let weight = match &component.weight {
                Some(key) => parameters.require(key)?,
                None => residual,
            };
            let p_mc = self.chirp_mass_density(
                samples.chirp_mass,
                location,
                parameters.require(&component.sigma_m)?,
                reference.as_ref(),
            )?;
            let p_chi_1 = self.spin_density(samples.chi_1, component, parameters)?;
            let p_chi_2 = self.spin_density(samples.chi_2, component, parameters)?;
            let p_q = self.mass_ratio_density(samples.mass_ratio, component, parameters)?;
            Zip::from(&mut density)
                .and(&p_mc)
                .and(&p_chi_1)
                .and(&p_chi_2)
                .and(&p_q)
                .for_each(|d, &mc, &c1, &c2, &q| *d += weight * mc * c1 * c2 * q);
        }
        Ok(density)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::mixture::{MixtureOfPowerLawsAndGaussians, MixtureSettings};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn component_parameters(index: usize, params: &mut HyperParameters) {
        params.insert(format!("sigma_m_{index}"), 0.1);
        params.insert(format!("mu_sz_{index}"), 0.05);
        params.insert(format!("sigma_sz_{index}"), 0.2);
        params.insert(format!("alpha_q_{index}"), 1.5);
        params.insert(format!("qmin_{index}"), 0.2);
    }

    fn two_component_parameters(weight: f64) -> HyperParameters {
        let mut params = HyperParameters::from([("weight_0", weight), ("mu_m_0", 0.3)]);
        component_parameters(0, &mut params);
        component_parameters(1, &mut params);
        params
    }

    fn power_law_base() -> Arc<dyn PopulationDensity> {
        Arc::new(MixtureOfPowerLawsAndGaussians::new(
            MixtureSettings::new(1, 0),
            Arc::new(CpuBackend),
        ))
    }

    #[test]
    fn test_variable_names_are_grouped_by_kind() {
        let model = Vamana::new(3, Arc::new(CpuBackend)).unwrap();
        assert_eq!(
            model.variable_names(),
            vec![
                "weight_0", "weight_1", "mu_m_0", "mu_m_1", "sigma_m_0", "sigma_m_1",
                "sigma_m_2", "mu_sz_0", "mu_sz_1", "mu_sz_2", "sigma_sz_0", "sigma_sz_1",
                "sigma_sz_2", "alpha_q_0", "alpha_q_1", "alpha_q_2", "qmin_0", "qmin_1",
                "qmin_2",
            ]
        );
        assert_eq!(model.n_components(), 3);
    }

    #[test]
    fn test_zero_components_are_rejected() {
        assert!(matches!(
            Vamana::new(0, Arc::new(CpuBackend)),
            Err(DensityError::InvalidComponentCount(0))
        ));
    }

    #[test]
    fn test_excess_weight_gives_zero_density() {
        let model = Vamana::new(2, Arc::new(CpuBackend)).unwrap();
        let params = two_component_parameters(1.2);
        let mass = array![10.0, 20.0, 30.0];
        let spin = array![0.0, 0.1, -0.1];
        let q = array![0.5, 0.6, 0.9];
        let samples = BinarySamples::new(mass.view(), spin.view(), spin.view(), q.view()).unwrap();
        let density = model.evaluate(&samples, &params).unwrap();
        assert_eq!(density, Array1::<f64>::zeros(3));
    }

    #[test]
    fn test_unit_weight_leaves_empty_last_component() {
        let model = Vamana::new(2, Arc::new(CpuBackend)).unwrap();
        let params = two_component_parameters(1.0);
        let mass = array![8.0, 25.0];
        let chi_1 = array![0.1, -0.3];
        let chi_2 = array![0.0, 0.4];
        let q = array![0.5, 0.95];
        let samples = BinarySamples::new(mass.view(), chi_1.view(), chi_2.view(), q.view()).unwrap();
        let density = model.evaluate(&samples, &params).unwrap();

        let first = model.p_mc(mass.view(), &params, 0).unwrap()
            * model.p_chi(chi_1.view(), &params, 0).unwrap()
            * model.p_chi(chi_2.view(), &params, 0).unwrap()
            * model.p_mass_ratio(q.view(), &params, 0).unwrap();
        assert!(density.iter().all(|&p| p > 0.0));
        for (a, b) in density.iter().zip(first.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_mass_locations_follow_cumulative_offsets() {
        let model = Vamana::new(3, Arc::new(CpuBackend)).unwrap();
        let params = HyperParameters::from([("mu_m_0", 0.2), ("mu_m_1", 0.3)]);
        let locations = model.component_mass_locations(&params).unwrap();
        let ratio: f64 = CHIRP_MASS_MAXIMUM / CHIRP_MASS_MINIMUM;
        assert_relative_eq!(locations[0], 2.0 * ratio.powf(0.2), max_relative = 1e-12);
        assert_relative_eq!(locations[1], 2.0 * ratio.powf(0.5), max_relative = 1e-12);
        assert_relative_eq!(locations[2], CHIRP_MASS_MAXIMUM, max_relative = 1e-12);
    }

    #[test]
    fn test_reference_model_defaults_to_ones() {
        let model = Vamana::new(1, Arc::new(CpuBackend)).unwrap();
        assert_eq!(
            model.reference_model(array![3.0, 50.0].view()).unwrap(),
            array![1.0, 1.0]
        );
    }

    #[test]
    fn test_reference_model_without_parameters_is_an_error() {
        let model = Vamana::new(1, Arc::new(CpuBackend))
            .unwrap()
            .with_reference_model(power_law_base(), None);
        assert_eq!(
            model.reference_model(array![3.0].view()),
            Err(DensityError::MissingReferenceParameters)
        );

        let mut params = HyperParameters::new();
        component_parameters(0, &mut params);
        let mass = array![10.0];
        let samples = BinarySamples::new(mass.view(), mass.view(), mass.view(), mass.view()).unwrap();
        assert_eq!(
            model.evaluate(&samples, &params),
            Err(DensityError::MissingReferenceParameters)
        );
    }

    #[test]
    fn test_two_component_density_is_weighted_sum() {
        let model = Vamana::new(2, Arc::new(CpuBackend)).unwrap();
        let params = two_component_parameters(0.4);
        let mass = array![8.0, 25.0];
        let chi_1 = array![0.1, -0.3];
        let chi_2 = array![0.0, 0.4];
        let q = array![0.5, 0.95];
        let samples = BinarySamples::new(mass.view(), chi_1.view(), chi_2.view(), q.view()).unwrap();
        let density = model.evaluate(&samples, &params).unwrap();

        let mut expected = Array1::<f64>::zeros(2);
        for (index, weight) in [(0, 0.4), (1, 0.6)] {
            let term = model.p_mc(mass.view(), &params, index).unwrap()
                * model.p_chi(chi_1.view(), &params, index).unwrap()
                * model.p_chi(chi_2.view(), &params, index).unwrap()
                * model.p_mass_ratio(q.view(), &params, index).unwrap();
            expected.scaled_add(weight, &term);
        }
        for (a, b) in density.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
        assert!(density.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn test_reference_weighted_chirp_mass_is_normalised_on_grid() {
        let reference = HyperParameters::from([("alpha", -2.0), ("minimum", 2.0), ("maximum", 100.0)]);
        let model = Vamana::new(1, Arc::new(CpuBackend))
            .unwrap()
            .with_reference_model(power_law_base(), Some(reference));
        let mut params = HyperParameters::new();
        component_parameters(0, &mut params);

        let grid = model.chirp_mass_grid().to_owned();
        let p_mc = model.p_mc(grid.view(), &params, 0).unwrap();
        assert_relative_eq!(CpuBackend.trapz(p_mc.view(), grid.view()), 1.0, epsilon = 1e-9);

        let spin = Array1::<f64>::zeros(grid.len());
        let q = Array1::from_elem(grid.len(), 0.7);
        let samples = BinarySamples::new(grid.view(), spin.view(), spin.view(), q.view()).unwrap();
        let density = model.evaluate(&samples, &params).unwrap();
        let p_chi = model.p_chi(array![0.0].view(), &params, 0).unwrap()[0];
        let p_q = model.p_mass_ratio(array![0.7].view(), &params, 0).unwrap()[0];
        assert_relative_eq!(
            CpuBackend.trapz(density.view(), grid.view()),
            p_chi * p_chi * p_q,
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_component_index_is_checked() {
        let model = Vamana::new(2, Arc::new(CpuBackend)).unwrap();
        let params = two_component_parameters(0.5);
        assert_eq!(
            model.p_chi(array![0.0].view(), &params, 2),
            Err(DensityError::ComponentOutOfRange { index: 2, count: 2 })
        );
    }
}
