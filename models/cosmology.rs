//! Background cosmology and the redshift volume element.
//!
//! Redshift models are normalised against the differential comoving volume
//! `dVc/dz`, tabulated once on a fixed redshift grid and shared by every
//! normalisation call of the owning model.

use crate::backend::ArrayBackend;
use crate::error::DensityError;
use ndarray::{Array1, ArrayView1, Zip};
use std::f64::consts::PI;

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Number of points in the redshift normalisation grid.
pub const REDSHIFT_GRID_POINTS: usize = 1000;

/// Lowest redshift of the normalisation grid.
pub const REDSHIFT_GRID_MINIMUM: f64 = 1e-3;

/// Simpson intervals used per comoving-distance integral. Must be even.
const DISTANCE_INTEGRATION_STEPS: usize = 256;

/// Cubic megaparsecs per cubic gigaparsec.
const MPC3_PER_GPC3: f64 = 1e9;

/// Spatially flat Lambda-CDM cosmology without radiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatLambdaCdm {
    /// Hubble constant in km/s/Mpc.
    pub hubble_constant: f64,
    /// Present-day matter density parameter.
    pub omega_m: f64,
}

impl FlatLambdaCdm {
    pub fn new(hubble_constant: f64, omega_m: f64) -> Self {
        Self {
            hubble_constant,
            omega_m,
        }
    }

    /// Planck 2015 (TT,TE,EE+lowP+lensing+ext) background parameters.
    pub fn planck15() -> Self {
        Self::new(67.74, 0.3075)
    }

    /// `c / H0` in Mpc.
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT_KM_S / self.hubble_constant
    }

    /// Dimensionless Hubble parameter `E(z) = H(z) / H0`.
    pub fn efunc(&self, redshift: f64) -> f64 {
        (self.omega_m * (1.0 + redshift).powi(3) + (1.0 - self.omega_m)).sqrt()
    }

    /// Line-of-sight comoving distance to `redshift`, in Mpc.
    pub fn comoving_distance_at(&self, redshift: f64) -> f64 {
        if redshift <= 0.0 {
            return 0.0;
        }
        // Composite Simpson rule over [0, z].
        let steps = DISTANCE_INTEGRATION_STEPS;
        let h = redshift / steps as f64;
        let integrand = |z: f64| 1.0 / self.efunc(z);
        let interior: f64 = (1..steps)
            .map(|k| {
                let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
                weight * integrand(k as f64 * h)
            })
            .sum();
        let integral = h / 3.0 * (integrand(0.0) + interior + integrand(redshift));
        self.hubble_distance() * integral
    }

    /// Comoving distances in Mpc, evaluated through `backend`.
    pub fn comoving_distance(
        &self,
        backend: &dyn ArrayBackend,
        redshifts: ArrayView1<f64>,
    ) -> Array1<f64> {
        backend.map(redshifts, &|z| self.comoving_distance_at(z))
    }

    /// All-sky differential comoving volume `dVc/dz` in Gpc^3.
    pub fn differential_comoving_volume(
        &self,
        backend: &dyn ArrayBackend,
        redshifts: ArrayView1<f64>,
    ) -> Array1<f64> {
        let hubble_distance = self.hubble_distance();
        let mut volume = self.comoving_distance(backend, redshifts);
        Zip::from(&mut volume).and(redshifts).for_each(|v, &z| {
            *v = 4.0 * PI * hubble_distance * *v * *v / self.efunc(z) / MPC3_PER_GPC3;
        });
        volume
    }
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self::planck15()
    }
}

/// The redshift normalisation grid and its tabulated volume element.
#[derive(Debug, Clone)]
pub struct RedshiftVolume {
    z_max: f64,
    zs: Array1<f64>,
    dvc_dz: Array1<f64>,
}

impl RedshiftVolume {
    pub fn new(
        backend: &dyn ArrayBackend,
        z_max: f64,
        cosmology: &FlatLambdaCdm,
    ) -> Result<Self, DensityError> {
        if !(z_max > REDSHIFT_GRID_MINIMUM) || !z_max.is_finite() {
            return Err(DensityError::InvalidMaximumRedshift(z_max));
        }
        let zs = backend.linspace(REDSHIFT_GRID_MINIMUM, z_max, REDSHIFT_GRID_POINTS);
        let dvc_dz = cosmology.differential_comoving_volume(backend, zs.view());
        Ok(Self { z_max, zs, dvc_dz })
    }

    pub fn z_max(&self) -> f64 {
        self.z_max
    }

    pub fn zs(&self) -> ArrayView1<'_, f64> {
        self.zs.view()
    }

    pub fn dvc_dz(&self) -> ArrayView1<'_, f64> {
        self.dvc_dz.view()
    }

    /// Linear interpolation of the tabulated `dVc/dz`; zero off the grid.
    pub fn dvc_dz_at(&self, backend: &dyn ArrayBackend, redshift: ArrayView1<f64>) -> Array1<f64> {
        let zs = self.zs.as_slice().unwrap_or(&[]);
        let dvc_dz = self.dvc_dz.as_slice().unwrap_or(&[]);
        let n = zs.len();
        backend.map(redshift, &|z| {
            if n < 2 || z < zs[0] || z > zs[n - 1] {
                return 0.0;
            }
            let upper = zs.partition_point(|&g| g <= z).clamp(1, n - 1);
            let lower = upper - 1;
            let fraction = (z - zs[lower]) / (zs[upper] - zs[lower]);
            dvc_dz[lower] + fraction * (dvc_dz[upper] - dvc_dz[lower])
        })
    }
}
