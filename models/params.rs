use crate::error::DensityError;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A flat mapping from hyper-parameter name to value.
///
/// Keys are namespaced by the model that consumes them (a name prefix and a
/// component index). Serializes as a plain TOML table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperParameters(BTreeMap<String, f64>);

impl HyperParameters {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(key.into(), value)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Looks up `key`, failing with [`DensityError::MissingParameter`].
    pub fn require(&self, key: &str) -> Result<f64, DensityError> {
        self.get(key)
            .ok_or_else(|| DensityError::MissingParameter(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for HyperParameters {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<const N: usize> From<[(&str, f64); N]> for HyperParameters {
    fn from(pairs: [(&str, f64); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Per-event samples for the joint chirp-mass, spin and mass-ratio density.
///
/// All four views have the same length; one entry per sample.
#[derive(Debug, Clone, Copy)]
pub struct BinarySamples<'a> {
    pub chirp_mass: ArrayView1<'a, f64>,
    pub chi_1: ArrayView1<'a, f64>,
    pub chi_2: ArrayView1<'a, f64>,
    pub mass_ratio: ArrayView1<'a, f64>,
}

impl<'a> BinarySamples<'a> {
    pub fn new(
        chirp_mass: ArrayView1<'a, f64>,
        chi_1: ArrayView1<'a, f64>,
        chi_2: ArrayView1<'a, f64>,
        mass_ratio: ArrayView1<'a, f64>,
    ) -> Result<Self, DensityError> {
        let expected = chirp_mass.len();
        for (name, column) in [("chi_1", chi_1), ("chi_2", chi_2), ("mass_ratio", mass_ratio)] {
            if column.len() != expected {
                return Err(DensityError::MismatchedSampleLength {
                    name,
                    found: column.len(),
                    expected,
                });
            }
        }
        Ok(Self {
            chirp_mass,
            chi_1,
            chi_2,
            mass_ratio,
        })
    }

    pub fn len(&self) -> usize {
        self.chirp_mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chirp_mass.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_require_reports_missing_key() {
        let params = HyperParameters::from([("alpha", -2.0)]);
        assert_eq!(params.require("alpha").unwrap(), -2.0);
        assert_eq!(
            params.require("beta").unwrap_err(),
            DensityError::MissingParameter("beta".to_string())
        );
    }

    #[test]
    fn test_builder_and_iteration_order() {
        let params = HyperParameters::new().with("b", 2.0).with("a", 1.0);
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(params.len(), 2);
        assert!(!params.is_empty());
        assert!(params.contains_key("a"));
    }

    #[test]
    fn test_binary_samples_length_check() {
        let mass = array![10.0, 20.0];
        let spins = array![0.1, 0.2];
        let short = array![0.5];
        let err = BinarySamples::new(mass.view(), spins.view(), spins.view(), short.view())
            .unwrap_err();
        assert_eq!(
            err,
            DensityError::MismatchedSampleLength {
                name: "mass_ratio",
                found: 1,
                expected: 2
            }
        );

        let ok = BinarySamples::new(mass.view(), spins.view(), spins.view(), spins.view())
            .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(!ok.is_empty());
    }
}
