//! Node-based spline shape functions.
//!
//! A [`NodeSpline`] describes an unnormalized density `exp(f(x))` where `f` is
//! interpolated through a set of nodes whose locations and values are
//! themselves hyper-parameters. For a parameter named `redshift` the node
//! locations are read from `redshift0, redshift1, ...` and the node values from
//! `fredshift0, fredshift1, ...`. When regularization is enabled the values are
//! scaled by `rmsredshift`, which lets a sampler shrink the spline toward a flat
//! (identity) shape.
//!
//! The number of nodes may itself be searched over: only the leading nodes for
//! which both a location and a value are supplied take part in the fit.

use crate::backend::ArrayBackend;
use crate::error::DensityError;
use crate::params::HyperParameters;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Fewest nodes that define a spline.
pub const MIN_NODES: usize = 2;

/// The interpolation scheme used between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationKind {
    /// Piecewise-linear interpolation.
    Linear,
    /// Natural cubic spline (zero second derivative at both end nodes).
    #[default]
    Cubic,
}

/// Node locations and values resolved from a hyper-parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineNodes {
    pub locations: Array1<f64>,
    pub values: Array1<f64>,
}

/// Key layout and interpolation settings for one spline-shaped parameter.
#[derive(Debug, Clone)]
pub struct NodeSpline {
    minimum: f64,
    maximum: f64,
    kind: InterpolationKind,
    log_nodes: bool,
    regularize: bool,
    xkeys: Vec<String>,
    fkeys: Vec<String>,
    rms_key: String,
}

impl NodeSpline {
    pub fn new(
        parameter: &str,
        minimum: f64,
        maximum: f64,
        nodes: usize,
        kind: InterpolationKind,
        log_nodes: bool,
        regularize: bool,
    ) -> Result<Self, DensityError> {
        if nodes < MIN_NODES {
            return Err(DensityError::TooFewNodes {
                required: MIN_NODES,
                found: nodes,
            });
        }
        if !(minimum < maximum) {
            return Err(DensityError::InvalidSupport(minimum, maximum));
        }
        Ok(Self {
            minimum,
            maximum,
            kind,
            log_nodes,
            regularize,
            xkeys: (0..nodes).map(|ii| format!("{parameter}{ii}")).collect(),
            fkeys: (0..nodes).map(|ii| format!("f{parameter}{ii}")).collect(),
            rms_key: format!("rms{parameter}"),
        })
    }

    /// Node location keys, then node value keys, then the regularization key
    /// if enabled.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.xkeys.iter().chain(&self.fkeys).cloned().collect();
        if self.regularize {
            names.push(self.rms_key.clone());
        }
        names
    }

    /// The configured maximum number of nodes.
    pub fn max_nodes(&self) -> usize {
        self.xkeys.len()
    }

    pub fn support(&self) -> (f64, f64) {
        (self.minimum, self.maximum)
    }

    pub fn kind(&self) -> InterpolationKind {
        self.kind
    }

    /// Counts the leading nodes for which both a location and a value are present.
    pub fn infer_n_nodes(&self, parameters: &HyperParameters) -> Result<usize, DensityError> {
        let found = self
            .xkeys
            .iter()
            .zip(&self.fkeys)
            .take_while(|(x, f)| parameters.contains_key(x) && parameters.contains_key(f))
            .count();
        if found < MIN_NODES {
            return Err(DensityError::TooFewNodes {
                required: MIN_NODES,
                found,
            });
        }
        log::debug!("Inferred {found} active spline nodes out of {}", self.max_nodes());
        Ok(found)
    }

    /// Reads the active node locations and (regularized) values.
    pub fn nodes_from(&self, parameters: &HyperParameters) -> Result<SplineNodes, DensityError> {
        let n_nodes = self.infer_n_nodes(parameters)?;
        let locations = self.xkeys[..n_nodes]
            .iter()
            .map(|key| parameters.require(key))
            .collect::<Result<Array1<f64>, _>>()?;
        let mut values = self.fkeys[..n_nodes]
            .iter()
            .map(|key| parameters.require(key))
            .collect::<Result<Array1<f64>, _>>()?;
        if self.regularize {
            values *= parameters.require(&self.rms_key)?;
        }
        Ok(SplineNodes { locations, values })
    }

    /// Evaluates `exp(f(x))` at `data`, zero outside the node span and outside
    /// the spline's declared support.
    pub fn p_x_unnormed(
        &self,
        backend: &dyn ArrayBackend,
        data: ArrayView1<f64>,
        nodes: &SplineNodes,
    ) -> Result<Array1<f64>, DensityError> {
        let interpolant = self.interpolant(nodes)?;
        let first = nodes.locations[0];
        let last = nodes.locations[nodes.locations.len() - 1];
        let low = first.max(self.minimum);
        let high = last.min(self.maximum);
        let log_nodes = self.log_nodes;
        Ok(backend.map(data, &|v| {
            if v < low || v > high {
                return 0.0;
            }
            let coordinate = if log_nodes { v.ln() } else { v };
            interpolant.evaluate(coordinate).exp()
        }))
    }

    fn interpolant(&self, nodes: &SplineNodes) -> Result<Interpolant, DensityError> {
        let found = nodes.locations.len().min(nodes.values.len());
        if found < MIN_NODES || nodes.locations.len() != nodes.values.len() {
            return Err(DensityError::TooFewNodes {
                required: MIN_NODES,
                found,
            });
        }
        if let Some((index, (previous, value))) = nodes
            .locations
            .iter()
            .copied()
            .tuple_windows()
            .enumerate()
            .find(|(_, (previous, value))| value < previous)
        {
            return Err(DensityError::UnorderedNodes {
                index: index + 1,
                value,
                previous,
            });
        }
        let knots = if self.log_nodes {
            if let Some(&bad) = nodes.locations.iter().find(|&&x| !(x > 0.0)) {
                return Err(DensityError::NonPositiveLogNode(bad));
            }
            nodes.locations.mapv(f64::ln)
        } else {
            nodes.locations.clone()
        };
        Ok(Interpolant::new(knots.view(), nodes.values.view(), self.kind))
    }
}

/// Piecewise-cubic interpolant in second-derivative form. Linear interpolation
/// is the special case with all second derivatives zero.
#[derive(Debug, Clone)]
struct Interpolant {
    knots: Vec<f64>,
    values: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl Interpolant {
    /// `knots` must be sorted. Repeated knots collapse onto a single node
    /// carrying the last value supplied for that location.
    fn new(knots: ArrayView1<f64>, values: ArrayView1<f64>, kind: InterpolationKind) -> Self {
        let mut xs: Vec<f64> = Vec::with_capacity(knots.len());
        let mut ys: Vec<f64> = Vec::with_capacity(values.len());
        for (&x, &y) in knots.iter().zip(values.iter()) {
            match xs.last() {
                Some(&prev) if prev == x => {
                    if let Some(slot) = ys.last_mut() {
                        *slot = y;
                    }
                }
                _ => {
                    xs.push(x);
                    ys.push(y);
                }
            }
        }

        let second_derivatives = match kind {
            InterpolationKind::Linear => vec![0.0; xs.len()],
            InterpolationKind::Cubic => natural_second_derivatives(&xs, &ys),
        };

        Self {
            knots: xs,
            values: ys,
            second_derivatives,
        }
    }

    fn evaluate(&self, x: f64) -> f64 {
        let n = self.knots.len();
        if n == 1 {
            return self.values[0];
        }
        let upper = self.knots.partition_point(|&k| k <= x).clamp(1, n - 1);
        let lower = upper - 1;
        let h = self.knots[upper] - self.knots[lower];
        let a = (self.knots[upper] - x) / h;
        let b = 1.0 - a;
        a * self.values[lower]
            + b * self.values[upper]
            + ((a.powi(3) - a) * self.second_derivatives[lower]
                + (b.powi(3) - b) * self.second_derivatives[upper])
                * h
                * h
                / 6.0
    }
}

/// Solves the tridiagonal system for the second derivatives of a natural cubic
/// spline through strictly increasing `xs`.
fn natural_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    // Thomas algorithm over the interior nodes 1..n-1.
    let interior = n - 2;
    let mut diag = vec![0.0; interior];
    let mut upper = vec![0.0; interior];
    let mut rhs = vec![0.0; interior];
    for k in 0..interior {
        let i = k + 1;
        let h_left = xs[i] - xs[i - 1];
        let h_right = xs[i + 1] - xs[i];
        diag[k] = 2.0 * (h_left + h_right);
        upper[k] = h_right;
        rhs[k] = 6.0 * ((ys[i + 1] - ys[i]) / h_right - (ys[i] - ys[i - 1]) / h_left);
    }
    for k in 1..interior {
        let lower = xs[k + 1] - xs[k];
        let factor = lower / diag[k - 1];
        diag[k] -= factor * upper[k - 1];
        rhs[k] -= factor * rhs[k - 1];
    }
    m[interior] = rhs[interior - 1] / diag[interior - 1];
    for k in (0..interior - 1).rev() {
        m[k + 1] = (rhs[k] - upper[k] * m[k + 2]) / diag[k];
    }
    m
}
