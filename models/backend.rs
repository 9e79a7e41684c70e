//! Numeric array backends.
//!
//! Every density model holds one shared [`ArrayBackend`] and routes its
//! sample-axis work through it: element-wise maps, reductions, cumulative
//! products and trapezoidal integration. The backend is chosen once (see
//! [`BackendKind::build`]) and handed to each model as an `Arc`.
//!
//! Two implementations are provided:
//! - [`CpuBackend`] evaluates everything serially on the calling thread.
//! - [`RayonBackend`] splits element-wise maps and sums across the rayon pool
//!   once the array is long enough for the split to pay off.

use ndarray::{Array1, ArrayView1, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Arrays shorter than this are never split across threads by default.
pub const DEFAULT_MIN_PARALLEL_LEN: usize = 4096;

/// Element-wise and reduction operations over one-dimensional sample arrays.
pub trait ArrayBackend: Send + Sync + fmt::Debug {
    /// Short human-readable name, used in logs.
    fn name(&self) -> &'static str;

    /// Applies `f` to every element of `values`.
    fn map(&self, values: ArrayView1<f64>, f: &(dyn Fn(f64) -> f64 + Sync)) -> Array1<f64>;

    /// Sums all elements of `values`.
    fn sum(&self, values: ArrayView1<f64>) -> f64;

    fn exp(&self, values: ArrayView1<f64>) -> Array1<f64> {
        self.map(values, &f64::exp)
    }

    fn clip(&self, value: f64, low: f64, high: f64) -> f64 {
        value.clamp(low, high)
    }

    fn cumprod(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values
            .iter()
            .scan(1.0, |acc, &v| {
                *acc *= v;
                Some(*acc)
            })
            .collect()
    }

    fn cumsum(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values
            .iter()
            .scan(0.0, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect()
    }

    fn linspace(&self, start: f64, end: f64, n: usize) -> Array1<f64> {
        Array1::linspace(start, end, n)
    }

    /// Trapezoidal integral of `y` sampled at `x`.
    ///
    /// # Panics
    /// Panics if `y` and `x` differ in length.
    fn trapz(&self, y: ArrayView1<f64>, x: ArrayView1<f64>) -> f64 {
        assert_eq!(y.len(), x.len(), "trapz requires y and x of equal length");
        if x.len() < 2 {
            return 0.0;
        }
        Zip::from(y.windows(2))
            .and(x.windows(2))
            .fold(0.0, |acc, yw, xw| acc + 0.5 * (xw[1] - xw[0]) * (yw[0] + yw[1]))
    }
}

/// Serial evaluation on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl ArrayBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn map(&self, values: ArrayView1<f64>, f: &(dyn Fn(f64) -> f64 + Sync)) -> Array1<f64> {
        values.mapv(f)
    }

    fn sum(&self, values: ArrayView1<f64>) -> f64 {
        values.sum()
    }
}

/// Data-parallel evaluation on the global rayon pool.
#[derive(Debug, Clone, Copy)]
pub struct RayonBackend {
    min_parallel_len: usize,
}

impl RayonBackend {
    pub fn new(min_parallel_len: usize) -> Self {
        Self { min_parallel_len }
    }

    pub fn min_parallel_len(&self) -> usize {
        self.min_parallel_len
    }
}

impl Default for RayonBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PARALLEL_LEN)
    }
}

impl ArrayBackend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn map(&self, values: ArrayView1<f64>, f: &(dyn Fn(f64) -> f64 + Sync)) -> Array1<f64> {
        if values.len() < self.min_parallel_len {
            return values.mapv(f);
        }
        let mut out = values.to_owned();
        out.par_mapv_inplace(|v| f(v));
        out
    }

    fn sum(&self, values: ArrayView1<f64>) -> f64 {
        match values.as_slice() {
            Some(slice) if slice.len() >= self.min_parallel_len => slice.par_iter().sum(),
            _ => values.sum(),
        }
    }
}

/// Which backend a process should construct. This is part of the TOML
/// evaluation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Serial evaluation.
    #[default]
    Cpu,
    /// Rayon data parallelism with the default split threshold.
    Parallel,
}

impl BackendKind {
    pub fn build(self) -> Arc<dyn ArrayBackend> {
        let backend: Arc<dyn ArrayBackend> = match self {
            BackendKind::Cpu => Arc::new(CpuBackend),
            BackendKind::Parallel => Arc::new(RayonBackend::default()),
        };
        log::debug!("Constructed '{}' array backend", backend.name());
        backend
    }
}
