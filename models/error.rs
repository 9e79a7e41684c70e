use thiserror::Error;

/// A comprehensive error type for evaluating population density models.
///
/// Inadmissible hyper-parameter points that a sampler is expected to wander into
/// (a negative residual mixing weight) are not errors; they evaluate to a zero
/// density instead. Everything here is either a configuration mistake or a
/// parameter value for which the density is undefined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DensityError {
    #[error("Hyper-parameter '{0}' is missing from the supplied parameter set.")]
    MissingParameter(String),

    #[error("Standard deviation must be positive, but was {0}.")]
    NonPositiveSigma(f64),

    #[error("Support is invalid: lower bound ({0}) must be strictly less than upper bound ({1}).")]
    InvalidSupport(f64, f64),

    #[error("Power-law lower bound must be non-negative, but was {0}.")]
    NegativePowerLawMinimum(f64),

    #[error("A reference model was configured without reference parameters.")]
    MissingReferenceParameters,

    #[error("Sample array '{name}' has {found} entries, but {expected} were expected.")]
    MismatchedSampleLength {
        name: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("A spline requires at least {required} nodes, but only {found} were available.")]
    TooFewNodes { required: usize, found: usize },

    #[error("Spline node locations must be non-decreasing, but node {index} ({value}) follows {previous}.")]
    UnorderedNodes {
        index: usize,
        value: f64,
        previous: f64,
    },

    #[error("Log-spaced interpolation requires positive node locations, but found {0}.")]
    NonPositiveLogNode(f64),

    #[error("At least one component is required, but {0} were requested.")]
    InvalidComponentCount(usize),

    #[error("Component {index} does not exist; the model has {count} components.")]
    ComponentOutOfRange { index: usize, count: usize },

    #[error("Maximum redshift must be finite and above the redshift grid floor, but was {0}.")]
    InvalidMaximumRedshift(f64),

    #[error("The {0} model cannot be evaluated on one-dimensional data.")]
    UnsupportedSamples(&'static str),
}
