//! Error types for JM separability computation.

use thiserror::Error;

/// Which covariance matrix failed the non-singularity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceRole {
    /// The averaged matrix `(covA + covB) / 2`.
    Pooled,
    ClassA,
    ClassB,
}

impl std::fmt::Display for CovarianceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CovarianceRole::Pooled => write!(f, "averaged"),
            CovarianceRole::ClassA => write!(f, "first class"),
            CovarianceRole::ClassB => write!(f, "second class"),
        }
    }
}

/// Main error type for separability operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("exactly two category values are required, got {found}")]
    InvalidCategoryCount { found: usize },

    #[error("invalid category value '{value}': expected an integer category code")]
    InvalidCategory { value: String },

    #[error("at least one base layer is required")]
    NoBaseLayers,

    #[error("category {category} selects no cells of base layer <{layer}>")]
    EmptyClass { category: i64, layer: String },

    #[error(
        "{role} covariance matrix is singular (log-determinant {log_determinant}); \
         the bands may be collinear within the classes"
    )]
    SingularCovariance { role: CovarianceRole, log_determinant: f64 },

    #[error("{what}: expected {expected}, got {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("non-finite value in {what}")]
    NonFiniteStatistic { what: &'static str },

    #[error("raster engine command `{command}` failed: {message}")]
    Engine { command: String, message: String },

    #[error("cannot parse output of `{command}`: {line:?}")]
    EngineOutput { command: String, line: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scene: {0}")]
    Scene(#[from] serde_json::Error),
}

/// Result type alias for separability operations
pub type Result<T> = std::result::Result<T, Error>;
