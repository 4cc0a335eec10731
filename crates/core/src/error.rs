//! Error types for geokrig

use thiserror::Error;

/// Main error type for geokrig operations
///
/// Every failure of the estimation pipeline maps to exactly one variant.
/// Nothing is retried internally; the caller fixes the input and reruns.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid call-site parameters or unusable input data
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Normalizer domain violation
    #[error("Numeric error: {0}")]
    Numeric(String),

    /// Covariance model fitting did not reach valid parameters
    #[error("Fit error: {0}")]
    Fit(String),

    /// The kriging linear system is numerically singular
    #[error("Singular kriging system: {0}")]
    SingularSystem(String),
}

impl Error {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Error::Numeric(_))
    }

    pub fn is_fit(&self) -> bool {
        matches!(self, Error::Fit(_))
    }

    pub fn is_singular(&self) -> bool {
        matches!(self, Error::SingularSystem(_))
    }
}

/// Result type alias for geokrig operations
pub type Result<T> = std::result::Result<T, Error>;
