//! Error types shared across ingress-rates crates.

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Caller-facing errors from the rate query accessor.
///
/// "Not ready" and "not found" are distinct from a zero rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("metric {metric} for resource {resource} is not provided by this adapter")]
    UnsupportedMetric { resource: String, metric: String },

    #[error("no metrics collected (yet)")]
    NotReady,

    #[error("no request rate recorded for service {name} in namespace {namespace}")]
    NotFound { namespace: String, name: String },
}
