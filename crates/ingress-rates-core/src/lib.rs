//! ingress-rates-core: shared model for the ingress-rates pipeline.
//!
//! Defines the per-endpoint and per-service keys, the immutable snapshots
//! handed between pipeline stages, configuration, and error types.
//!
//! # Data flow
//!
//! ```text
//! EndpointSample (one exposition line)
//!   └── summed per (endpoint, namespace, service) → TotalsSnapshot
//!         └── diffed against previous totals, per (namespace, service)
//!               └── smoothed rate → RateSnapshot
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ParsePolicy};
pub use error::{ConfigError, ConfigResult, QueryError};
pub use types::*;
