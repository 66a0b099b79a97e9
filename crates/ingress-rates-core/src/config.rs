//! ingress-rates.toml configuration.
//!
//! Every section is optional; defaults match a stock ingress-nginx
//! deployment (`app=ingress-nginx`, port 10254, `/metrics`, 20s polls,
//! six-sample moving average).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub fleet: FleetConfig,
    pub poll: PollConfig,
    pub parser: ParserConfig,
    pub server: ServerConfig,
}

/// Which processes to scrape and where their metrics live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// Fleet selector label; identifies the fleet in logs.
    pub label: String,
    /// Headless service name resolving to one address per fleet member.
    pub dns_name: Option<String>,
    /// Fixed member addresses, used when `dns_name` is unset.
    pub endpoints: Vec<String>,
    pub port: u16,
    pub path: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            label: "app=ingress-nginx".to_string(),
            dns_name: None,
            endpoints: Vec::new(),
            port: 10254,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Poll interval (e.g. "20s").
    pub interval: String,
    /// Upper bound on a single endpoint fetch (e.g. "5s").
    pub fetch_timeout: String,
    /// Samples in the moving-average window; 1 disables smoothing.
    pub moving_samples: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: "20s".to_string(),
            fetch_timeout: "5s".to_string(),
            moving_samples: 6,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.interval).ok_or_else(|| ConfigError::Duration {
            field: "poll.interval",
            value: self.interval.clone(),
        })
    }

    pub fn fetch_timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.fetch_timeout).ok_or_else(|| ConfigError::Duration {
            field: "poll.fetch_timeout",
            value: self.fetch_timeout.clone(),
        })
    }
}

/// What to do with a line whose counter value is not a number.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Reject the whole body of the endpoint for this cycle.
    #[default]
    Strict,
    /// Drop the offending line and keep parsing.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    /// Metric family prefix, stripped to produce the sample kind.
    pub metric_prefix: String,
    /// Sample kind summed into request totals.
    pub counter: String,
    pub policy: ParsePolicy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            metric_prefix: "nginx_upstream_".to_string(),
            counter: "requests_total".to_string(),
            policy: ParsePolicy::Strict,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:6443".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll.moving_samples == 0 {
            return Err(ConfigError::Invalid(
                "poll.moving_samples must be at least 1".into(),
            ));
        }
        if self.poll.interval()?.is_zero() {
            return Err(ConfigError::Invalid("poll.interval must be non-zero".into()));
        }
        if self.poll.fetch_timeout()?.is_zero() {
            return Err(ConfigError::Invalid(
                "poll.fetch_timeout must be non-zero".into(),
            ));
        }
        if !self.fleet.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "fleet.path must start with '/': {:?}",
                self.fleet.path
            )));
        }
        match (&self.fleet.dns_name, self.fleet.endpoints.is_empty()) {
            (Some(_), false) => Err(ConfigError::Invalid(
                "set either fleet.dns_name or fleet.endpoints, not both".into(),
            )),
            (None, true) => Err(ConfigError::Invalid(
                "one of fleet.dns_name or fleet.endpoints is required".into(),
            )),
            _ => Ok(()),
        }?;
        if self.parser.counter.is_empty() {
            return Err(ConfigError::Invalid("parser.counter must not be empty".into()));
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
