//! Exposition text parser for upstream counters.
//!
//! Recognised lines look like
//!
//! ```text
//! nginx_upstream_requests_total{ingress_class="nginx",upstream="default-foo-bar-80"} 4.591337e+06
//! ```
//!
//! The `upstream` label value is split as `namespace-service-port`: the
//! namespace ends at the first hyphen, the port is the digits after the last
//! hyphen, and the service is everything in between (it may itself contain
//! hyphens). Comments, other metric families, and lines without a
//! well-formed `upstream` label are not errors; they yield `None`.

use regex::Regex;
use tracing::debug;

use ingress_rates_core::{EndpointSample, ParsePolicy};

use crate::error::ParseError;

/// Line parser bound to one metric family prefix.
#[derive(Debug, Clone)]
pub struct LineParser {
    line_re: Regex,
    upstream_re: Regex,
}

impl LineParser {
    /// `prefix` must be a metric name prefix: ASCII letters, digits, `_`
    /// and `:`, not starting with a digit.
    pub fn new(prefix: &str) -> Result<Self, ParseError> {
        if !is_metric_prefix(prefix) {
            return Err(ParseError::Pattern(format!(
                "{prefix:?} is not a metric name prefix"
            )));
        }
        let line_re = Regex::new(&format!(
            r"^{}([A-Za-z0-9_:]+)\{{([^}}]*)\}}\s+(\S+)(?:\s+-?\d+)?\s*$",
            regex::escape(prefix)
        ))
        .map_err(|e| ParseError::Pattern(e.to_string()))?;
        let upstream_re = Regex::new(r#"(?:^|,)\s*upstream="([^"]*)""#)
            .map_err(|e| ParseError::Pattern(e.to_string()))?;
        Ok(Self {
            line_re,
            upstream_re,
        })
    }

    /// Parse one line.
    ///
    /// Returns `Ok(None)` for anything that is not an upstream sample, and
    /// `Err(InvalidValue)` when the line is an upstream sample whose value
    /// cannot be read as a counter.
    pub fn parse_line(&self, line: &str) -> Result<Option<EndpointSample>, ParseError> {
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') {
            return Ok(None);
        }
        let Some(caps) = self.line_re.captures(line) else {
            return Ok(None);
        };
        let Some(upstream) = self.upstream_re.captures(&caps[2]) else {
            return Ok(None);
        };
        let Some((namespace, service, port)) = split_upstream(&upstream[1]) else {
            return Ok(None);
        };
        let value = parse_counter(&caps[3])?;

        Ok(Some(EndpointSample {
            kind: caps[1].to_string(),
            namespace: namespace.to_string(),
            service: service.to_string(),
            port: port.to_string(),
            value,
        }))
    }

    /// Parse a whole scraped body.
    ///
    /// Under [`ParsePolicy::Strict`] the first malformed counter rejects the
    /// body. Under [`ParsePolicy::Skip`] malformed lines are dropped.
    pub fn parse_exposition(
        &self,
        text: &str,
        policy: ParsePolicy,
    ) -> Result<Vec<EndpointSample>, ParseError> {
        let mut samples = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in text.lines().enumerate() {
            match self.parse_line(line) {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => {}
                Err(ParseError::InvalidValue { value }) => match policy {
                    ParsePolicy::Strict => {
                        return Err(ParseError::Malformed {
                            line: idx + 1,
                            value,
                        });
                    }
                    ParsePolicy::Skip => {
                        debug!(line = idx + 1, %value, "skipping malformed counter line");
                        skipped += 1;
                    }
                },
                Err(e) => return Err(e),
            }
        }

        if skipped > 0 {
            debug!(skipped, parsed = samples.len(), "exposition parsed with skipped lines");
        }
        Ok(samples)
    }
}

fn is_metric_prefix(prefix: &str) -> bool {
    !prefix.starts_with(|c: char| c.is_ascii_digit())
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Split an `upstream` label value into `(namespace, service, port)`.
pub fn split_upstream(value: &str) -> Option<(&str, &str, &str)> {
    let (namespace, rest) = value.split_once('-')?;
    let (service, port) = rest.rsplit_once('-')?;
    if namespace.is_empty() || service.is_empty() || port.is_empty() {
        return None;
    }
    if !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((namespace, service, port))
}

/// Read a counter value: floating point text (scientific notation allowed)
/// truncated toward zero.
fn parse_counter(text: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidValue {
        value: text.to_string(),
    };
    let value: f64 = text.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 || value >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(value.trunc() as u64)
}
