//! Domain types shared by the scrape, aggregation, and query stages.
//!
//! Snapshots are immutable once built. The poller replaces them whole
//! (behind an `Arc`) rather than mutating individual entries, so a reader
//! always sees one consistent cycle.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Identifier of one scraped endpoint (a pod IP, or `ip:port`).
pub type EndpointId = String;

// ── Samples ────────────────────────────────────────────────────────

/// One parsed exposition line for an upstream.
///
/// `value` is the cumulative counter as reported by the source process
/// since its own start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSample {
    /// Metric name with the family prefix stripped, e.g. `requests_total`.
    pub kind: String,
    pub namespace: String,
    pub service: String,
    pub port: String,
    pub value: u64,
}

// ── Keys ───────────────────────────────────────────────────────────

/// One endpoint's cumulative counter for one logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TotalKey {
    pub endpoint: EndpointId,
    pub namespace: String,
    pub service: String,
}

impl TotalKey {
    pub fn new(
        endpoint: impl Into<EndpointId>,
        namespace: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: namespace.into(),
            service: service.into(),
        }
    }

    /// The service-level key this endpoint counter rolls up into.
    pub fn rate_key(&self) -> RateKey {
        RateKey {
            namespace: self.namespace.clone(),
            service: self.service.clone(),
        }
    }
}

/// A logical service, summed across every endpoint serving it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateKey {
    pub namespace: String,
    pub service: String,
}

impl RateKey {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.service)
    }
}

// ── Snapshots ──────────────────────────────────────────────────────

/// Per-endpoint cumulative totals captured at one poll instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalsSnapshot {
    pub totals: HashMap<TotalKey, u64>,
    /// Wall-clock instant the totals were captured.
    pub captured_at: SystemTime,
}

impl TotalsSnapshot {
    pub fn new(totals: HashMap<TotalKey, u64>, captured_at: SystemTime) -> Self {
        Self {
            totals,
            captured_at,
        }
    }

    /// A snapshot for a cycle that produced no data.
    pub fn empty(captured_at: SystemTime) -> Self {
        Self::new(HashMap::new(), captured_at)
    }

    pub fn get(&self, key: &TotalKey) -> Option<u64> {
        self.totals.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Smoothed per-service request rates (requests per second).
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    pub rates: HashMap<RateKey, f64>,
    pub captured_at: SystemTime,
}

impl RateSnapshot {
    pub fn new(rates: HashMap<RateKey, f64>, captured_at: SystemTime) -> Self {
        Self { rates, captured_at }
    }

    pub fn empty(captured_at: SystemTime) -> Self {
        Self::new(HashMap::new(), captured_at)
    }

    pub fn get(&self, key: &RateKey) -> Option<f64> {
        self.rates.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Entries sorted by key, for stable rendering.
    pub fn sorted(&self) -> Vec<(&RateKey, f64)> {
        let mut entries: Vec<(&RateKey, f64)> = self.rates.iter().map(|(k, v)| (k, *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
