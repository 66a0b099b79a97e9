//! Counter aggregation.
//!
//! Collapses parsed samples into per-endpoint totals, then diffs two
//! consecutive totals snapshots into per-service request deltas.

use std::collections::HashMap;
use std::time::SystemTime;

use ingress_rates_core::{EndpointId, EndpointSample, RateKey, TotalKey, TotalsSnapshot};

/// Sum every sample of kind `counter` per `(endpoint, namespace, service)`.
///
/// Several listener ports of one service on one endpoint are summed.
pub fn total_requests(
    samples: &HashMap<EndpointId, Vec<EndpointSample>>,
    counter: &str,
    captured_at: SystemTime,
) -> TotalsSnapshot {
    let mut totals: HashMap<TotalKey, u64> = HashMap::new();
    for (endpoint, endpoint_samples) in samples {
        for sample in endpoint_samples.iter().filter(|s| s.kind == counter) {
            let key = TotalKey::new(endpoint.clone(), &sample.namespace, &sample.service);
            let total = totals.entry(key).or_insert(0);
            *total = total.saturating_add(sample.value);
        }
    }
    TotalsSnapshot::new(totals, captured_at)
}

/// Per-service deltas between two totals snapshots.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Deltas {
    /// Summed delta per service, for services with at least one endpoint
    /// present in both snapshots with a non-decreasing counter.
    pub sums: HashMap<RateKey, u64>,
    /// Endpoint counters that went backwards (process restarts).
    pub resets: Vec<TotalKey>,
}

/// Diff `new` against `old`.
///
/// Only keys present in both snapshots contribute. A key only in `old`
/// (endpoint gone) or only in `new` (endpoint added) is ignored; a key whose
/// counter decreased is a reset and contributes nothing this cycle.
pub fn aggregate_deltas(new: &TotalsSnapshot, old: &TotalsSnapshot) -> Deltas {
    let mut deltas = Deltas::default();
    for (key, &current) in &new.totals {
        let Some(previous) = old.get(key) else {
            continue;
        };
        if current < previous {
            deltas.resets.push(key.clone());
            continue;
        }
        let sum = deltas.sums.entry(key.rate_key()).or_insert(0);
        *sum = sum.saturating_add(current - previous);
    }
    deltas.resets.sort();
    deltas
}
