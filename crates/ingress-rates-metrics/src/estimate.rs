//! Rate estimation with exponential smoothing.
//!
//! ```text
//! raw      = Σ deltas(service) / elapsed_secs
//! smoothed = old - old/N + raw/N        (old rate known)
//! smoothed = raw                        (first rate for the service)
//! ```
//!
//! `elapsed_secs` is the wall-clock gap between the two totals snapshots,
//! not the nominal poll interval, so late or missed cycles stay accurate.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use tracing::debug;

use ingress_rates_core::{RateKey, RateSnapshot, TotalsSnapshot};

use crate::aggregate::{Deltas, aggregate_deltas};

/// Outcome of estimating one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate {
    Rates(RateSnapshot),
    /// The snapshots share a capture instant (or the clock went backwards);
    /// no rate can be derived and previous state must be kept.
    Skipped,
}

/// One smoothing step.
pub fn smooth(old: f64, raw: f64, window: NonZeroU32) -> f64 {
    let n = f64::from(window.get());
    old - old / n + raw / n
}

/// Estimate new smoothed rates from two consecutive totals snapshots.
pub fn estimate(
    new: &TotalsSnapshot,
    old: &TotalsSnapshot,
    old_rates: Option<&RateSnapshot>,
    window: NonZeroU32,
) -> Estimate {
    let elapsed = match new.captured_at.duration_since(old.captured_at) {
        Ok(elapsed) if !elapsed.is_zero() => elapsed,
        _ => {
            debug!("no wall-clock time elapsed between snapshots; skipping estimate");
            return Estimate::Skipped;
        }
    };

    let deltas = aggregate_deltas(new, old);
    if !deltas.resets.is_empty() {
        debug!(resets = deltas.resets.len(), "counter resets excluded from this cycle");
    }

    let mut rates = rates_from_deltas(&deltas, elapsed, old_rates, window);

    // Services still reported but without a comparable endpoint this cycle
    // (all restarted or all new) keep their previous rate.
    if let Some(previous) = old_rates {
        for key in new.totals.keys().map(|k| k.rate_key()) {
            if rates.contains_key(&key) {
                continue;
            }
            if let Some(rate) = previous.get(&key) {
                rates.insert(key, rate);
            }
        }
    }

    Estimate::Rates(RateSnapshot::new(rates, new.captured_at))
}

/// Turn per-service delta sums into smoothed rates.
pub fn rates_from_deltas(
    deltas: &Deltas,
    elapsed: Duration,
    old_rates: Option<&RateSnapshot>,
    window: NonZeroU32,
) -> HashMap<RateKey, f64> {
    let secs = elapsed.as_secs_f64();
    deltas
        .sums
        .iter()
        .map(|(key, &sum)| {
            let raw = sum as f64 / secs;
            let rate = match old_rates.and_then(|r| r.get(key)) {
                Some(old) => smooth(old, raw, window),
                None => raw,
            };
            (key.clone(), rate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_rates_core::TotalKey;
    use std::time::SystemTime;

    fn n(v: u32) -> NonZeroU32 {
        NonZeroU32::new(v).unwrap()
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn totals(entries: &[(&str, &str, u64)], secs: u64) -> TotalsSnapshot {
        TotalsSnapshot::new(
            entries
                .iter()
                .map(|(pod, svc, v)| (TotalKey::new(*pod, "default", *svc), *v))
                .collect(),
            at(secs),
        )
    }

    fn rates(entries: &[(&str, f64)]) -> RateSnapshot {
        RateSnapshot::new(
            entries
                .iter()
                .map(|(svc, r)| (RateKey::new("default", *svc), *r))
                .collect(),
            at(0),
        )
    }

    fn unwrap_rates(estimate: Estimate) -> RateSnapshot {
        match estimate {
            Estimate::Rates(r) => r,
            Estimate::Skipped => panic!("expected rates"),
        }
    }

    #[test]
    fn smoothing_truncates_to_21() {
        let smoothed = smooth(20.0, 25.0, n(3));
        assert_eq!(smoothed.trunc() as i64, 21);
    }

    #[test]
    fn window_of_one_is_instantaneous() {
        assert_eq!(smooth(100.0, 7.0, n(1)), 7.0);
    }

    #[test]
    fn two_pods_twenty_seconds() {
        let old = totals(&[("pod1", "foo", 1000), ("pod2", "foo", 3000)], 100);
        let new = totals(&[("pod1", "foo", 1060), ("pod2", "foo", 3180)], 120);
        let snap = unwrap_rates(estimate(&new, &old, None, n(6)));
        assert_eq!(snap.get(&RateKey::new("default", "foo")), Some(12.0));
        assert_eq!(snap.captured_at, at(120));
    }

    #[test]
    fn first_rate_is_not_smoothed() {
        let old = totals(&[("pod1", "foo", 0)], 0);
        let new = totals(&[("pod1", "foo", 600)], 60);
        let previous = rates(&[("bar", 3.0)]);
        let snap = unwrap_rates(estimate(&new, &old, Some(&previous), n(3)));
        assert_eq!(snap.get(&RateKey::new("default", "foo")), Some(10.0));
    }

    #[test]
    fn known_rate_is_smoothed() {
        let old = totals(&[("pod1", "foo", 0)], 0);
        let new = totals(&[("pod1", "foo", 1500)], 60);
        let previous = rates(&[("foo", 20.0)]);
        let snap = unwrap_rates(estimate(&new, &old, Some(&previous), n(3)));
        let rate = snap.get(&RateKey::new("default", "foo")).unwrap();
        assert!((rate - (20.0 - 20.0 / 3.0 + 25.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn actual_elapsed_time_is_used() {
        // A late cycle: 40s instead of a nominal 20s.
        let old = totals(&[("pod1", "foo", 0)], 0);
        let new = totals(&[("pod1", "foo", 400)], 40);
        let snap = unwrap_rates(estimate(&new, &old, None, n(1)));
        assert_eq!(snap.get(&RateKey::new("default", "foo")), Some(10.0));
    }

    #[test]
    fn zero_elapsed_is_skipped() {
        let old = totals(&[("pod1", "foo", 10)], 50);
        let new = totals(&[("pod1", "foo", 10)], 50);
        assert_eq!(estimate(&new, &old, None, n(3)), Estimate::Skipped);
    }

    #[test]
    fn clock_going_backwards_is_skipped() {
        let old = totals(&[("pod1", "foo", 10)], 50);
        let new = totals(&[("pod1", "foo", 20)], 40);
        assert_eq!(estimate(&new, &old, None, n(3)), Estimate::Skipped);
    }

    #[test]
    fn reset_only_service_keeps_previous_rate() {
        let old = totals(&[("pod1", "foo", 5000)], 0);
        let new = totals(&[("pod1", "foo", 12)], 20);
        let previous = rates(&[("foo", 8.0)]);
        let snap = unwrap_rates(estimate(&new, &old, Some(&previous), n(3)));
        assert_eq!(snap.get(&RateKey::new("default", "foo")), Some(8.0));
    }

    #[test]
    fn vanished_service_is_dropped() {
        let old = totals(&[("pod1", "foo", 10), ("pod1", "bar", 10)], 0);
        let new = totals(&[("pod1", "foo", 30)], 20);
        let previous = rates(&[("foo", 1.0), ("bar", 5.0)]);
        let snap = unwrap_rates(estimate(&new, &old, Some(&previous), n(1)));
        assert_eq!(snap.get(&RateKey::new("default", "foo")), Some(1.0));
        assert_eq!(snap.get(&RateKey::new("default", "bar")), None);
    }

    #[test]
    fn empty_cycle_yields_empty_rates() {
        let old = totals(&[("pod1", "foo", 10)], 0);
        let new = totals(&[], 20);
        let previous = rates(&[("foo", 4.0)]);
        let snap = unwrap_rates(estimate(&new, &old, Some(&previous), n(3)));
        assert!(snap.is_empty());
    }

    #[test]
    fn zero_traffic_is_a_found_zero() {
        let old = totals(&[("pod1", "foo", 42)], 0);
        let new = totals(&[("pod1", "foo", 42)], 20);
        let snap = unwrap_rates(estimate(&new, &old, None, n(3)));
        assert_eq!(snap.get(&RateKey::new("default", "foo")), Some(0.0));
    }
}
