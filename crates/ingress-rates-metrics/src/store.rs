//! Rate store holding the latest published `RateSnapshot`.
//!
//! Readers load an `Arc` to a complete snapshot; the poller publishes by a
//! single pointer swap, so a reader never sees a mix of two cycles.

use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;

use ingress_rates_core::{RateKey, RateSnapshot};

#[derive(Debug, Default)]
pub struct RateStore {
    current: ArcSwapOption<RateSnapshot>,
}

impl RateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: RateSnapshot) {
        self.current.store(Some(Arc::new(snapshot)));
    }

    /// The current snapshot, if any cycle has completed.
    pub fn snapshot(&self) -> Option<Arc<RateSnapshot>> {
        self.current.load_full()
    }

    /// Whether at least one cycle has been published.
    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// Rate for one service. `None` covers both "not ready" and "unknown
    /// service"; use [`snapshot`](Self::snapshot) to tell them apart.
    pub fn get_rate(&self, namespace: &str, service: &str) -> Option<f64> {
        let key = RateKey::new(namespace, service);
        self.snapshot().and_then(|snap| snap.get(&key))
    }

    /// Capture instant of the current snapshot.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.snapshot().map(|snap| snap.captured_at)
    }
}
