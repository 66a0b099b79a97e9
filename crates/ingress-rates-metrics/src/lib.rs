//! ingress-rates-metrics: turns scraped counters into served request rates.
//!
//! # Architecture
//!
//! ```text
//! Poller
//!   ├── tick (first immediately; overlapping ticks dropped)
//!   └── pass: Scrape::fetch_all()
//!         └── Pipeline::process()
//!               ├── LineParser::parse_exposition()   per endpoint body
//!               ├── total_requests()                 → TotalsSnapshot
//!               ├── estimate(new, previous, rates)   → RateSnapshot
//!               └── RateStore::publish()             (atomic swap)
//!
//! RateProvider::get_value() ← query layer
//! render_prometheus()       ← /metrics
//! ```

pub mod aggregate;
pub mod estimate;
pub mod pipeline;
pub mod poller;
pub mod prometheus;
pub mod provider;
pub mod store;

pub use aggregate::{Deltas, aggregate_deltas, total_requests};
pub use estimate::{Estimate, estimate, smooth};
pub use pipeline::{CycleKind, CycleReport, Pipeline};
pub use poller::Poller;
pub use prometheus::render_prometheus;
pub use provider::{METRIC_NAME, MetricInfo, RESOURCE, RateProvider};
pub use store::RateStore;
