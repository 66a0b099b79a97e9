//! One fetch → parse → aggregate → estimate pass, and the state carried
//! between passes.
//!
//! `Pipeline` is the explicit context object owned by the poller: the
//! previous totals baseline and the rate store both live here, replaced by
//! atomic `Arc` swaps rather than mutated in place.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use ingress_rates_core::config::ParserConfig;
use ingress_rates_core::{
    EndpointId, EndpointSample, ParsePolicy, RateSnapshot, TotalsSnapshot,
};
use ingress_rates_scrape::{FetchFailure, FetchOutcome, LineParser, ParseError, ScrapeError};

use crate::aggregate::total_requests;
use crate::estimate::{Estimate, estimate};
use crate::store::RateStore;

/// What a pass did with the rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// No previous totals: this cycle only establishes a baseline.
    Reference,
    /// New rates were published.
    Estimated,
    /// No time elapsed since the baseline; nothing changed.
    Skipped,
}

/// Summary of one pass, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub kind: CycleKind,
    /// Endpoints whose body was fetched and accepted.
    pub endpoints: usize,
    /// Endpoints dropped this cycle, rejected bodies included.
    pub fetch_failures: usize,
    /// Bodies rejected by the strict parse policy.
    pub rejected: usize,
    /// Ids of the dropped endpoints, sorted.
    pub excluded: Vec<EndpointId>,
    pub totals: usize,
    pub services: usize,
}

pub struct Pipeline {
    parser: LineParser,
    policy: ParsePolicy,
    counter: String,
    window: NonZeroU32,
    previous: ArcSwapOption<TotalsSnapshot>,
    rates: Arc<RateStore>,
}

impl Pipeline {
    pub fn new(
        parser_config: &ParserConfig,
        window: NonZeroU32,
        rates: Arc<RateStore>,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            parser: LineParser::new(&parser_config.metric_prefix)?,
            policy: parser_config.policy,
            counter: parser_config.counter.clone(),
            window,
            previous: ArcSwapOption::empty(),
            rates,
        })
    }

    pub fn rates(&self) -> &Arc<RateStore> {
        &self.rates
    }

    /// Totals from the last pass that advanced the baseline.
    pub fn previous_totals(&self) -> Option<Arc<TotalsSnapshot>> {
        self.previous.load_full()
    }

    /// Parse every fetched body. A body rejected under the strict policy
    /// moves into `outcome.failures`, same as a failed fetch.
    fn parse_bodies(
        &self,
        outcome: &mut FetchOutcome,
    ) -> (HashMap<EndpointId, Vec<EndpointSample>>, usize) {
        let mut samples = HashMap::with_capacity(outcome.bodies.len());
        let mut rejected = 0;
        for (endpoint, body) in outcome.bodies.drain() {
            match self.parser.parse_exposition(&body, self.policy) {
                Ok(parsed) => {
                    samples.insert(endpoint, parsed);
                }
                Err(e) => {
                    let failure = FetchFailure {
                        endpoint,
                        error: ScrapeError::Parse(e),
                    };
                    warn!(
                        endpoint = %failure.endpoint,
                        error = %failure.error,
                        "endpoint excluded this cycle"
                    );
                    outcome.failures.push(failure);
                    rejected += 1;
                }
            }
        }
        (samples, rejected)
    }

    /// Process one fetch outcome whose counters were read at `captured_at`.
    pub fn process(&self, mut outcome: FetchOutcome, captured_at: SystemTime) -> CycleReport {
        let (samples, rejected) = self.parse_bodies(&mut outcome);
        let totals = total_requests(&samples, &self.counter, captured_at);

        let mut excluded: Vec<EndpointId> =
            outcome.failures.iter().map(|f| f.endpoint.clone()).collect();
        excluded.sort_unstable();

        let mut report = CycleReport {
            kind: CycleKind::Reference,
            endpoints: samples.len(),
            fetch_failures: outcome.failures.len(),
            rejected,
            excluded,
            totals: totals.len(),
            services: 0,
        };

        let Some(old) = self.previous.load_full() else {
            warn!("no previous metrics available; this cycle is the reference sample");
            self.previous.store(Some(Arc::new(totals)));
            self.rates.publish(RateSnapshot::empty(captured_at));
            return report;
        };

        let old_rates = self.rates.snapshot();
        match estimate(&totals, &old, old_rates.as_deref(), self.window) {
            Estimate::Rates(snapshot) => {
                report.kind = CycleKind::Estimated;
                report.services = snapshot.len();
                self.previous.store(Some(Arc::new(totals)));
                self.rates.publish(snapshot);
            }
            Estimate::Skipped => {
                report.kind = CycleKind::Skipped;
                report.services = old_rates.map(|r| r.len()).unwrap_or(0);
                debug!("cycle skipped; keeping previous baseline and rates");
            }
        }

        if report.endpoints == 0 {
            warn!(
                discovered = outcome.discovered,
                failures = report.fetch_failures,
                rejected,
                "cycle produced no data"
            );
        } else {
            info!(
                endpoints = report.endpoints,
                failures = report.fetch_failures,
                rejected,
                services = report.services,
                "rates updated"
            );
        }
        report
    }
}
