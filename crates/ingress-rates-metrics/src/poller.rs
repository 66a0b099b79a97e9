//! Poll scheduler. Drives one pipeline pass per tick.
//!
//! The first pass runs immediately. At most one pass runs at a time: a tick
//! (or a `poll_once` call) arriving while a pass is in flight is dropped,
//! not queued. Shutdown is observed at tick boundaries and waits for the
//! in-flight pass.
//!
//! A pass is stamped with the instant it starts, before any fetch, so the
//! elapsed time between passes does not absorb fetch latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use ingress_rates_scrape::Scrape;

use crate::pipeline::{CycleReport, Pipeline};

/// Clears the in-progress flag when a pass ends, however it ends.
struct PassGuard(Arc<AtomicBool>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Poller {
    scraper: Arc<dyn Scrape>,
    pipeline: Arc<Pipeline>,
    interval: Duration,
    in_progress: Arc<AtomicBool>,
}

impl Poller {
    pub fn new(scraper: Arc<dyn Scrape>, pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            scraper,
            pipeline,
            interval,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Whether a pass is currently running.
    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Claim the pass slot, or `None` if a pass is already running.
    fn claim(&self) -> Option<PassGuard> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous pass still running; dropping tick");
            return None;
        }
        Some(PassGuard(self.in_progress.clone()))
    }

    /// Run one pass inline. Returns `None` if a pass is already running.
    pub async fn poll_once(&self) -> Option<CycleReport> {
        let _guard = self.claim()?;
        Some(run_pass(&*self.scraper, &self.pipeline).await)
    }

    /// Start a pass in the background unless one is already running.
    ///
    /// Returns `None` when the tick is dropped because a pass is in flight.
    pub fn try_start_pass(&self) -> Option<JoinHandle<CycleReport>> {
        let guard = self.claim()?;
        let scraper = self.scraper.clone();
        let pipeline = self.pipeline.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            run_pass(&*scraper, &pipeline).await
        }))
    }

    /// Run the poll loop until the shutdown signal changes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "rate poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<CycleReport>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = self.try_start_pass() {
                        in_flight = Some(handle);
                    }
                }
                _ = shutdown.changed() => {
                    info!("rate poller shutting down");
                    break;
                }
            }
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                error!(error = %e, "poll pass failed during shutdown");
            }
        }
    }
}

async fn run_pass(scraper: &dyn Scrape, pipeline: &Pipeline) -> CycleReport {
    let captured_at = SystemTime::now();
    let outcome = scraper.fetch_all().await;
    pipeline.process(outcome, captured_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use ingress_rates_core::config::ParserConfig;
    use ingress_rates_scrape::{BoxFuture, FetchOutcome};

    use crate::pipeline::CycleKind;
    use crate::store::RateStore;

    /// Returns a fixed body, optionally blocking until released.
    struct FakeScrape {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeScrape {
        fn new(gate: Option<Arc<Notify>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate,
            }
        }
    }

    impl Scrape for FakeScrape {
        fn fetch_all(&self) -> BoxFuture<'_, FetchOutcome> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                let body = format!(
                    "nginx_upstream_requests_total{{upstream=\"default-foo-80\"}} {}\n",
                    100 * n
                );
                FetchOutcome {
                    bodies: [("pod1".to_string(), body)].into_iter().collect(),
                    failures: Vec::new(),
                    discovered: 1,
                }
            })
        }
    }

    fn pipeline() -> Arc<Pipeline> {
        Arc::new(
            Pipeline::new(
                &ParserConfig::default(),
                NonZeroU32::new(1).unwrap(),
                Arc::new(RateStore::new()),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn poll_once_runs_inline() {
        let scrape = Arc::new(FakeScrape::new(None));
        let poller = Poller::new(scrape.clone(), pipeline(), Duration::from_secs(20));
        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.kind, CycleKind::Reference);
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 1);
        assert!(poller.pipeline().rates().is_ready());
        assert!(!poller.is_busy());
    }

    #[tokio::test]
    async fn poll_once_is_refused_while_a_pass_runs() {
        let gate = Arc::new(Notify::new());
        let scrape = Arc::new(FakeScrape::new(Some(gate.clone())));
        let poller = Poller::new(scrape.clone(), pipeline(), Duration::from_secs(20));

        let scheduled = poller.try_start_pass().expect("scheduled pass starts");
        assert!(poller.poll_once().await.is_none());

        gate.notify_one();
        scheduled.await.unwrap();
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert!(poller.poll_once().await.is_some());
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 2);
    }

    /// Reads the counter at once, then waits on a hung sibling before the
    /// first fetch returns.
    struct SlowSiblingScrape {
        calls: AtomicUsize,
        hang: Duration,
    }

    impl Scrape for SlowSiblingScrape {
        fn fetch_all(&self) -> BoxFuture<'_, FetchOutcome> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
                let body = format!(
                    "nginx_upstream_requests_total{{upstream=\"default-foo-80\"}} {}\n",
                    100 * n
                );
                if n == 0 {
                    tokio::time::sleep(self.hang).await;
                }
                FetchOutcome {
                    bodies: [("pod1".to_string(), body)].into_iter().collect(),
                    failures: Vec::new(),
                    discovered: 2,
                }
            })
        }
    }

    #[tokio::test]
    async fn slow_sibling_does_not_shrink_elapsed_time() {
        let scrape = Arc::new(SlowSiblingScrape {
            calls: AtomicUsize::new(0),
            hang: Duration::from_secs(1),
        });
        let poller = Poller::new(scrape, pipeline(), Duration::from_secs(20));

        poller.poll_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.kind, CycleKind::Estimated);

        // 100 requests over the ~1.1s between counter reads.
        let rate = poller.pipeline().rates().get_rate("default", "foo").unwrap();
        assert!(rate > 50.0 && rate < 100.0, "rate {rate}");
    }

    #[tokio::test]
    async fn overlapping_tick_is_dropped() {
        let gate = Arc::new(Notify::new());
        let scrape = Arc::new(FakeScrape::new(Some(gate.clone())));
        let poller = Poller::new(scrape.clone(), pipeline(), Duration::from_secs(20));

        let first = poller.try_start_pass().expect("first pass starts");
        assert!(poller.is_busy());
        assert!(poller.try_start_pass().is_none());

        gate.notify_one();
        first.await.unwrap();
        assert!(!poller.is_busy());
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 1);

        let second = poller.try_start_pass().expect("next pass starts");
        gate.notify_one();
        second.await.unwrap();
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_immediately_and_on_interval() {
        let scrape = Arc::new(FakeScrape::new(None));
        let poller = Arc::new(Poller::new(scrape.clone(), pipeline(), Duration::from_secs(20)));
        let (tx, rx) = watch::channel(false);

        let runner = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.run(rx).await })
        };

        // Ticks at 0s, 20s, 40s, 60s.
        tokio::time::sleep(Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        assert_eq!(scrape.calls.load(Ordering::SeqCst), 4);
        assert!(!poller.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_pass_drops_ticks() {
        let gate = Arc::new(Notify::new());
        let scrape = Arc::new(FakeScrape::new(Some(gate.clone())));
        let poller = Arc::new(Poller::new(scrape.clone(), pipeline(), Duration::from_secs(20)));
        let (tx, rx) = watch::channel(false);

        let runner = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.run(rx).await })
        };

        // The first pass blocks across several ticks.
        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        tx.send(true).unwrap();
        runner.await.unwrap();
        assert_eq!(scrape.calls.load(Ordering::SeqCst), 1);
    }
}
