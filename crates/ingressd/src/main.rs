//! ingressd: the ingress-rates daemon.
//!
//! Single binary that wires the pipeline together:
//! - Fleet discovery (static list or DNS)
//! - Concurrent exposition fetches
//! - Rate poller + store
//! - Custom metrics API, `/metrics`, `/healthz`
//!
//! # Usage
//!
//! ```text
//! ingressd run --config /etc/ingress-rates/ingress-rates.toml
//! ingressd run --endpoint 10.0.0.1 --endpoint 10.0.0.2 --interval 10s
//! ingressd check --config ingress-rates.toml
//! ```

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ingress_rates_core::{Config, ParsePolicy};
use ingress_rates_metrics::{Pipeline, Poller, RateProvider, RateStore};
use ingress_rates_scrape::{FleetScraper, HttpFetcher, discovery};

const DEFAULT_LOG_FILTER: &str = "info,ingressd=debug,ingress_rates=debug";

#[derive(Parser)]
#[command(name = "ingressd", about = "Per-service request rates from ingress-nginx counters")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the fleet and serve rates until interrupted.
    Run(Overrides),
    /// Load and validate the configuration, then exit.
    Check(Overrides),
}

/// Configuration file plus flags that take precedence over it.
#[derive(Args)]
struct Overrides {
    /// Path to ingress-rates.toml.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Fixed fleet member address (repeatable). Replaces DNS discovery.
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,

    /// Headless service name resolving to the fleet members.
    #[arg(long, conflicts_with = "endpoints")]
    dns_name: Option<String>,

    /// Address the HTTP server binds.
    #[arg(long)]
    listen: Option<String>,

    /// Poll interval, e.g. "20s".
    #[arg(long)]
    interval: Option<String>,

    /// Samples in the moving-average window.
    #[arg(long)]
    moving_samples: Option<u32>,

    /// Drop malformed lines instead of rejecting the endpoint body.
    #[arg(long)]
    skip_malformed: bool,
}

impl Overrides {
    fn load(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };

        if !self.endpoints.is_empty() {
            config.fleet.endpoints = self.endpoints;
            config.fleet.dns_name = None;
        }
        if let Some(name) = self.dns_name {
            config.fleet.dns_name = Some(name);
            config.fleet.endpoints.clear();
        }
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(interval) = self.interval {
            config.poll.interval = interval;
        }
        if let Some(samples) = self.moving_samples {
            config.poll.moving_samples = samples;
        }
        if self.skip_malformed {
            config.parser.policy = ParsePolicy::Skip;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run(overrides) => run(overrides.load()?).await,
        Command::Check(overrides) => {
            let config = overrides.load()?;
            info!(
                label = %config.fleet.label,
                interval = %config.poll.interval,
                moving_samples = config.poll.moving_samples,
                "configuration ok"
            );
            Ok(())
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(label = %config.fleet.label, "ingress-rates daemon starting");

    let interval = config.poll.interval()?;
    let fetch_timeout = config.poll.fetch_timeout()?;
    let window = NonZeroU32::new(config.poll.moving_samples)
        .context("poll.moving_samples must be at least 1")?;
    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid server.listen {:?}", config.server.listen))?;

    // ── Initialize pipeline ────────────────────────────────────

    let discovery = discovery::from_config(&config.fleet);
    let fetcher = HttpFetcher::new(config.fleet.path.clone(), fetch_timeout);
    let scraper = Arc::new(FleetScraper::new(discovery, fetcher));
    info!(
        port = config.fleet.port,
        path = %config.fleet.path,
        timeout_ms = fetch_timeout.as_millis() as u64,
        "fleet scraper initialized"
    );

    let store = Arc::new(RateStore::new());
    let pipeline = Arc::new(Pipeline::new(&config.parser, window, store.clone())?);
    let poller = Poller::new(scraper, pipeline, interval);
    info!(
        moving_samples = window.get(),
        policy = ?config.parser.policy,
        "rate pipeline initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start poller ───────────────────────────────────────────

    let poller_handle = tokio::spawn(async move {
        poller.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = ingress_rates_api::build_router(RateProvider::new(store));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c; shutting down");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = poller_handle.await {
        warn!(error = %e, "poller task ended abnormally");
    }

    info!("ingress-rates daemon stopped");
    Ok(())
}
