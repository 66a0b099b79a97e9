//! ingress-rates-api: HTTP surface over the rate store.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/apis/custom.metrics.k8s.io/v1beta1` | List served metrics |
//! | GET | `/apis/custom.metrics.k8s.io/v1beta1/namespaces/{namespace}/{resource}/{name}/{metric}` | Current rate of one service |
//! | GET | `/apis/custom.metrics.k8s.io/v1beta1/{resource}/{name}/{metric}` | Root-scoped lookup (unsupported) |
//! | GET | `/metrics` | Prometheus exposition of current rates |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use axum::Router;
use axum::routing::get;

use ingress_rates_metrics::RateProvider;

/// API group/version the lookup routes are mounted under.
pub const GROUP_VERSION: &str = "custom.metrics.k8s.io/v1beta1";

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub provider: RateProvider,
}

/// Build the complete router.
pub fn build_router(provider: RateProvider) -> Router {
    let state = ApiState { provider };

    let metrics_routes = Router::new()
        .route("/", get(handlers::list_metrics))
        .route(
            "/namespaces/{namespace}/{resource}/{name}/{metric}",
            get(handlers::get_namespaced_metric),
        )
        .route(
            "/{resource}/{name}/{metric}",
            get(handlers::get_root_scoped_metric),
        )
        .with_state(state.clone());

    Router::new()
        .nest(&format!("/apis/{GROUP_VERSION}"), metrics_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
        .route("/healthz", get(handlers::healthz))
}
