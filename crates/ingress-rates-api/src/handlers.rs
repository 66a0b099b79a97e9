//! HTTP handlers.
//!
//! Lookups go through `RateProvider`; responses are JSON except `/metrics`.

use std::time::UNIX_EPOCH;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{debug, warn};

use ingress_rates_core::QueryError;
use ingress_rates_metrics::{MetricInfo, render_prometheus};

use crate::ApiState;

/// Object a metric value describes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

/// One metric value, shaped after the custom metrics API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub described_object: ObjectReference,
    pub metric_name: String,
    /// Unix seconds of the cycle the value came from.
    pub timestamp: u64,
    pub value: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricList {
    pub group_version: &'static str,
    pub resources: Vec<MetricInfo>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

fn query_error_response(err: &QueryError) -> axum::response::Response {
    let status = match err {
        QueryError::UnsupportedMetric { .. } => StatusCode::BAD_REQUEST,
        QueryError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        QueryError::NotFound { .. } => StatusCode::NOT_FOUND,
    };
    error_response(&err.to_string(), status)
}

// ── Custom metrics ─────────────────────────────────────────────

/// GET /apis/custom.metrics.k8s.io/v1beta1
pub async fn list_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    Json(MetricList {
        group_version: crate::GROUP_VERSION,
        resources: state.provider.list_metrics(),
    })
}

/// GET /apis/custom.metrics.k8s.io/v1beta1/namespaces/{namespace}/{resource}/{name}/{metric}
pub async fn get_namespaced_metric(
    State(state): State<ApiState>,
    Path((namespace, resource, name, metric)): Path<(String, String, String, String)>,
) -> impl IntoResponse {
    if name == "*" {
        warn!(%namespace, %resource, %metric, "selector lookup unsupported");
        return error_response(
            "metric lookup by label selector is not supported",
            StatusCode::NOT_IMPLEMENTED,
        );
    }

    match state.provider.get_value(&resource, &namespace, &name, &metric) {
        Ok(value) => {
            let timestamp = state
                .provider
                .timestamp()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or_default();
            Json(MetricValue {
                described_object: ObjectReference {
                    kind: "Service",
                    namespace,
                    name,
                },
                metric_name: metric,
                timestamp,
                value,
            })
            .into_response()
        }
        Err(e) => {
            debug!(%namespace, %name, %metric, error = %e, "metric lookup failed");
            query_error_response(&e)
        }
    }
}

/// GET /apis/custom.metrics.k8s.io/v1beta1/{resource}/{name}/{metric}
pub async fn get_root_scoped_metric(
    Path((resource, name, metric)): Path<(String, String, String)>,
) -> impl IntoResponse {
    warn!(%resource, %name, %metric, "root-scoped lookup unsupported");
    error_response(
        "root-scoped metrics are not supported",
        StatusCode::NOT_IMPLEMENTED,
    )
}

// ── Operational ────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.provider.store().snapshot();
    let body = render_prometheus(snapshot.as_deref());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
