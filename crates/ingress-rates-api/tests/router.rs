//! Router tests: requests through the full axum stack.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use ingress_rates_api::build_router;
use ingress_rates_core::{RateKey, RateSnapshot};
use ingress_rates_metrics::{RateProvider, RateStore};

const BASE: &str = "/apis/custom.metrics.k8s.io/v1beta1";

fn ready_store() -> Arc<RateStore> {
    let store = Arc::new(RateStore::new());
    let rates = HashMap::from([
        (RateKey::new("default", "foo-bar"), 21.67),
        (RateKey::new("default", "idle"), 0.0),
    ]);
    store.publish(RateSnapshot::new(
        rates,
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    ));
    store
}

async fn get(store: Arc<RateStore>, uri: &str) -> (StatusCode, String) {
    let router = build_router(RateProvider::new(store));
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn lookup_returns_metric_value() {
    let uri = format!("{BASE}/namespaces/default/services/foo-bar/ingress_requests_per_second");
    let (status, body) = get(ready_store(), &uri).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["value"], 21);
    assert_eq!(json["timestamp"], 1_700_000_000u64);
    assert_eq!(json["metricName"], "ingress_requests_per_second");
    assert_eq!(json["describedObject"]["name"], "foo-bar");
    assert_eq!(json["describedObject"]["namespace"], "default");
}

#[tokio::test]
async fn zero_rate_is_ok_not_missing() {
    let uri = format!("{BASE}/namespaces/default/services/idle/ingress_requests_per_second");
    let (status, body) = get(ready_store(), &uri).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["value"], 0);
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let uri = format!("{BASE}/namespaces/default/services/nope/ingress_requests_per_second");
    let (status, body) = get(ready_store(), &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("nope"));
}

#[tokio::test]
async fn before_first_cycle_is_unavailable() {
    let uri = format!("{BASE}/namespaces/default/services/foo-bar/ingress_requests_per_second");
    let (status, _) = get(Arc::new(RateStore::new()), &uri).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn wrong_metric_is_bad_request() {
    let uri = format!("{BASE}/namespaces/default/services/foo-bar/cpu_usage");
    let (status, body) = get(ready_store(), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("cpu_usage"));
}

#[tokio::test]
async fn root_scoped_is_not_implemented() {
    let uri = format!("{BASE}/services/foo-bar/ingress_requests_per_second");
    let (status, _) = get(ready_store(), &uri).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn list_metrics() {
    let (status, body) = get(ready_store(), BASE).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ingress_requests_per_second"));
}

#[tokio::test]
async fn prometheus_exposition() {
    let (status, body) = get(ready_store(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(
        "ingress_requests_per_second{namespace=\"default\",service=\"foo-bar\"} 21.670"
    ));
}

#[tokio::test]
async fn healthz() {
    let (status, body) = get(Arc::new(RateStore::new()), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}
