//! Query accessor for the metrics API layer.

use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tracing::debug;

use ingress_rates_core::{QueryError, RateKey};

use crate::store::RateStore;

/// Resource the single metric is attached to.
pub const RESOURCE: &str = "services";
/// The only metric this adapter serves.
pub const METRIC_NAME: &str = "ingress_requests_per_second";

/// Description of a served metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricInfo {
    pub resource: &'static str,
    pub metric: &'static str,
    pub namespaced: bool,
}

/// Read side of the pipeline, shared with the HTTP layer.
#[derive(Debug, Clone)]
pub struct RateProvider {
    store: Arc<RateStore>,
}

impl RateProvider {
    pub fn new(store: Arc<RateStore>) -> Self {
        Self { store }
    }

    /// Current requests per second for a service, truncated toward zero.
    pub fn get_value(
        &self,
        resource: &str,
        namespace: &str,
        name: &str,
        metric_name: &str,
    ) -> Result<i64, QueryError> {
        let resource_ok = resource == RESOURCE || resource == "service";
        if !resource_ok || metric_name != METRIC_NAME {
            return Err(QueryError::UnsupportedMetric {
                resource: resource.to_string(),
                metric: metric_name.to_string(),
            });
        }

        let snapshot = self.store.snapshot().ok_or(QueryError::NotReady)?;
        let rate = snapshot
            .get(&RateKey::new(namespace, name))
            .ok_or_else(|| QueryError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        let value = rate.trunc() as i64;
        debug!(%resource, %namespace, %name, metric = %metric_name, value, "served rate");
        Ok(value)
    }

    /// Instant of the last completed cycle.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.store.timestamp()
    }

    pub fn list_metrics(&self) -> Vec<MetricInfo> {
        vec![MetricInfo {
            resource: RESOURCE,
            metric: METRIC_NAME,
            namespaced: true,
        }]
    }

    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }
}
