//! Fleet discovery: enumerates the endpoints to scrape on each cycle.
//!
//! Membership is re-resolved every cycle, so pods that come and go
//! (scale events, rescheduling) simply appear in or drop out of the next
//! fetch.

use std::collections::BTreeSet;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;

use tracing::debug;

use ingress_rates_core::EndpointId;
use ingress_rates_core::config::FleetConfig;

use crate::error::ScrapeError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One fleet member to scrape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Endpoint {
    /// Stable identity used in `TotalKey`s (the member's address).
    pub id: EndpointId,
    /// `host:port` to connect to.
    pub authority: String,
}

impl Endpoint {
    /// Build an endpoint from a configured address, applying `default_port`
    /// unless the address already carries one.
    pub fn from_address(address: &str, default_port: u16) -> Self {
        let address = address.trim();
        let authority = if address.parse::<SocketAddr>().is_ok() {
            address.to_string()
        } else if let Ok(ip) = address.parse::<IpAddr>() {
            SocketAddr::new(ip, default_port).to_string()
        } else if address.rsplit_once(':').is_some_and(|(_, p)| p.parse::<u16>().is_ok()) {
            address.to_string()
        } else {
            format!("{address}:{default_port}")
        };
        Self {
            id: address.to_string(),
            authority,
        }
    }
}

/// Source of the current fleet membership.
pub trait Discovery: Send + Sync {
    fn discover(&self) -> BoxFuture<'_, Result<Vec<Endpoint>, ScrapeError>>;
}

/// A fixed list of members.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    endpoints: Vec<Endpoint>,
}

impl StaticDiscovery {
    pub fn new<S: AsRef<str>>(addresses: &[S], port: u16) -> Self {
        Self {
            endpoints: addresses
                .iter()
                .map(|a| Endpoint::from_address(a.as_ref(), port))
                .collect(),
        }
    }
}

impl Discovery for StaticDiscovery {
    fn discover(&self) -> BoxFuture<'_, Result<Vec<Endpoint>, ScrapeError>> {
        Box::pin(async move { Ok(self.endpoints.clone()) })
    }
}

/// Resolves a headless service name; every address returned is one member.
#[derive(Debug, Clone)]
pub struct DnsDiscovery {
    name: String,
    port: u16,
}

impl DnsDiscovery {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl Discovery for DnsDiscovery {
    fn discover(&self) -> BoxFuture<'_, Result<Vec<Endpoint>, ScrapeError>> {
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((self.name.as_str(), self.port))
                .await
                .map_err(|e| ScrapeError::Discovery(format!("{}: {e}", self.name)))?;

            let unique: BTreeSet<SocketAddr> = addrs.collect();
            let endpoints: Vec<Endpoint> = unique
                .into_iter()
                .map(|sa| Endpoint {
                    id: sa.ip().to_string(),
                    authority: sa.to_string(),
                })
                .collect();

            debug!(name = %self.name, members = endpoints.len(), "fleet resolved");
            Ok(endpoints)
        })
    }
}

/// Build the discovery configured for the fleet.
pub fn from_config(fleet: &FleetConfig) -> Box<dyn Discovery> {
    match &fleet.dns_name {
        Some(name) => Box::new(DnsDiscovery::new(name.clone(), fleet.port)),
        None => Box::new(StaticDiscovery::new(&fleet.endpoints, fleet.port)),
    }
}
