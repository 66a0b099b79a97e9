//! ingress-rates-scrape: collects raw upstream counters from the fleet.
//!
//! # Architecture
//!
//! ```text
//! FleetScraper (impl Scrape)
//!   ├── Discovery::discover() → Vec<Endpoint>   (static list or DNS)
//!   └── HttpFetcher::fetch() per endpoint, concurrently, with timeout
//!         └── FetchOutcome { bodies, failures }
//!
//! LineParser::parse_exposition(body, policy) → Vec<EndpointSample>
//! ```

pub mod discovery;
pub mod error;
pub mod fetch;
pub mod parser;

pub use discovery::{BoxFuture, Discovery, DnsDiscovery, Endpoint, StaticDiscovery};
pub use error::{ParseError, ScrapeError};
pub use fetch::{FetchFailure, FetchOutcome, FleetScraper, HttpFetcher, Scrape};
pub use parser::{LineParser, split_upstream};
