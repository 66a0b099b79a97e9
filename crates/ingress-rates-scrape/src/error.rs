//! Scrape and parse errors.

use std::time::Duration;

use thiserror::Error;

/// Errors from parsing exposition text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A matching upstream line whose counter is not a finite,
    /// non-negative number.
    #[error("invalid counter value {value:?}")]
    InvalidValue { value: String },

    /// Same as `InvalidValue`, located within a scraped body.
    #[error("invalid counter value {value:?} on line {line}")]
    Malformed { line: usize, value: String },

    /// The configured metric prefix is not a valid metric name prefix.
    #[error("invalid metric prefix: {0}")]
    Pattern(String),
}

/// Per-endpoint scrape failures. None of these abort a poll cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("connect to {authority} failed: {reason}")]
    Connect { authority: String, reason: String },

    #[error("http handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("endpoint answered with status {0}")]
    Status(u16),

    #[error("reading body failed: {0}")]
    Body(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint discovery failed: {0}")]
    Discovery(String),

    #[error("rejected exposition body: {0}")]
    Parse(#[from] ParseError),
}
