//! Error types for the analytics API client.

use crate::models::Transcript;
use thiserror::Error;

/// Errors that can occur while talking to the analytics API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The API host could not be reached.
    #[error("Cannot connect to analytics API at {0}")]
    Connect(String),

    /// Any other transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Analytics API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body was not the JSON we expected.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// A retrieval that stopped early because a page fetch failed.
///
/// Carries every record accumulated before the failure so callers can
/// still use the partial result.
#[derive(Debug, Error)]
#[error(
    "Retrieval aborted after {pages_fetched} page(s) with {} record(s): {source}",
    .records.len()
)]
pub struct PartialFetch {
    pub records: Vec<Transcript>,
    pub pages_fetched: usize,
    #[source]
    pub source: FetchError,
}

impl PartialFetch {
    pub fn into_records(self) -> Vec<Transcript> {
        self.records
    }
}
