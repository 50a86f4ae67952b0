//! Error taxonomy shared by the indexer and the query service.
//!
//! Component APIs return [`Error`]; the CLI boundary wraps everything in
//! `anyhow::Result` for reporting.

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The persisted index state exists but cannot be parsed.
    #[error("index state '{location}' is corrupt: {detail}")]
    StateCorrupt { location: String, detail: String },

    /// No store handle was found and a new store could not be created.
    #[error(
        "could not create a file search store: {0}. Create one manually and write its \
         resource name to the store-name artifact"
    )]
    StoreCreation(String),

    /// A single file failed to upload after all attempts.
    #[error("upload of '{id}' failed: {detail}")]
    Upload { id: String, detail: String },

    /// The query call to the generation API failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The query service has no store handle to search.
    #[error("file search store not configured; run `fss sync` first")]
    StoreNotConfigured,

    /// Non-success HTTP response from an external API.
    #[error("{service} API error {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Connection-level failure talking to an external API.
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("invalid response from {service}: {detail}")]
    InvalidResponse {
        service: &'static str,
        detail: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, server errors, connection failures and processing
    /// timeouts are transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Http { .. } | Error::Timeout { .. } => true,
            _ => false,
        }
    }
}
