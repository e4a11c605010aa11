//! Error types for the OpenStack client seams
//!
//! Authentication failures abort a whole collection cycle, fetch failures
//! only drop the affected resource collection.

use crate::client::ServiceKind;
use reqwest::StatusCode;
use thiserror::Error;

/// Keystone authentication failure
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("unable to reach identity endpoint {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("identity service rejected credentials (HTTP {0})")]
    Rejected(StatusCode),

    #[error("identity response carried no X-Subject-Token header")]
    MissingToken,

    #[error("unable to decode token response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Resource listing failure, split by the step that failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unable to create {0} client: no usable endpoint in service catalog")]
    NoEndpoint(ServiceKind),

    #[error("unable to list {resource}: {source}")]
    List {
        resource: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to list {resource}: HTTP {status}")]
    Status {
        resource: &'static str,
        status: StatusCode,
    },

    #[error("unable to extract {resource}: {source}")]
    Extract {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// True when the listing itself went through but the payload was unusable
    pub fn is_extract(&self) -> bool {
        matches!(self, FetchError::Extract { .. })
    }
}
