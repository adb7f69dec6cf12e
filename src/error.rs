//! Error taxonomy for the pipeline stages.
//!
//! Every stage has its own error type so the orchestrator can log precisely
//! what failed; none of them is fatal to the process.

use thiserror::Error;

/// Failure while fetching one source (or one page of it).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("timed out after {secs}s fetching {source_name}")]
    Timeout { source_name: String, secs: u64 },

    #[error("malformed payload from {url}: {reason}")]
    Markup { url: String, reason: String },
}

/// The inference output does not honour the eight-field judgment contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("no JSON object found in inference output")]
    NoJsonObject,

    #[error("inference output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` has an unusable value: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failure talking to the external inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference is disabled")]
    Disabled,

    #[error("daily inference quota of {0} calls exhausted")]
    QuotaExhausted(u32),

    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("inference service returned HTTP {0}")]
    Status(u16),

    #[error("inference service returned an empty completion")]
    EmptyCompletion,
}

/// Failure pushing one message to one subscriber.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no sender configured for platform `{0}`")]
    UnsupportedPlatform(String),

    #[error("{platform} request failed: {reason}")]
    Transport {
        platform: &'static str,
        reason: String,
    },

    #[error("{platform} returned HTTP {status}")]
    Status { platform: &'static str, status: u16 },

    #[error("{platform} rejected the message: {reason}")]
    Rejected {
        platform: &'static str,
        reason: String,
    },
}

/// Failure of the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("store backend error: {0}")]
    Backend(String),
}
