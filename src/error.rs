//! Error types for the sentinel.
//!
//! Every fault in the system is classified as either recoverable (rotate an
//! endpoint, retry a fetch, drop a notification) or fatal (bad configuration,
//! catalog permanently unreachable). Call sites discriminate on the variant;
//! only the state machine decides whether a recoverable fault is worth
//! surfacing to the operator.

use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Configuration error. Never recoverable; aborts the process.
    #[error("configuration error: {0}")]
    Config(String),

    /// On-chain RPC error, tagged with the endpoint that produced it.
    #[error("rpc error via {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    /// Off-chain HTTP API error with the status that came back.
    #[error("api error {status} from {url}: {message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    /// Notification delivery failure. Always swallowed by the caller.
    #[error("notifier error: {0}")]
    Notifier(String),

    /// Anything else. Classified as recoverable by default.
    #[error("{0}")]
    Generic(String),
}

impl SentinelError {
    /// Whether the state machine may keep running after seeing this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SentinelError::Config(_))
    }

    /// Tag an RPC-layer failure with the endpoint it happened on.
    pub fn rpc(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SentinelError::Rpc {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    /// Tag an off-chain API failure with status and URL.
    pub fn api(status: u16, url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SentinelError::Api {
            status,
            url: url.into(),
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for SentinelError {
    fn from(err: config::ConfigError) -> Self {
        SentinelError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for SentinelError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        SentinelError::Api {
            status,
            url,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::Generic(format!("json: {}", err))
    }
}

impl From<anyhow::Error> for SentinelError {
    fn from(err: anyhow::Error) -> Self {
        SentinelError::Generic(err.to_string())
    }
}

/// Result type alias for convenience
pub type SentinelResult<T> = Result<T, SentinelError>;
