//! Operator Error Differentiation
//!
//! Classifies failures from the node, the price API and the contract into
//! structured kinds so each call site can decide between retrying the
//! remote call and aborting the run.

use std::time::Duration;
use thiserror::Error;

/// Structured operator error types
#[derive(Debug, Clone, Error)]
pub enum OperatorError {
    /// Missing or invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/connection error (timeout, DNS, refused connection, etc.)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the node or price API
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    ResponseShape(String),

    /// JSON-RPC error object returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Private key parsing or signing failed
    #[error("signing error: {0}")]
    Signing(String),

    /// Transaction was mined but execution failed
    #[error("{label} transaction {tx_hash} reverted")]
    Reverted { label: String, tx_hash: String },

    /// No receipt arrived before the deadline
    #[error("{label} transaction {tx_hash} not mined after {waited:?}")]
    Timeout {
        label: String,
        tx_hash: String,
        waited: Duration,
    },
}

impl OperatorError {
    /// Parse a reqwest transport error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            OperatorError::Network("request timed out".to_string())
        } else if err.is_connect() {
            OperatorError::Network("connection failed".to_string())
        } else if err.is_decode() {
            OperatorError::ResponseShape(err.to_string())
        } else {
            OperatorError::Network(err.to_string())
        }
    }

    /// Whether the failed call may be repeated with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::Network(_) => true,
            OperatorError::Http { status, .. } => *status == 429 || *status >= 500,
            OperatorError::Rpc { code, message } => {
                let msg = message.to_lowercase();
                (-32099..=-32000).contains(code)
                    && (msg.contains("rate limit")
                        || msg.contains("too many requests")
                        || msg.contains("busy")
                        || msg.contains("header not found"))
            }
            _ => false,
        }
    }

    /// Whether a broadcast error means the node already holds this exact transaction
    pub fn is_already_known(&self) -> bool {
        match self {
            OperatorError::Rpc { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("already known") || msg.contains("known transaction")
            }
            _ => false,
        }
    }
}

pub type OperatorResult<T> = Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_is_retryable() {
        assert!(OperatorError::Network("reset".into()).is_retryable());
    }

    #[test]
    fn test_http_status_classification() {
        let rate_limited = OperatorError::Http { status: 429, body: String::new() };
        let server = OperatorError::Http { status: 502, body: String::new() };
        let bad_request = OperatorError::Http { status: 400, body: String::new() };
        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!bad_request.is_retryable());
    }

    #[test]
    fn test_rpc_nonce_too_low_is_fatal() {
        let err = OperatorError::Rpc { code: -32000, message: "nonce too low".into() };
        assert!(!err.is_retryable());
        assert!(!err.is_already_known());
    }

    #[test]
    fn test_rpc_rate_limit_is_retryable() {
        let err = OperatorError::Rpc { code: -32005, message: "Rate limit exceeded".into() };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_already_known() {
        let err = OperatorError::Rpc { code: -32000, message: "already known".into() };
        assert!(err.is_already_known());
    }

    #[test]
    fn test_terminal_kinds_are_fatal() {
        let reverted = OperatorError::Reverted { label: "Execute Round".into(), tx_hash: "0x01".into() };
        let timeout = OperatorError::Timeout {
            label: "Execute Round".into(),
            tx_hash: "0x01".into(),
            waited: Duration::from_millis(200),
        };
        assert!(!reverted.is_retryable());
        assert!(!timeout.is_retryable());
        assert_eq!(reverted.to_string(), "Execute Round transaction 0x01 reverted");
        assert_eq!(timeout.to_string(), "Execute Round transaction 0x01 not mined after 200ms");
    }
}
