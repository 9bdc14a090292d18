use std::time::Duration;

use solana_client::nonblocking::pubsub_client::PubsubClientError;
use solana_rpc_client_api::client_error::Error as ClientError;
use thiserror::Error;

/// Errors surfaced by a [`Transport`](super::Transport) implementation.
///
/// These never reach the caller of the submitter directly: the submission
/// pipeline either swallows them (polling, rebroadcast) or folds them into a
/// `SubmitError` with a human-readable message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Network/connection level failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Request did not complete in time
    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The remote endpoint answered with an error object
    #[error("RPC response error: {message} (code: {code:?})")]
    RpcResponse { message: String, code: Option<i64> },

    /// Endpoint is throttling us
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The transport does not offer this capability
    #[error("Operation not supported by transport: {0}")]
    Unsupported(&'static str),

    /// A response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether this error is expected to clear up on its own
    ///
    /// The poll loop and the rebroadcaster keep going on any error, but log
    /// non-transient ones loudly since they point at a misconfigured endpoint.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Timeout { .. } => true,
            Self::RateLimited => true,
            Self::RpcResponse { code, .. } => {
                // Retry on server errors (5xx)
                matches!(code, Some(c) if (500..600).contains(c))
            }
            Self::Unsupported(_) => false,
            Self::Decode(_) => false,
        }
    }

    /// Short label used for metrics and log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::RpcResponse { .. } => "rpc_response",
            Self::RateLimited => "rate_limited",
            Self::Unsupported(_) => "unsupported",
            Self::Decode(_) => "decode",
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Classify a `solana_client` error by its message
    ///
    /// `request_timeout` is the client's configured limit, reported when the
    /// error is a timeout.
    pub fn from_client_error(err: &ClientError, request_timeout: Duration) -> Self {
        let err_str = err.to_string().to_lowercase();

        if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            Self::RateLimited
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            Self::Timeout {
                timeout_ms: request_timeout.as_millis() as u64,
            }
        } else if err_str.contains("error sending request")
            || err_str.contains("connection")
            || err_str.contains("dns")
        {
            Self::transport(err.to_string())
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            Self::RpcResponse {
                message: err.to_string(),
                code,
            }
        }
    }
}

impl From<PubsubClientError> for TransportError {
    fn from(err: PubsubClientError) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<bincode::Error> for TransportError {
    fn from(err: bincode::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_rpc_client_api::client_error::ErrorKind as ClientErrorKind;

    #[test]
    fn test_error_is_transient() {
        assert!(TransportError::transport("connection reset").is_transient());
        assert!(TransportError::Timeout { timeout_ms: 5000 }.is_transient());
        assert!(TransportError::RateLimited.is_transient());
        assert!(TransportError::RpcResponse {
            message: "bad gateway".to_string(),
            code: Some(502),
        }
        .is_transient());

        assert!(!TransportError::Unsupported("subscribe_signature").is_transient());
        assert!(!TransportError::RpcResponse {
            message: "invalid params".to_string(),
            code: Some(-32602),
        }
        .is_transient());
        assert!(!TransportError::Decode("garbage".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Timeout { timeout_ms: 300 };
        assert_eq!(err.to_string(), "Timeout after 300ms");

        let err = TransportError::Unsupported("subscribe_signature");
        assert_eq!(
            err.to_string(),
            "Operation not supported by transport: subscribe_signature"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransportError::RateLimited.category(), "rate_limited");
        assert_eq!(TransportError::transport("x").category(), "transport");
        assert_eq!(TransportError::Decode("x".into()).category(), "decode");
    }

    #[test]
    fn test_client_timeout_reports_configured_limit() {
        let err = ClientError::from(ClientErrorKind::Custom("request timed out".to_string()));
        let classified = TransportError::from_client_error(&err, Duration::from_secs(30));
        assert_eq!(classified, TransportError::Timeout { timeout_ms: 30_000 });
        assert_eq!(classified.to_string(), "Timeout after 30000ms");
    }

    #[test]
    fn test_client_error_classification() {
        let limit = Duration::from_secs(5);
        let err = ClientError::from(ClientErrorKind::Custom("429 Too Many Requests".to_string()));
        assert_eq!(
            TransportError::from_client_error(&err, limit),
            TransportError::RateLimited
        );

        let err = ClientError::from(ClientErrorKind::Custom("connection refused".to_string()));
        assert!(matches!(
            TransportError::from_client_error(&err, limit),
            TransportError::Transport { .. }
        ));
    }
}
