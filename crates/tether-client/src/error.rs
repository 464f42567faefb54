//! Error types for client operations.

use serde_json::Value;
use thiserror::Error;

use tether_json_rpc::{DeframeError, JsonRpcErrorObject, error_codes};
use tether_session::SessionError;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, TetherClientError>;

/// Top-level error type for client operations
#[derive(Debug, Error)]
pub enum TetherClientError {
    /// Transport-level errors (connection, status, framing)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire protocol errors (malformed envelopes, failed negotiation)
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session-level errors (closed, timeout)
    #[error("session error: {0}")]
    Session(SessionError),

    /// The peer answered with a JSON-RPC error response
    #[error("server error (code {code}): {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    /// The server no longer knows the session id we carry
    #[error("session not found on server")]
    UnknownSession,

    #[error("event stream closed unexpectedly")]
    StreamClosed,

    #[error("exchange timed out")]
    Timeout,
}

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid response envelope: {0}")]
    InvalidResponse(String),

    #[error("handshake response carried no session id header")]
    MissingSessionId,

    #[error("server negotiated unsupported protocol version '{0}'")]
    UnsupportedVersion(String),

    #[error("malformed event stream: {0}")]
    Framing(#[from] DeframeError),

    #[error("not connected; call connect() first")]
    NotConnected,
}

impl TetherClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Build a server error from a JSON-RPC error object
    pub fn from_error_object(error: JsonRpcErrorObject) -> Self {
        Self::Server {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }

    /// Whether retrying the same exchange may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::ConnectionFailed(_)) => true,
            Self::Transport(TransportError::Http(_)) => true,
            Self::Transport(TransportError::StreamClosed) => true,
            Self::Transport(TransportError::Timeout) => true,
            Self::Transport(TransportError::Status { status, .. }) => {
                matches!(status, 502 | 503 | 504)
            }
            Self::Server { code, .. } => {
                (error_codes::SERVER_ERROR_START..=error_codes::SERVER_ERROR_END).contains(code)
            }
            _ => false,
        }
    }

    /// The JSON-RPC error code, when the server answered with one
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<SessionError> for TetherClientError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Rpc(object) => Self::from_error_object(object),
            other => Self::Session(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(
            TetherClientError::Transport(TransportError::ConnectionFailed("refused".into()))
                .is_retryable()
        );
        assert!(
            TetherClientError::Server {
                code: -32050,
                message: "busy".into(),
                data: None
            }
            .is_retryable()
        );
        assert!(
            !TetherClientError::Server {
                code: error_codes::METHOD_NOT_FOUND,
                message: "nope".into(),
                data: None
            }
            .is_retryable()
        );
        assert!(!TetherClientError::Session(SessionError::Closed).is_retryable());
        assert!(
            !TetherClientError::Transport(TransportError::Status {
                status: 404,
                message: "not found".into()
            })
            .is_retryable()
        );
    }

    #[test]
    fn test_rpc_session_error_becomes_server_error() {
        let err: TetherClientError =
            SessionError::Rpc(JsonRpcErrorObject::method_not_found("tools/run")).into();
        assert_eq!(err.error_code(), Some(error_codes::METHOD_NOT_FOUND));
    }
}
