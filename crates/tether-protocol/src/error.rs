//! Domain errors returned by feature handlers.
//!
//! The dispatch boundary converts these into JSON-RPC error objects; a
//! feature failure is always surfaced to the peer as an error response,
//! never as an engine fault.

use thiserror::Error;

use tether_json_rpc::{JsonRpcErrorObject, error_codes};

/// Error type for protocol and feature-handler failures
#[derive(Debug, Error)]
pub enum TetherError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("Capability not negotiated: {0}")]
    CapabilityNotNegotiated(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TetherError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        TetherError::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TetherError::Internal(message.into())
    }

    /// Convert this error to a JSON-RPC error object
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            TetherError::MethodNotFound(method) => JsonRpcErrorObject::method_not_found(method),
            TetherError::InvalidParams(message) => JsonRpcErrorObject::invalid_params(message),
            TetherError::SessionNotFound(session_id) => JsonRpcErrorObject::server_error(
                error_codes::SERVER_ERROR_END,
                &format!("Session '{}' not found", session_id),
                None,
            ),
            TetherError::UnsupportedVersion(version) => JsonRpcErrorObject::server_error(
                error_codes::SERVER_ERROR_END - 1,
                &format!("Unsupported protocol version '{}'", version),
                None,
            ),
            TetherError::CapabilityNotNegotiated(capability) => JsonRpcErrorObject::server_error(
                error_codes::SERVER_ERROR_END - 2,
                &format!("Capability '{}' was not negotiated", capability),
                None,
            ),
            TetherError::Serialization(err) => {
                JsonRpcErrorObject::internal_error(Some(err.to_string()))
            }
            TetherError::Internal(message) => {
                JsonRpcErrorObject::internal_error(Some(message.clone()))
            }
        }
    }
}
