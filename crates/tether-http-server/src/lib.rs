//! # Tether HTTP Server Transport
//!
//! Streamable HTTP transport for the Tether protocol. One endpoint carries
//! the whole conversation:
//!
//! - `POST`: JSON-RPC exchanges. A request is answered with a single JSON
//!   document, or with an event stream when the session negotiated streaming
//!   and the client accepts it. Notifications and inbound responses are
//!   acknowledged with `202 Accepted`.
//! - `GET`: a standalone event stream for server-initiated traffic
//!   (notifications and requests pushed to the client).
//! - `DELETE`: terminal session teardown.
//!
//! Sessions are created by the `handshake` request and carried in the
//! `Tether-Session-Id` header on every subsequent exchange; an unknown id is
//! a 404-class transport error, never a JSON-RPC error.

pub mod handler;
pub mod headers;
mod responses;
pub mod server;
pub mod streams;

#[cfg(test)]
mod tests;

// Re-export main types
pub use handler::SessionHttpHandler;
pub use headers::{
    PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER, extract_protocol_version, extract_session_id,
};
pub use server::{ServerConfig, ServerStats, TetherServer, TetherServerBuilder};
pub use streams::{
    EventStreamManager, ExchangeSink, ServerBody, SessionStreamSink, StreamError, StreamOptions,
};

// Re-export foundational types
pub use tether_json_rpc::prelude as json_rpc;
pub use tether_protocol::prelude as protocol;

/// Result type for server transport operations
pub type Result<T> = std::result::Result<T, HttpServerError>;

/// Server transport errors
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    Store(#[from] tether_session::SessionStoreError),

    #[error("Session error: {0}")]
    Session(#[from] tether_session::SessionError),

    #[error("Stream error: {0}")]
    Stream(#[from] streams::StreamError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
