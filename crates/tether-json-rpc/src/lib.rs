//! # JSON-RPC 2.0 Message Engine
//!
//! A pure, transport-agnostic JSON-RPC 2.0 implementation for the Tether
//! protocol. This crate provides the message model, a strict wire codec,
//! batch decoding/processing, and an incremental deframer that recovers
//! discrete JSON documents from arbitrary byte chunks.
//!
//! ## Features
//! - Full JSON-RPC 2.0 envelope compliance (request/response/notification/error)
//! - Strict structural validation with fixed-order error reporting
//! - Batch handling with per-item failure isolation
//! - Incremental message framing with a hard size limit
//! - Transport agnostic (works with HTTP bodies, SSE payloads, TCP, etc.)

pub mod batch;
pub mod codec;
pub mod deframe;
pub mod error;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

pub mod prelude;

// Re-export main types
pub use batch::{BatchCall, BatchItem, RequestBatch, ResponseBatch, process_requests};
pub use codec::{DecodeError, IncomingMessage, decode_message, decode_request, decode_response};
pub use deframe::{DeframeError, DeframeState, MessageDeframer};
pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject};
pub use notification::JsonRpcNotification;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcMessage, JsonRpcResponse, ResponseResult};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;

    /// Transport-level "method not allowed" rejection (wrong HTTP verb).
    /// Sits deliberately outside the reserved server error range.
    pub const METHOD_NOT_ALLOWED: i64 = -32100;
}
