//! Convenience re-exports for working with the JSON-RPC message engine

pub use crate::batch::{BatchCall, BatchItem, RequestBatch, ResponseBatch, process_requests};
pub use crate::codec::{
    DecodeError, IncomingMessage, decode_message, decode_request, decode_response,
};
pub use crate::deframe::{DeframeError, DeframeState, MessageDeframer};
pub use crate::error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject};
pub use crate::notification::JsonRpcNotification;
pub use crate::request::{JsonRpcRequest, RequestParams};
pub use crate::response::{JsonRpcMessage, JsonRpcResponse, ResponseResult};
pub use crate::types::{JsonRpcVersion, RequestId};
pub use crate::{JSONRPC_VERSION, error_codes};
