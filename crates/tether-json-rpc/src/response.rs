use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JsonRpcError, JsonRpcErrorObject};
use crate::types::{JsonRpcVersion, RequestId};

/// Result data for a JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseResult {
    /// Success result with data
    Success(Value),
    /// Null result (for void methods)
    Null,
}

impl ResponseResult {
    pub fn success(value: Value) -> Self {
        ResponseResult::Success(value)
    }

    pub fn null() -> Self {
        ResponseResult::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResponseResult::Null)
    }

    /// The result as a plain value (`Null` becomes `Value::Null`)
    pub fn into_value(self) -> Value {
        match self {
            ResponseResult::Success(value) => value,
            ResponseResult::Null => Value::Null,
        }
    }
}

impl From<Value> for ResponseResult {
    fn from(value: Value) -> Self {
        if value.is_null() {
            ResponseResult::Null
        } else {
            ResponseResult::Success(value)
        }
    }
}

impl From<()> for ResponseResult {
    fn from(_: ()) -> Self {
        ResponseResult::Null
    }
}

/// A successful JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub result: ResponseResult,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: ResponseResult) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            result,
        }
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self::new(id, ResponseResult::Success(result))
    }

    pub fn null(id: RequestId) -> Self {
        Self::new(id, ResponseResult::Null)
    }
}

/// Union type for the two legal response shapes.
///
/// JSON-RPC 2.0 requires exactly one of `result`/`error`; keeping the two
/// shapes as separate structs makes an envelope carrying both (or neither)
/// unrepresentable after decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Successful response with result field
    Response(JsonRpcResponse),
    /// Error response with error field
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// Create a success message
    pub fn success(id: RequestId, result: ResponseResult) -> Self {
        Self::Response(JsonRpcResponse::new(id, result))
    }

    /// Create an error message
    pub fn error(error: JsonRpcError) -> Self {
        Self::Error(error)
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcMessage::Error(_))
    }

    /// Get the request ID from either response or error
    pub fn id(&self) -> Option<RequestId> {
        match self {
            JsonRpcMessage::Response(resp) => Some(resp.id),
            JsonRpcMessage::Error(err) => err.id,
        }
    }

    /// Split into the outcome the pending-request table completes with
    pub fn into_outcome(self) -> Result<ResponseResult, JsonRpcErrorObject> {
        match self {
            JsonRpcMessage::Response(resp) => Ok(resp.result),
            JsonRpcMessage::Error(err) => Err(err.error),
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, json, to_string};

    #[test]
    fn test_response_serialization() {
        let response = JsonRpcResponse::success(RequestId(1), json!({"status": "ok"}));

        let json_str = to_string(&response).unwrap();
        let parsed: JsonRpcResponse = from_str(&json_str).unwrap();

        assert_eq!(parsed.id, RequestId(1));
        assert!(matches!(parsed.result, ResponseResult::Success(_)));
    }

    #[test]
    fn test_response_result_conversion() {
        let value_result: ResponseResult = json!({"data": 42}).into();
        assert!(matches!(value_result, ResponseResult::Success(_)));

        let null_result: ResponseResult = json!(null).into();
        assert!(matches!(null_result, ResponseResult::Null));

        let void_result: ResponseResult = ().into();
        assert!(matches!(void_result, ResponseResult::Null));
    }

    #[test]
    fn test_message_id_accessor() {
        let ok = JsonRpcMessage::success(RequestId(5), ResponseResult::null());
        assert_eq!(ok.id(), Some(RequestId(5)));
        assert!(!ok.is_error());

        let err = JsonRpcMessage::error(JsonRpcError::parse_error());
        assert_eq!(err.id(), None);
        assert!(err.is_error());
    }

    #[test]
    fn test_into_outcome() {
        let ok = JsonRpcMessage::success(RequestId(5), ResponseResult::Success(json!(1)));
        assert!(ok.into_outcome().is_ok());

        let err = JsonRpcMessage::error(JsonRpcError::method_not_found(RequestId(5), "nope"));
        let outcome = err.into_outcome().unwrap_err();
        assert_eq!(outcome.code, crate::error_codes::METHOD_NOT_FOUND);
    }
}
