//! Strict wire codec for the JSON-RPC envelope.
//!
//! Decoding validates structure in a fixed order: the `jsonrpc` version
//! marker first, then `method` presence, then `params` shape, then `id`
//! typing. Responses must carry exactly one of `result`/`error`. Encoding is
//! `serde` serialization on the model types and omits absent optional fields.

use serde_json::Value;
use thiserror::Error;

use crate::batch::{BatchItem, RequestBatch, ResponseBatch};
use crate::error::{JsonRpcError, JsonRpcErrorObject};
use crate::notification::JsonRpcNotification;
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::{JsonRpcMessage, JsonRpcResponse, ResponseResult};
use crate::types::{JsonRpcVersion, RequestId};

/// A structurally invalid envelope, with the request id when recoverable
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {reason}")]
    InvalidRequest {
        id: Option<RequestId>,
        reason: String,
    },

    #[error("invalid response: {reason}")]
    InvalidResponse {
        id: Option<RequestId>,
        reason: String,
    },

    #[error("batch must not be empty")]
    EmptyBatch,
}

impl DecodeError {
    fn invalid_request(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        DecodeError::InvalidRequest {
            id,
            reason: reason.into(),
        }
    }

    fn invalid_response(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        DecodeError::InvalidResponse {
            id,
            reason: reason.into(),
        }
    }

    /// The error response a peer should receive for this decode failure
    pub fn to_error_response(&self) -> JsonRpcError {
        match self {
            DecodeError::Parse(detail) => JsonRpcError::new(
                None,
                JsonRpcErrorObject::parse_error(Some(Value::String(detail.clone()))),
            ),
            DecodeError::InvalidRequest { id, reason } => JsonRpcError::new(
                *id,
                JsonRpcErrorObject::invalid_request(Some(Value::String(reason.clone()))),
            ),
            DecodeError::InvalidResponse { id, reason } => JsonRpcError::new(
                *id,
                JsonRpcErrorObject::invalid_request(Some(Value::String(reason.clone()))),
            ),
            DecodeError::EmptyBatch => JsonRpcError::new(
                None,
                JsonRpcErrorObject::invalid_request(Some(Value::String(
                    "batch must not be empty".into(),
                ))),
            ),
        }
    }
}

/// Any well-formed inbound document
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcMessage),
    RequestBatch(RequestBatch),
    ResponseBatch(ResponseBatch),
}

/// Best-effort id recovery from a malformed envelope
fn recover_id(value: &Value) -> Option<RequestId> {
    value.get("id").and_then(Value::as_i64).map(RequestId)
}

/// Version marker check shared by every decode path
fn check_version(value: &Value, id: Option<RequestId>) -> Result<(), DecodeError> {
    match value.get("jsonrpc").and_then(Value::as_str) {
        Some(crate::JSONRPC_VERSION) => Ok(()),
        Some(other) => Err(DecodeError::invalid_request(
            id,
            format!("unsupported jsonrpc version '{}'", other),
        )),
        None => Err(DecodeError::invalid_request(
            id,
            "missing jsonrpc version field",
        )),
    }
}

fn decode_params(value: Option<&Value>, id: Option<RequestId>) -> Result<Option<RequestParams>, DecodeError> {
    match value {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(RequestParams::Array(items.clone()))),
        Some(Value::Object(map)) => Ok(Some(RequestParams::Object(
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))),
        Some(_) => Err(DecodeError::invalid_request(
            id,
            "params must be an object or an array",
        )),
    }
}

fn decode_id(value: Option<&Value>) -> Result<Option<RequestId>, DecodeError> {
    match value {
        None => Ok(None),
        Some(v) => match v.as_i64() {
            Some(n) => Ok(Some(RequestId(n))),
            None => Err(DecodeError::invalid_request(
                None,
                "id must be an integer",
            )),
        },
    }
}

/// Decode a single request-side envelope: a request or a notification
pub fn decode_call(value: &Value) -> Result<IncomingMessage, DecodeError> {
    let recovered = recover_id(value);

    if !value.is_object() {
        return Err(DecodeError::invalid_request(
            None,
            "message must be a JSON object",
        ));
    }
    check_version(value, recovered)?;

    let method = match value.get("method").and_then(Value::as_str) {
        Some(m) => m.to_string(),
        None => {
            return Err(DecodeError::invalid_request(
                recovered,
                "missing method field",
            ));
        }
    };
    let params = decode_params(value.get("params"), recovered)?;
    let id = decode_id(value.get("id"))?;

    match id {
        Some(id) => Ok(IncomingMessage::Request(JsonRpcRequest::new(
            id, method, params,
        ))),
        None => Ok(IncomingMessage::Notification(JsonRpcNotification::new(
            method, params,
        ))),
    }
}

/// Decode a single request envelope; a notification here is a failure
pub fn decode_request(bytes: &[u8]) -> Result<JsonRpcRequest, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;
    match decode_call(&value)? {
        IncomingMessage::Request(request) => Ok(request),
        _ => Err(DecodeError::invalid_request(
            None,
            "expected a request with an id",
        )),
    }
}

/// Decode a single response-side envelope (success or error shape)
pub fn decode_response_value(value: &Value) -> Result<JsonRpcMessage, DecodeError> {
    let recovered = recover_id(value);

    if !value.is_object() {
        return Err(DecodeError::invalid_response(
            None,
            "message must be a JSON object",
        ));
    }
    check_version(value, recovered)?;

    let has_result = value.get("result").is_some();
    let error_field = value.get("error");
    if has_result && error_field.is_some() {
        return Err(DecodeError::invalid_response(
            recovered,
            "response carries both result and error",
        ));
    }
    if !has_result && error_field.is_none() {
        return Err(DecodeError::invalid_response(
            recovered,
            "response carries neither result nor error",
        ));
    }

    if let Some(error) = error_field {
        // Error responses may carry id=null when the request was unparseable
        let id = match value.get("id") {
            None => {
                return Err(DecodeError::invalid_response(None, "missing id field"));
            }
            Some(Value::Null) => None,
            Some(v) => match v.as_i64() {
                Some(n) => Some(RequestId(n)),
                None => {
                    return Err(DecodeError::invalid_response(
                        None,
                        "id must be an integer",
                    ));
                }
            },
        };
        let object: JsonRpcErrorObject = serde_json::from_value(error.clone())
            .map_err(|e| DecodeError::invalid_response(id, format!("malformed error object: {}", e)))?;
        return Ok(JsonRpcMessage::Error(JsonRpcError::new(id, object)));
    }

    let id = match value.get("id").and_then(Value::as_i64) {
        Some(n) => RequestId(n),
        None => {
            return Err(DecodeError::invalid_response(
                None,
                "success response requires an integer id",
            ));
        }
    };
    let result = ResponseResult::from(value.get("result").cloned().unwrap_or(Value::Null));
    Ok(JsonRpcMessage::Response(JsonRpcResponse::new(id, result)))
}

/// Decode a single response envelope from raw bytes
pub fn decode_response(bytes: &[u8]) -> Result<JsonRpcMessage, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;
    decode_response_value(&value)
}

/// Decode a request batch: per-item failures become invalid-item markers
pub fn decode_request_batch(items: &[Value]) -> Result<RequestBatch, DecodeError> {
    if items.is_empty() {
        return Err(DecodeError::EmptyBatch);
    }
    let items = items
        .iter()
        .map(|item| match decode_call(item) {
            Ok(IncomingMessage::Request(request)) => BatchItem::Request(request),
            Ok(IncomingMessage::Notification(notification)) => {
                BatchItem::Notification(notification)
            }
            Ok(_) | Err(_) => BatchItem::Invalid(JsonRpcError::invalid_request(recover_id(item))),
        })
        .collect();
    Ok(RequestBatch::from_items(items))
}

/// Decode a response batch; every entry must be a well-formed response
pub fn decode_response_batch(items: &[Value]) -> Result<ResponseBatch, DecodeError> {
    if items.is_empty() {
        return Err(DecodeError::EmptyBatch);
    }
    let messages = items
        .iter()
        .map(decode_response_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResponseBatch { messages })
}

/// Classify and decode any inbound document.
///
/// An array is a batch; the request/response discriminator is taken from the
/// first element that carries a `method` field. A single object is a request,
/// notification, or response depending on its fields.
pub fn decode_message_value(value: &Value) -> Result<IncomingMessage, DecodeError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(DecodeError::EmptyBatch);
            }
            let is_request_batch = items
                .iter()
                .any(|item| item.get("method").is_some());
            if is_request_batch {
                Ok(IncomingMessage::RequestBatch(decode_request_batch(items)?))
            } else {
                Ok(IncomingMessage::ResponseBatch(decode_response_batch(items)?))
            }
        }
        _ if value.get("method").is_some() => decode_call(value),
        _ => Ok(IncomingMessage::Response(decode_response_value(value)?)),
    }
}

/// Decode any inbound document from raw bytes
pub fn decode_message(bytes: &[u8]) -> Result<IncomingMessage, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;
    decode_message_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request_round_trip() {
        let request = JsonRpcRequest::new(
            RequestId(5),
            "tools/run",
            Some(RequestParams::Array(vec![json!(1), json!("a")])),
        );
        let bytes = serde_json::to_vec(&request).unwrap();
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_decode_response_round_trip() {
        let response = JsonRpcMessage::success(
            RequestId(9),
            ResponseResult::Success(json!({"ok": true})),
        );
        let bytes = serde_json::to_vec(&response).unwrap();
        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_decode_error_response_round_trip() {
        let error = JsonRpcMessage::error(JsonRpcError::method_not_found(RequestId(4), "nope"));
        let bytes = serde_json::to_vec(&error).unwrap();
        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded, error);
    }

    #[test]
    fn test_version_is_checked_first() {
        let err = decode_message(br#"{"jsonrpc":"1.0","method":"ping","id":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRequest { .. }));
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_missing_method_recovers_id() {
        let err = decode_message(br#"{"jsonrpc":"2.0","id":3}"#).unwrap_err();
        match err {
            DecodeError::InvalidRequest { id, .. } => assert_eq!(id, Some(RequestId(3))),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_scalar_params_rejected() {
        let err =
            decode_message(br#"{"jsonrpc":"2.0","method":"m","params":5,"id":1}"#).unwrap_err();
        assert!(err.to_string().contains("params"));
    }

    #[test]
    fn test_string_id_rejected() {
        let err =
            decode_message(br#"{"jsonrpc":"2.0","method":"m","id":"abc"}"#).unwrap_err();
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_absent_id_is_notification() {
        let decoded = decode_message(br#"{"jsonrpc":"2.0","method":"notifications/log"}"#).unwrap();
        assert!(matches!(decoded, IncomingMessage::Notification(_)));
    }

    #[test]
    fn test_response_result_xor_error() {
        let both = br#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":-32603,"message":"x"}}"#;
        assert!(matches!(
            decode_response(both).unwrap_err(),
            DecodeError::InvalidResponse { .. }
        ));

        let neither = br#"{"jsonrpc":"2.0","id":1}"#;
        assert!(matches!(
            decode_response(neither).unwrap_err(),
            DecodeError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_error_response_with_null_id() {
        let decoded =
            decode_response(br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)
                .unwrap();
        match decoded {
            JsonRpcMessage::Error(err) => assert_eq!(err.id, None),
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert_eq!(decode_message(b"[]").unwrap_err(), DecodeError::EmptyBatch);
    }

    #[test]
    fn test_batch_keeps_invalid_items() {
        let bytes = br#"[
            {"jsonrpc":"2.0","method":"ping","id":1},
            {"jsonrpc":"2.0","method":"notifications/log"},
            {"not":"a request"}
        ]"#;
        let decoded = decode_message(bytes).unwrap();
        match decoded {
            IncomingMessage::RequestBatch(batch) => {
                assert_eq!(batch.len(), 3);
                assert!(matches!(batch.items()[0], BatchItem::Request(_)));
                assert!(matches!(batch.items()[1], BatchItem::Notification(_)));
                assert!(matches!(batch.items()[2], BatchItem::Invalid(_)));
            }
            other => panic!("expected request batch, got {:?}", other),
        }
    }

    #[test]
    fn test_response_batch_classification() {
        let bytes = br#"[{"jsonrpc":"2.0","id":1,"result":{}}]"#;
        let decoded = decode_message(bytes).unwrap();
        assert!(matches!(decoded, IncomingMessage::ResponseBatch(_)));
    }

    #[test]
    fn test_parse_error_maps_to_minus_32700() {
        let err = decode_message(b"{not json").unwrap_err();
        let response = err.to_error_response();
        assert_eq!(response.error.code, crate::error_codes::PARSE_ERROR);
        assert_eq!(response.id, None);
    }
}
