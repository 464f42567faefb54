//! HTTP response builders shared by the handler.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ALLOW, CONNECTION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

use tether_json_rpc::{JsonRpcError, JsonRpcErrorObject};

use crate::headers::SESSION_ID_HEADER;
use crate::streams::ServerBody;

fn full(body: impl Into<Bytes>) -> ServerBody {
    Full::new(body.into()).boxed_unsync()
}

/// JSON body with optional session header. JSON-RPC level failures still use
/// HTTP 200; only transport-level failures use error statuses.
pub(crate) fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
    session_id: Option<&str>,
) -> Response<ServerBody> {
    let payload = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#.to_string());

    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json");
    if let Some(session_id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, session_id);
    }
    builder
        .body(full(payload))
        .expect("static response headers are valid")
}

/// 202 acknowledgement for notifications and inbound responses
pub(crate) fn accepted_response(session_id: Option<&str>) -> Response<ServerBody> {
    let mut builder = Response::builder().status(StatusCode::ACCEPTED);
    if let Some(session_id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, session_id);
    }
    builder
        .body(full(Bytes::new()))
        .expect("static response headers are valid")
}

pub(crate) fn plain_response(status: StatusCode, message: &str) -> Response<ServerBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(full(message.to_string()))
        .expect("static response headers are valid")
}

/// 405 with the out-of-range method-not-allowed code in the body
pub(crate) fn method_not_allowed_response() -> Response<ServerBody> {
    let error = JsonRpcError::new(
        None,
        JsonRpcErrorObject::method_not_allowed("HTTP method not allowed; use POST, GET, or DELETE"),
    );
    let payload = serde_json::to_string(&error).unwrap_or_default();
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(ALLOW, "POST, GET, DELETE")
        .header(CONTENT_TYPE, "application/json")
        .body(full(payload))
        .expect("static response headers are valid")
}

/// 413 for a message over the deframer limit; the connection is closed
/// because the framing state is unrecoverable
pub(crate) fn too_large_response(limit: usize) -> Response<ServerBody> {
    Response::builder()
        .status(StatusCode::PAYLOAD_TOO_LARGE)
        .header(CONTENT_TYPE, "text/plain")
        .header(CONNECTION, "close")
        .body(full(format!("message exceeds the {} byte limit", limit)))
        .expect("static response headers are valid")
}
