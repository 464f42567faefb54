//! Integration tests driving the handler with hand-built HTTP requests.

mod streaming_tests;

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use serde_json::Value;

use tether_protocol::{FeatureRegistry, PeerInfo, PingFeature};
use tether_session::InMemorySessionStore;

use crate::handler::SessionHttpHandler;
use crate::headers::SESSION_ID_HEADER;
use crate::server::ServerConfig;
use crate::streams::{EventStreamManager, ServerBody, StreamOptions};

pub(crate) fn test_handler(enable_streaming: bool) -> SessionHttpHandler {
    let mut registry = FeatureRegistry::new();
    registry.register(Arc::new(PingFeature::new())).unwrap();

    SessionHttpHandler::new(
        ServerConfig {
            enable_streaming,
            ..ServerConfig::default()
        },
        Arc::new(registry),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(EventStreamManager::new(StreamOptions::default())),
        PeerInfo::new("test-server", "0.0.0"),
    )
}

pub(crate) fn post_request(body: &str, session_id: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/rpc")
        .header(CONTENT_TYPE, "application/json");
    if let Some(session_id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, session_id);
    }
    builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

pub(crate) fn streaming_post_request(body: &str, session_id: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri("/rpc")
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json, text/event-stream")
        .header(SESSION_ID_HEADER, session_id)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

pub(crate) async fn body_json(response: Response<ServerBody>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub(crate) async fn body_text(response: Response<ServerBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Perform a handshake and return the allocated session id
pub(crate) async fn open_session(handler: &SessionHttpHandler, streaming: bool) -> String {
    let body = format!(
        r#"{{"jsonrpc":"2.0","id":1,"method":"handshake","params":{{
            "protocolVersion":"2025-01",
            "capabilities":{{"methods":[],"streaming":{}}},
            "clientInfo":{{"name":"test-client","version":"0.0.0"}}
        }}}}"#,
        streaming
    );
    let response = handler.handle(post_request(&body, None)).await.unwrap();
    response
        .headers()
        .get(SESSION_ID_HEADER)
        .expect("handshake must assign a session id")
        .to_str()
        .unwrap()
        .to_string()
}
