use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::ACCEPT;
use hyper::{Method, Request, StatusCode};
use serde_json::{Value, json};

use crate::headers::SESSION_ID_HEADER;
use crate::tests::{
    body_json, open_session, post_request, streaming_post_request, test_handler,
};

fn get_stream_request(session_id: &str) -> Request<http_body_util::Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri("/rpc")
        .header(ACCEPT, "text/event-stream")
        .header(SESSION_ID_HEADER, session_id)
        .body(http_body_util::Full::new(Bytes::new()))
        .unwrap()
}

/// Parse one SSE data frame into its JSON document
fn parse_sse_data(frame: &[u8]) -> Value {
    let text = std::str::from_utf8(frame).unwrap();
    let data = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("frame carries a data line");
    serde_json::from_str(data).unwrap()
}

#[tokio::test]
async fn test_streaming_post_delivers_response_as_event() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, true).await;

    let response = handler
        .handle(streaming_post_request(
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            &session_id,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    // The stream ends after the final response document
    let collected = response.into_body().collect().await.unwrap().to_bytes();
    let document = parse_sse_data(&collected);
    assert_eq!(document["id"], json!(2));
    assert_eq!(document["result"], json!({}));
}

#[tokio::test]
async fn test_unary_session_never_streams() {
    let handler = test_handler(true);
    // Session negotiated without streaming; Accept alone must not enable it
    let session_id = open_session(&handler, false).await;

    let response = handler
        .handle(streaming_post_request(
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
            &session_id,
        ))
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let payload = body_json(response).await;
    assert_eq!(payload["id"], json!(3));
}

#[tokio::test]
async fn test_notifications_never_stream() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, true).await;

    let mut request = streaming_post_request(
        r#"{"jsonrpc":"2.0","method":"notifications/log"}"#,
        &session_id,
    );
    request
        .headers_mut()
        .insert(ACCEPT, "text/event-stream".parse().unwrap());
    let response = handler.handle(request).await.unwrap();

    // Simple acknowledgement, not an event stream
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_get_stream_requires_accept_header() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, true).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/rpc")
        .header(SESSION_ID_HEADER, &session_id)
        .body(http_body_util::Full::new(Bytes::new()))
        .unwrap();
    let response = handler.handle(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_stream_unknown_session() {
    let handler = test_handler(true);
    let response = handler
        .handle(get_stream_request("no-such-session"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_stream_rejected_without_negotiation() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, false).await;

    let response = handler.handle(get_stream_request(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notify_peer_reaches_open_stream() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, true).await;

    let response = handler.handle(get_stream_request(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let delivered = handler
        .notify_peer(
            &session_id,
            tether_json_rpc::JsonRpcNotification::new_with_object_params(
                "notifications/changed",
                [("scope".to_string(), json!("tools"))].into_iter().collect(),
            ),
        )
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    let frame = body.frame().await.unwrap().unwrap();
    let document = parse_sse_data(frame.data_ref().unwrap());
    assert_eq!(document["method"], json!("notifications/changed"));
    assert_eq!(document["params"]["scope"], json!("tools"));
}

#[tokio::test]
async fn test_server_initiated_request_round_trip() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, true).await;

    // Client attaches its event stream
    let response = handler.handle(get_stream_request(&session_id)).await.unwrap();
    let mut body = response.into_body();

    // Server issues a request to the client
    let handle = handler
        .request_peer(&session_id, "agent/confirm", None)
        .await
        .unwrap();

    // The request document arrives on the stream
    let frame = body.frame().await.unwrap().unwrap();
    let document = parse_sse_data(frame.data_ref().unwrap());
    assert_eq!(document["method"], json!("agent/confirm"));
    let id = document["id"].as_i64().unwrap();

    // The client answers by POSTing a response document on the session
    let answer = format!(
        r#"{{"jsonrpc":"2.0","id":{},"result":{{"confirmed":true}}}}"#,
        id
    );
    let response = handler
        .handle(post_request(&answer, Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The pending handle resolves by id
    let outcome = handle.wait().await.unwrap();
    assert_eq!(
        outcome,
        tether_json_rpc::ResponseResult::Success(json!({"confirmed": true}))
    );
}

#[tokio::test]
async fn test_request_peer_without_stream_fails_fast() {
    let handler = test_handler(true);
    let session_id = open_session(&handler, true).await;

    let err = handler
        .request_peer(&session_id, "agent/confirm", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no open event stream"));
}
