//! JSON-RPC over HTTP handling with session routing.
//!
//! One handler instance serves every connection. It owns the frozen feature
//! registry, the session store, and the event-stream manager; per-request
//! state lives on the stack. Handlers are generic over the HTTP body type so
//! tests can drive them with `Full<Bytes>` requests.

use std::sync::Arc;

use bytes::Buf;
use http_body::Body;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tether_json_rpc::{
    BatchCall, DeframeError, IncomingMessage, JsonRpcError, JsonRpcErrorObject, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, MessageDeframer, RequestBatch, RequestParams,
    ResponseResult, codec, process_requests,
};
use tether_protocol::{
    FeatureContext, FeatureRegistry, HandshakeParams, HandshakeResult, PeerCapabilities, PeerInfo,
    ProtocolVersion, SharedNotificationSink, methods,
};
use tether_session::{ResponseHandle, Session, SharedSessionStore};

use crate::headers::{PROTOCOL_VERSION_HEADER, extract_session_id};
use crate::responses::{
    accepted_response, json_response, method_not_allowed_response, plain_response,
    too_large_response,
};
use crate::server::ServerConfig;
use crate::streams::{
    EventStreamManager, ExchangeSink, ServerBody, SessionStreamSink, sse_response,
};
use crate::{HttpServerError, Result};

/// Request handler bound to one server's registry, store, and streams
#[derive(Clone)]
pub struct SessionHttpHandler {
    pub(crate) config: ServerConfig,
    registry: Arc<FeatureRegistry>,
    store: SharedSessionStore,
    streams: Arc<EventStreamManager>,
    server_info: PeerInfo,
}

impl SessionHttpHandler {
    pub fn new(
        config: ServerConfig,
        registry: Arc<FeatureRegistry>,
        store: SharedSessionStore,
        streams: Arc<EventStreamManager>,
        server_info: PeerInfo,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            streams,
            server_info,
        }
    }

    pub fn streams(&self) -> &Arc<EventStreamManager> {
        &self.streams
    }

    /// Route one HTTP exchange
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<ServerBody>>
    where
        B: Body + Unpin,
        B::Data: Buf,
        B::Error: std::fmt::Display,
    {
        match req.method() {
            &Method::POST => self.handle_post(req).await,
            &Method::GET => self.handle_stream_get(req).await,
            &Method::DELETE => self.handle_delete(req).await,
            _ => Ok(method_not_allowed_response()),
        }
    }

    /// Issue a server-initiated request to the client over the session's
    /// event stream; the answer comes back as a POSTed response document and
    /// resolves the returned handle by id.
    pub async fn request_peer(
        &self,
        session_id: &str,
        method: impl Into<String>,
        params: Option<RequestParams>,
    ) -> Result<ResponseHandle> {
        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| HttpServerError::SessionNotFound(session_id.to_string()))?;

        let (request, handle) = session.send_request(method, params)?;
        let message = serde_json::to_value(&request)?;
        match self.streams.push(session_id, message).await {
            Ok(_) => Ok(handle),
            Err(err) => {
                // Fail the entry now instead of letting it ride to timeout
                session.resolve_response(
                    request.id,
                    Err(JsonRpcErrorObject::internal_error(Some(
                        "no open event stream to deliver request".to_string(),
                    ))),
                );
                let _ = handle.wait().await;
                Err(err.into())
            }
        }
    }

    /// Push a notification to the client over the session's event stream
    pub async fn notify_peer(
        &self,
        session_id: &str,
        notification: JsonRpcNotification,
    ) -> Result<usize> {
        let message = serde_json::to_value(&notification)?;
        Ok(self.streams.push(session_id, message).await?)
    }

    async fn handle_post<B>(&self, req: Request<B>) -> Result<Response<ServerBody>>
    where
        B: Body + Unpin,
        B::Data: Buf,
        B::Error: std::fmt::Display,
    {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("application/json") {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "Content-Type must be application/json",
            ));
        }

        let accepts_stream = req
            .headers()
            .get(ACCEPT)
            .and_then(|accept| accept.to_str().ok())
            .unwrap_or("application/json")
            .contains("text/event-stream");
        let session_id = extract_session_id(req.headers());

        let document = match self.read_document(req.into_body()).await {
            Ok(document) => document,
            Err(response) => return Ok(response),
        };

        let message = match codec::decode_message_value(&document) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "rejecting malformed message");
                return Ok(json_response(
                    StatusCode::OK,
                    &err.to_error_response(),
                    session_id.as_deref(),
                ));
            }
        };

        // The handshake creates the session; everything else routes by the
        // session header when one is present.
        if let IncomingMessage::Request(request) = &message {
            if request.method == methods::HANDSHAKE {
                return self.handle_handshake(request.clone()).await;
            }
        }

        let session = match &session_id {
            Some(id) => match self.store.get(id).await? {
                Some(session) => {
                    let _ = self.store.touch(id).await;
                    Some(session)
                }
                None => {
                    warn!(session_id = %id, "unknown session id");
                    return Ok(plain_response(StatusCode::NOT_FOUND, "Session not found"));
                }
            },
            None => None,
        };

        match message {
            IncomingMessage::Request(request) => {
                self.dispatch_request(request, session, accepts_stream).await
            }
            IncomingMessage::Notification(notification) => {
                let cx = self.context_for(session.as_ref());
                self.registry.dispatch_notification(&notification, &cx).await;
                Ok(accepted_response(session_id.as_deref()))
            }
            IncomingMessage::Response(response) => {
                let Some(session) = session else {
                    return Ok(plain_response(
                        StatusCode::BAD_REQUEST,
                        "response delivery requires a session",
                    ));
                };
                session.resolve_message(response);
                Ok(accepted_response(session_id.as_deref()))
            }
            IncomingMessage::RequestBatch(batch) => {
                self.dispatch_batch(batch, session.as_ref(), session_id.as_deref())
                    .await
            }
            IncomingMessage::ResponseBatch(batch) => {
                let Some(session) = session else {
                    return Ok(plain_response(
                        StatusCode::BAD_REQUEST,
                        "response delivery requires a session",
                    ));
                };
                for response in batch.messages {
                    session.resolve_message(response);
                }
                Ok(accepted_response(session_id.as_deref()))
            }
        }
    }

    /// Drive the body through the deframer and require exactly one document
    /// per exchange
    async fn read_document<B>(&self, mut body: B) -> std::result::Result<Value, Response<ServerBody>>
    where
        B: Body + Unpin,
        B::Data: Buf,
        B::Error: std::fmt::Display,
    {
        use http_body_util::BodyExt;

        let mut deframer = MessageDeframer::new(self.config.max_message_size);

        let feed_result: std::result::Result<(), Response<ServerBody>> = async {
            while let Some(frame) = body.frame().await {
                let frame = frame.map_err(|err| {
                    warn!(error = %err, "failed to read request body");
                    plain_response(StatusCode::BAD_REQUEST, "failed to read request body")
                })?;
                if let Ok(mut data) = frame.into_data() {
                    while data.has_remaining() {
                        let chunk = data.chunk();
                        let len = chunk.len();
                        deframer.feed(chunk).map_err(|err| self.deframe_failure(err))?;
                        data.advance(len);
                    }
                }
            }
            deframer.finish().map_err(|err| self.deframe_failure(err))?;
            Ok(())
        }
        .await;
        feed_result?;

        let first = deframer.next();
        match (first, deframer.next()) {
            (Some(document), None) => Ok(document),
            (Some(_), Some(_)) => Err(json_response(
                StatusCode::OK,
                &JsonRpcError::new(
                    None,
                    JsonRpcErrorObject::invalid_request(Some(Value::String(
                        "one exchange carries one document".into(),
                    ))),
                ),
                None,
            )),
            (None, _) => Err(json_response(
                StatusCode::OK,
                &JsonRpcError::parse_error(),
                None,
            )),
        }
    }

    fn deframe_failure(&self, err: DeframeError) -> Response<ServerBody> {
        match err {
            DeframeError::MessageTooLarge { limit, .. } => {
                warn!(limit, "request exceeded message size limit");
                too_large_response(limit)
            }
            other => {
                debug!(error = %other, "request body framing error");
                json_response(
                    StatusCode::OK,
                    &JsonRpcError::new(
                        None,
                        JsonRpcErrorObject::parse_error(Some(Value::String(other.to_string()))),
                    ),
                    None,
                )
            }
        }
    }

    fn context_for(&self, session: Option<&Session>) -> FeatureContext {
        match session {
            Some(session) => FeatureContext::for_session(
                session.id(),
                session.peer_capabilities().clone(),
                Some(Arc::new(SessionStreamSink::new(
                    Arc::clone(&self.streams),
                    session.id(),
                )) as SharedNotificationSink),
            ),
            None => FeatureContext::stateless(),
        }
    }

    async fn handle_handshake(&self, request: JsonRpcRequest) -> Result<Response<ServerBody>> {
        let id = request.id;
        let params_value = request
            .params
            .map(|params| params.to_value())
            .unwrap_or(Value::Null);

        let params: HandshakeParams = match serde_json::from_value(params_value) {
            Ok(params) => params,
            Err(err) => {
                return Ok(json_response(
                    StatusCode::OK,
                    &JsonRpcError::invalid_params(id, &format!("malformed handshake: {}", err)),
                    None,
                ));
            }
        };

        let Some(version) = ProtocolVersion::parse_version(&params.protocol_version) else {
            return Ok(json_response(
                StatusCode::OK,
                &JsonRpcError::new(
                    Some(id),
                    tether_protocol::TetherError::UnsupportedVersion(params.protocol_version)
                        .to_error_object(),
                ),
                None,
            ));
        };

        // Streaming is fixed here for the session's lifetime
        let streaming = self.config.enable_streaming
            && params.capabilities.streaming
            && version.supports_streaming();

        let session = Session::new(
            Session::generate_id(),
            version,
            params.capabilities,
            streaming,
            self.config.request_timeout,
        );
        let session_id = session.id().to_string();

        if let Err(err) = self.store.insert(session).await {
            warn!(error = %err, "failed to store new session");
            return Ok(json_response(
                StatusCode::OK,
                &JsonRpcError::internal_error(Some(id), Some(err.to_string())),
                None,
            ));
        }

        info!(
            session_id = %session_id,
            client = %params.client_info.name,
            version = %version,
            streaming,
            "session established"
        );

        let result = HandshakeResult::new(
            version,
            PeerCapabilities {
                methods: self.registry.capability_superset().clone(),
                streaming,
            },
            self.server_info.clone(),
        );
        let response = JsonRpcMessage::success(id, ResponseResult::Success(serde_json::to_value(result)?));

        let mut http_response = json_response(StatusCode::OK, &response, Some(&session_id));
        http_response.headers_mut().insert(
            PROTOCOL_VERSION_HEADER,
            version
                .as_str()
                .parse()
                .expect("version strings are valid header values"),
        );
        Ok(http_response)
    }

    async fn dispatch_request(
        &self,
        request: JsonRpcRequest,
        session: Option<Session>,
        accepts_stream: bool,
    ) -> Result<Response<ServerBody>> {
        // Event-stream delivery only for requests on streaming sessions whose
        // client accepts it on this exchange; notifications never stream.
        let streaming = session
            .as_ref()
            .map(|session| session.streaming_enabled())
            .unwrap_or(false)
            && accepts_stream;

        if streaming {
            let session = session.expect("streaming implies a session");
            return Ok(self.dispatch_streaming(request, session).await);
        }

        let session_id = session.as_ref().map(|session| session.id().to_string());
        let cx = self.context_for(session.as_ref());
        let response = self.registry.dispatch_request(request, &cx).await;
        Ok(json_response(
            StatusCode::OK,
            &response,
            session_id.as_deref(),
        ))
    }

    /// Answer one request as an event stream: progress notifications pushed
    /// by the handler during processing precede the final response document.
    async fn dispatch_streaming(
        &self,
        request: JsonRpcRequest,
        session: Session,
    ) -> Response<ServerBody> {
        let capacity = self.streams.options().queue_capacity;
        let keepalive = self.streams.options().keepalive_interval;
        let (sender, receiver) = mpsc::channel::<Value>(capacity);

        let cx = FeatureContext::for_session(
            session.id(),
            session.peer_capabilities().clone(),
            Some(Arc::new(ExchangeSink::new(sender.clone())) as SharedNotificationSink),
        );
        let registry = Arc::clone(&self.registry);
        let session_id = session.id().to_string();

        tokio::spawn(async move {
            let method = request.method.clone();
            let response = registry.dispatch_request(request, &cx).await;
            match serde_json::to_value(&response) {
                Ok(message) => {
                    if sender.send(message).await.is_err() {
                        debug!(method = %method, "client went away before the final response");
                    }
                }
                Err(err) => warn!(method = %method, error = %err, "failed to serialize response"),
            }
            // Dropping the sender ends the stream after the final document
        });

        sse_response(&session_id, receiver, keepalive)
    }

    async fn dispatch_batch(
        &self,
        batch: RequestBatch,
        session: Option<&Session>,
        session_id: Option<&str>,
    ) -> Result<Response<ServerBody>> {
        let cx = self.context_for(session);
        let registry = Arc::clone(&self.registry);

        let responses = process_requests(batch, |call| {
            let registry = Arc::clone(&registry);
            let cx = cx.clone();
            async move {
                match call {
                    BatchCall::Request(request) => {
                        Some(registry.dispatch_request(request, &cx).await)
                    }
                    BatchCall::Notification(notification) => {
                        registry.dispatch_notification(&notification, &cx).await;
                        None
                    }
                }
            }
        })
        .await;

        // All-notification batches acknowledge without a body
        if responses.is_empty() {
            return Ok(accepted_response(session_id));
        }
        Ok(json_response(StatusCode::OK, &responses, session_id))
    }

    async fn handle_stream_get<B>(&self, req: Request<B>) -> Result<Response<ServerBody>>
    where
        B: Body,
    {
        let accepts_stream = req
            .headers()
            .get(ACCEPT)
            .and_then(|accept| accept.to_str().ok())
            .unwrap_or("")
            .contains("text/event-stream");
        if !accepts_stream {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "Accept must include text/event-stream",
            ));
        }

        let Some(session_id) = extract_session_id(req.headers()) else {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "Tether-Session-Id header required for event streams",
            ));
        };

        let Some(session) = self.store.get(&session_id).await? else {
            return Ok(plain_response(StatusCode::NOT_FOUND, "Session not found"));
        };
        if !session.streaming_enabled() {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "session did not negotiate streaming",
            ));
        }

        let (connection_id, receiver) = self.streams.open(&session_id).await;
        debug!(session_id = %session_id, connection_id = %connection_id, "event stream attached");
        Ok(sse_response(
            &session_id,
            receiver,
            self.streams.options().keepalive_interval,
        ))
    }

    async fn handle_delete<B>(&self, req: Request<B>) -> Result<Response<ServerBody>>
    where
        B: Body,
    {
        let Some(session_id) = extract_session_id(req.headers()) else {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                "Tether-Session-Id header required",
            ));
        };

        match self.store.remove(&session_id).await? {
            Some(session) => {
                // Terminal: drain pending handles, then end the streams
                session.close();
                self.streams.close_session(&session_id).await;
                info!(session_id = %session_id, "session closed");
                Ok(plain_response(StatusCode::OK, "Session closed"))
            }
            None => Ok(plain_response(StatusCode::NOT_FOUND, "Session not found")),
        }
    }
}
