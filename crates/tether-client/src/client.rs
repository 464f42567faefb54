//! Tether client over streamable HTTP.
//!
//! One client owns one session: `connect()` performs the handshake and binds
//! the session id the server hands back; `request()`/`notify()` carry the
//! session header on every exchange; `listen()` attaches the standalone
//! event stream for asynchronous server pushes. Server-initiated requests
//! arriving on any stream are dispatched through the client-side feature
//! registry and their answers POSTed back on the same session.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use tether_json_rpc::{
    BatchCall, IncomingMessage, JsonRpcErrorObject, JsonRpcRequest, MessageDeframer, RequestId,
    RequestParams, ResponseResult, codec, process_requests,
};
use tether_protocol::{
    Feature, FeatureContext, FeatureRegistry, HandshakeParams, HandshakeResult,
    NotificationListener, PeerInfo, ProtocolVersion, RegistryError, methods,
};
use tether_session::Session;

use crate::config::ClientConfig;
use crate::error::{ProtocolError, Result, TetherClientError, TransportError};
use crate::sse::SseEventParser;

/// Session identifier header; mirrors the server-side constant
pub const SESSION_ID_HEADER: &str = "Tether-Session-Id";

/// Protocol version header
pub const PROTOCOL_VERSION_HEADER: &str = "Tether-Protocol-Version";

/// The handshake precedes the session and its id sequence
const HANDSHAKE_REQUEST_ID: RequestId = RequestId(0);

/// Delay between event-stream reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Builder assembling the endpoint, configuration, and client-side feature
/// registry before any traffic starts. `build()` freezes the registry.
pub struct TetherClientBuilder {
    endpoint: String,
    config: ClientConfig,
    registry: FeatureRegistry,
}

impl TetherClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: ClientConfig::default(),
            registry: FeatureRegistry::new(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the client identity reported in the handshake
    pub fn client_info(mut self, info: PeerInfo) -> Self {
        self.config.client_info = info;
        self
    }

    /// Declare willingness to accept event-stream delivery
    pub fn streaming(mut self, enable: bool) -> Self {
        self.config.capabilities.streaming = enable;
        self
    }

    /// Register a capability provider for server-initiated traffic; fails on
    /// capability collision
    pub fn register_feature(
        mut self,
        feature: Arc<dyn Feature>,
    ) -> std::result::Result<Self, RegistryError> {
        self.registry.register(feature)?;
        Ok(self)
    }

    /// Register a listener for all inbound notifications
    pub fn add_listener(mut self, listener: Arc<dyn NotificationListener>) -> Self {
        self.registry.add_listener(listener);
        self
    }

    /// Freeze the registry and build the client
    pub fn build(self) -> Result<TetherClient> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| TetherClientError::config(format!("invalid endpoint URL: {}", e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TetherClientError::config(format!(
                "unsupported endpoint scheme '{}'",
                endpoint.scheme()
            )));
        }

        let http = HttpClient::builder()
            .connect_timeout(self.config.timeouts.connect)
            .user_agent(concat!("tether-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("failed to build HTTP client: {}", e))
            })?;

        // The registered features define what this client can answer
        let mut config = self.config;
        config
            .capabilities
            .methods
            .extend(self.registry.capability_superset());

        Ok(TetherClient {
            http,
            endpoint,
            config,
            registry: Arc::new(self.registry),
            session: Mutex::new(None),
            listener: Mutex::new(None),
        })
    }
}

/// Tether protocol client bound to one server endpoint
pub struct TetherClient {
    http: HttpClient,
    endpoint: Url,
    config: ClientConfig,
    registry: Arc<FeatureRegistry>,
    session: Mutex<Option<Session>>,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TetherClient {
    pub fn builder(endpoint: impl Into<String>) -> TetherClientBuilder {
        TetherClientBuilder::new(endpoint)
    }

    /// The live session, if connected
    pub fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(Session::is_active)
            .unwrap_or(false)
    }

    fn require_session(&self) -> Result<Session> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| ProtocolError::NotConnected.into())
    }

    /// Perform the handshake and bind the returned session.
    ///
    /// Streaming is fixed here for the session's lifetime: it requires this
    /// client to have declared it, the server to have granted it, and the
    /// negotiated protocol version to support it.
    pub async fn connect(&self) -> Result<HandshakeResult> {
        if self.session.lock().is_some() {
            return Err(TetherClientError::config("already connected"));
        }

        let params = HandshakeParams::new(
            self.config.capabilities.clone(),
            self.config.client_info.clone(),
        );
        let request = JsonRpcRequest::new(
            HANDSHAKE_REQUEST_ID,
            methods::HANDSHAKE,
            Some(value_to_params(serde_json::to_value(&params)?)?),
        );
        let body = serde_json::to_vec(&request)?;

        let response = timeout(
            self.config.timeouts.handshake,
            self.send_with_retry(&body, None, false),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned)
        else {
            return Err(ProtocolError::MissingSessionId.into());
        };

        let bytes = response.bytes().await.map_err(TransportError::Http)?;
        let message = codec::decode_response(&bytes)
            .map_err(|e| ProtocolError::InvalidResponse(e.to_string()))?;
        let result = message
            .into_outcome()
            .map_err(TetherClientError::from_error_object)?;
        let result: HandshakeResult = serde_json::from_value(result.into_value())
            .map_err(|e| ProtocolError::InvalidResponse(format!("malformed handshake result: {}", e)))?;

        let Some(version) = ProtocolVersion::parse_version(&result.protocol_version) else {
            return Err(ProtocolError::UnsupportedVersion(result.protocol_version).into());
        };
        let streaming = self.config.capabilities.streaming
            && result.capabilities.streaming
            && version.supports_streaming();

        let session = Session::new(
            session_id,
            version,
            result.capabilities.clone(),
            streaming,
            self.config.timeouts.request,
        );
        info!(
            session_id = %session.id(),
            server = %result.server_info.name,
            version = %version,
            streaming,
            "connected"
        );
        *self.session.lock() = Some(session);

        self.notify(methods::READY, None).await?;
        Ok(result)
    }

    /// Issue a request on the session and await its outcome.
    ///
    /// A unary reply resolves the pending entry directly. An event-stream
    /// reply is consumed incrementally: every document on the stream is
    /// routed (responses to the pending table, notifications to the
    /// registry, server-initiated requests to dispatch) until the stream
    /// ends with the final response.
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
    ) -> Result<ResponseResult> {
        let session = self.require_session()?;
        let (request, handle) = session.send_request(method, params)?;
        let body = serde_json::to_vec(&request)?;

        debug!(session_id = %session.id(), id = %request.id, method = %request.method, "sending request");

        let response = match self
            .send_with_retry(&body, Some(session.id()), session.streaming_enabled())
            .await
        {
            Ok(response) => response,
            Err(err) => {
                // Clear the dead pending entry instead of letting it ride
                // to its timeout
                session.resolve_response(
                    request.id,
                    Err(JsonRpcErrorObject::internal_error(Some(
                        "request was never delivered".to_string(),
                    ))),
                );
                return Err(err);
            }
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            let router = self.router(session.clone());
            drain_event_stream(&router, response).await?;
        } else {
            let bytes = response.bytes().await.map_err(TransportError::Http)?;
            let message = codec::decode_response(&bytes)
                .map_err(|e| ProtocolError::InvalidResponse(e.to_string()))?;
            session.resolve_message(message);
        }

        Ok(handle.wait().await?)
    }

    /// Send a fire-and-forget notification on the session
    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
    ) -> Result<()> {
        let session = self.require_session()?;
        let notification = session.send_notification(method, params)?;
        let body = serde_json::to_vec(&notification)?;

        let response = self
            .send_with_retry(&body, Some(session.id()), false)
            .await?;
        debug!(
            session_id = %session.id(),
            method = %notification.method,
            status = %response.status(),
            "notification acknowledged"
        );
        Ok(())
    }

    /// Send a connectivity probe
    pub async fn ping(&self) -> Result<()> {
        self.request(methods::PING, None).await?;
        Ok(())
    }

    /// Attach the standalone server→client event stream.
    ///
    /// A background task consumes the stream and routes each document:
    /// notifications fan out through the client registry, server-initiated
    /// requests are dispatched and answered, responses resolve the pending
    /// table. The task reconnects on stream loss and exits when the session
    /// closes or the server forgets it.
    pub async fn listen(&self) -> Result<()> {
        let session = self.require_session()?;
        if !session.streaming_enabled() {
            return Err(TetherClientError::config(
                "session did not negotiate streaming",
            ));
        }

        let router = self.router(session);
        let handle = tokio::spawn(run_event_listener(router));
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Close the session: best-effort DELETE to the server, then local
    /// teardown draining every pending handle. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };

        let result = self
            .http
            .delete(self.endpoint.clone())
            .header(SESSION_ID_HEADER, session.id())
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                info!(session_id = %session.id(), "session closed");
            }
            Ok(response) => {
                warn!(
                    session_id = %session.id(),
                    status = %response.status(),
                    "session DELETE rejected, closing locally"
                );
            }
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "session DELETE failed, closing locally");
            }
        }

        session.close();
        Ok(())
    }

    fn router(&self, session: Session) -> EventRouter {
        EventRouter {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            registry: Arc::clone(&self.registry),
            session,
        }
    }

    /// POST one serialized message, honoring the retry configuration for
    /// retryable transport failures
    async fn send_with_retry(
        &self,
        body: &[u8],
        session_id: Option<&str>,
        accept_stream: bool,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..self.config.retry.max_attempts {
            if attempt > 0 {
                let delay = self.config.retry.delay_for_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                tokio::time::sleep(delay).await;
            }

            match self.post_document(body, session_id, accept_stream).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !err.is_retryable() || !self.config.retry.should_retry(attempt + 1) {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "request attempt failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::ConnectionFailed("all retry attempts failed".to_string()).into()
        }))
    }

    async fn post_document(
        &self,
        body: &[u8],
        session_id: Option<&str>,
        accept_stream: bool,
    ) -> Result<reqwest::Response> {
        let accept = if accept_stream {
            "application/json, text/event-stream"
        } else {
            "application/json"
        };

        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .header(PROTOCOL_VERSION_HEADER, ProtocolVersion::LATEST.as_str())
            .body(body.to_vec());
        if let Some(session_id) = session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }

        let response = timeout(self.config.timeouts.request, builder.send())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::Http)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::UnknownSession.into());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response)
    }
}

impl Drop for TetherClient {
    /// Best-effort session cleanup when the client is dropped without an
    /// explicit `close()`. Drop cannot await, so the DELETE goes out on a
    /// spawned task; local teardown happens either way.
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        let Some(session) = self.session.lock().take() else {
            return;
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let http = self.http.clone();
            let endpoint = self.endpoint.clone();
            runtime.spawn(async move {
                debug!(session_id = %session.id(), "client dropped, cleaning up session");
                if let Err(err) = http
                    .delete(endpoint)
                    .header(SESSION_ID_HEADER, session.id())
                    .send()
                    .await
                {
                    warn!(session_id = %session.id(), error = %err, "DELETE during drop cleanup failed");
                }
                session.close();
            });
        } else {
            session.close();
        }
    }
}

impl std::fmt::Debug for TetherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("session", &self.session.lock().as_ref().map(|s| s.id().to_string()))
            .finish()
    }
}

/// Routes documents arriving on an event stream.
///
/// Responses resolve the session's pending table by id; notifications fan
/// out through the client registry; server-initiated requests are dispatched
/// and their answers POSTed back on the session. Routing failures are
/// logged, never propagated, so one bad document cannot kill the stream.
struct EventRouter {
    http: HttpClient,
    endpoint: Url,
    registry: Arc<FeatureRegistry>,
    session: Session,
}

impl EventRouter {
    fn context(&self) -> FeatureContext {
        FeatureContext::for_session(
            self.session.id(),
            self.session.peer_capabilities().clone(),
            None,
        )
    }

    async fn route(&self, document: Value) {
        match codec::decode_message_value(&document) {
            Ok(IncomingMessage::Response(message)) => self.session.resolve_message(message),
            Ok(IncomingMessage::ResponseBatch(batch)) => {
                for message in batch.messages {
                    self.session.resolve_message(message);
                }
            }
            Ok(IncomingMessage::Notification(notification)) => {
                let cx = self.context();
                self.registry.dispatch_notification(&notification, &cx).await;
            }
            Ok(IncomingMessage::Request(request)) => {
                debug!(session_id = %self.session.id(), method = %request.method, "server-initiated request");
                let cx = self.context();
                let response = self.registry.dispatch_request(request, &cx).await;
                self.answer(&response).await;
            }
            Ok(IncomingMessage::RequestBatch(batch)) => {
                let cx = self.context();
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
                if !responses.is_empty() {
                    self.answer(&responses).await;
                }
            }
            Err(err) => {
                warn!(session_id = %self.session.id(), error = %err, "dropping malformed stream document");
            }
        }
    }

    /// POST an answer to server-initiated traffic back on the session
    async fn answer<T: Serialize>(&self, response: &T) {
        let body = match serde_json::to_vec(response) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to serialize answer");
                return;
            }
        };

        let result = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(SESSION_ID_HEADER, self.session.id())
            .header(
                PROTOCOL_VERSION_HEADER,
                self.session.protocol_version().as_str(),
            )
            .body(body)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "server rejected answer delivery");
            }
            Err(err) => warn!(error = %err, "failed to deliver answer"),
        }
    }
}

/// Consume one event-stream response to its end, routing every document
async fn drain_event_stream(router: &EventRouter, response: reqwest::Response) -> Result<()> {
    let mut stream = response.bytes_stream();
    let mut parser = SseEventParser::new();
    let mut deframer = MessageDeframer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TransportError::Http)?;
        for payload in parser.feed(&chunk) {
            deframer.feed(payload.as_bytes()).map_err(ProtocolError::Framing)?;
            while let Some(document) = deframer.next() {
                router.route(document).await;
            }
        }
    }
    Ok(())
}

/// Standalone event-stream loop: connect, drain, reconnect on loss; exit
/// when the session is closed locally or forgotten by the server
async fn run_event_listener(router: EventRouter) {
    loop {
        if !router.session.is_active() {
            return;
        }

        let response = router
            .http
            .get(router.endpoint.clone())
            .header(ACCEPT, "text/event-stream")
            .header(SESSION_ID_HEADER, router.session.id())
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                warn!(session_id = %router.session.id(), "server forgot the session, closing locally");
                router.session.close();
                return;
            }
            Ok(response) if response.status().is_success() => {
                debug!(session_id = %router.session.id(), "event stream attached");
                if let Err(err) = drain_event_stream(&router, response).await {
                    warn!(session_id = %router.session.id(), error = %err, "event stream failed");
                } else {
                    info!(session_id = %router.session.id(), "event stream ended");
                }
            }
            Ok(response) => {
                warn!(
                    session_id = %router.session.id(),
                    status = %response.status(),
                    "event stream rejected"
                );
            }
            Err(err) => {
                warn!(session_id = %router.session.id(), error = %err, "event stream connection failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Convert a serialized params value into the wire params shape
fn value_to_params(value: Value) -> Result<RequestParams> {
    match value {
        Value::Object(map) => Ok(RequestParams::Object(map.into_iter().collect())),
        Value::Array(items) => Ok(RequestParams::Array(items)),
        other => Err(TetherClientError::config(format!(
            "params must be an object or array, got {}",
            other
        ))),
    }
}
