//! HTTP server with session store integration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use tether_json_rpc::deframe::DEFAULT_MAX_MESSAGE_SIZE;
use tether_protocol::{
    Feature, FeatureRegistry, NotificationListener, PeerInfo, RegistryError,
};
use tether_session::{DEFAULT_REQUEST_TIMEOUT, InMemorySessionStore, SharedSessionStore};

use crate::handler::SessionHttpHandler;
use crate::responses::plain_response;
use crate::streams::{EventStreamManager, ServerBody, StreamOptions};
use crate::Result;

/// Configuration for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Path for the RPC endpoint
    pub rpc_path: String,
    /// Maximum size of a single inbound message
    pub max_message_size: usize,
    /// Offer event-stream delivery to sessions that request it
    pub enable_streaming: bool,
    /// Idle time before a session is expired
    pub session_expiry: Duration,
    /// Timeout for server-initiated requests to the client
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7420".parse().expect("valid literal address"),
            rpc_path: "/rpc".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            enable_streaming: true,
            session_expiry: Duration::from_secs(30 * 60),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Builder assembling the registry, store, and stream options before any
/// traffic starts. `build()` freezes the registry; features cannot be
/// registered on a running server.
pub struct TetherServerBuilder {
    config: ServerConfig,
    registry: FeatureRegistry,
    store: Option<SharedSessionStore>,
    stream_options: StreamOptions,
    server_info: PeerInfo,
}

impl TetherServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: FeatureRegistry::new(),
            store: None,
            stream_options: StreamOptions::default(),
            server_info: PeerInfo::default(),
        }
    }

    /// Set the bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set the RPC endpoint path
    pub fn rpc_path(mut self, path: impl Into<String>) -> Self {
        self.config.rpc_path = path.into();
        self
    }

    /// Set the maximum inbound message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Enable or disable event-stream delivery
    pub fn streaming(mut self, enable: bool) -> Self {
        self.config.enable_streaming = enable;
        self
    }

    /// Set the idle session expiry
    pub fn session_expiry(mut self, expiry: Duration) -> Self {
        self.config.session_expiry = expiry;
        self
    }

    /// Set the timeout for server-initiated requests
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Use a specific session store backend
    pub fn session_store(mut self, store: SharedSessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure event stream queueing and keepalives
    pub fn stream_options(mut self, options: StreamOptions) -> Self {
        self.stream_options = options;
        self
    }

    /// Set the server identity reported in handshake results
    pub fn server_info(mut self, info: PeerInfo) -> Self {
        self.server_info = info;
        self
    }

    /// Register a capability provider; fails on capability collision
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

    /// Freeze the registry and build the server
    pub fn build(self) -> TetherServer {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let streams = Arc::new(EventStreamManager::new(self.stream_options));

        let handler = SessionHttpHandler::new(
            self.config.clone(),
            Arc::new(self.registry),
            Arc::clone(&store),
            streams,
            self.server_info,
        );

        TetherServer {
            config: self.config,
            store,
            handler,
        }
    }
}

impl Default for TetherServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server hosting one feature registry and one session store
#[derive(Clone)]
pub struct TetherServer {
    config: ServerConfig,
    store: SharedSessionStore,
    handler: SessionHttpHandler,
}

impl TetherServer {
    pub fn builder() -> TetherServerBuilder {
        TetherServerBuilder::new()
    }

    /// The request handler, for embedding into an existing hyper service or
    /// for issuing server-initiated traffic (`request_peer`/`notify_peer`)
    pub fn handler(&self) -> &SessionHttpHandler {
        &self.handler
    }

    /// Run the accept loop; never returns under normal operation
    pub async fn run(&self) -> Result<()> {
        self.start_session_expiry();

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        info!("Tether server listening on {}", self.config.bind_address);
        info!("RPC endpoint available at: {}", self.config.rpc_path);
        info!("Session store: {}", self.store.backend_name());

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("new connection from {}", peer_addr);

            let handler = self.handler.clone();
            let rpc_path = self.config.rpc_path.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    route_request(req, handler.clone(), rpc_path.clone())
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    let err_str = err.to_string();
                    if err_str.contains("connection closed before message completed") {
                        debug!("client disconnected: {}", err);
                    } else {
                        error!("error serving connection: {}", err);
                    }
                }
            });
        }
    }

    /// Background task expiring idle sessions
    fn start_session_expiry(&self) {
        let store = Arc::clone(&self.store);
        let handler = self.handler.clone();
        let expiry = self.config.session_expiry;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match store.expire_idle(expiry).await {
                    Ok(expired) => {
                        for session_id in expired {
                            handler.streams().close_session(&session_id).await;
                            debug!(session_id = %session_id, "expired idle session");
                        }
                    }
                    Err(err) => error!("session expiry error: {}", err),
                }
            }
        });
    }

    /// Get server statistics
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.store.session_count().await.unwrap_or(0),
            open_streams: self.handler.streams().total_connections().await,
            storage_type: self.store.backend_name().to_string(),
        }
    }
}

async fn route_request(
    req: Request<hyper::body::Incoming>,
    handler: SessionHttpHandler,
    rpc_path: String,
) -> std::result::Result<Response<ServerBody>, hyper::Error> {
    if req.uri().path() != rpc_path {
        return Ok(Response::builder()
            .status(hyper::StatusCode::NOT_FOUND)
            .body(
                Full::new(bytes::Bytes::from_static(b"Not Found"))
                    .boxed_unsync(),
            )
            .expect("static response headers are valid"));
    }

    match handler.handle(req).await {
        Ok(response) => Ok(response),
        Err(err) => {
            error!("request handling error: {}", err);
            Ok(plain_response(
                hyper::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ))
        }
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub sessions: usize,
    pub open_streams: usize,
    pub storage_type: String,
}
