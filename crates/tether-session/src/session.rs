//! Session lifecycle and pending-request tracking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use tether_json_rpc::{
    JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
    RequestParams, ResponseResult,
};
use tether_protocol::{PeerCapabilities, ProtocolVersion};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Session-level failures surfaced to request callers
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is closed; closing is terminal
    #[error("session closed")]
    Closed,

    /// No response arrived within the configured per-request timeout.
    /// Only the affected request fails; the session stays alive.
    #[error("request {id} timed out")]
    Timeout { id: RequestId },

    /// The peer answered with a JSON-RPC error
    #[error("peer error {code}: {message}", code = .0.code, message = .0.message)]
    Rpc(JsonRpcErrorObject),
}

/// What a pending entry is completed with
pub type RequestOutcome = Result<ResponseResult, SessionError>;

struct SessionState {
    active: bool,
    next_id: i64,
    pending: HashMap<RequestId, oneshot::Sender<RequestOutcome>>,
}

struct SessionInner {
    id: String,
    protocol_version: ProtocolVersion,
    peer_capabilities: PeerCapabilities,
    streaming_enabled: bool,
    request_timeout: Duration,
    state: Mutex<SessionState>,
}

/// One logical conversation between a client and a server.
///
/// Cloning is cheap and shares the underlying state. The inner lock guards
/// the pending table and lifecycle flag; it is acquired only for short
/// synchronous sections and never held across an await point.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a live session with negotiated parameters.
    ///
    /// Streaming mode is fixed here, at negotiation time, and cannot be
    /// toggled for the lifetime of the session.
    pub fn new(
        id: impl Into<String>,
        protocol_version: ProtocolVersion,
        peer_capabilities: PeerCapabilities,
        streaming_enabled: bool,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: id.into(),
                protocol_version,
                peer_capabilities,
                streaming_enabled,
                request_timeout,
                state: Mutex::new(SessionState {
                    active: true,
                    next_id: 0,
                    pending: HashMap::new(),
                }),
            }),
        }
    }

    /// Generate an opaque session identifier
    pub fn generate_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.inner.protocol_version
    }

    pub fn peer_capabilities(&self) -> &PeerCapabilities {
        &self.inner.peer_capabilities
    }

    pub fn streaming_enabled(&self) -> bool {
        self.inner.streaming_enabled
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Number of requests still awaiting a response
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Allocate the next id, register a pending entry, and hand back the
    /// assembled request for the transport to write together with the handle
    /// the caller may await.
    ///
    /// Fails immediately with [`SessionError::Closed`] on a closed session,
    /// without allocating an id. A timer owned by the session context fails
    /// the entry with [`SessionError::Timeout`] if no response arrives in
    /// time.
    pub fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
    ) -> Result<(JsonRpcRequest, ResponseHandle), SessionError> {
        let (id, rx) = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return Err(SessionError::Closed);
            }
            state.next_id += 1;
            let id = RequestId(state.next_id);
            let (tx, rx) = oneshot::channel();
            state.pending.insert(id, tx);
            (id, rx)
        };

        self.arm_timeout(id);

        let request = JsonRpcRequest::new(id, method, params);
        debug!(session_id = %self.inner.id, id = %id, method = %request.method, "registered pending request");
        Ok((request, ResponseHandle { id, rx }))
    }

    /// Build a notification on this session; no id, no pending entry
    pub fn send_notification(
        &self,
        method: impl Into<String>,
        params: Option<RequestParams>,
    ) -> Result<JsonRpcNotification, SessionError> {
        if !self.is_active() {
            return Err(SessionError::Closed);
        }
        Ok(JsonRpcNotification::new(method, params))
    }

    /// Complete the pending entry matching `id`.
    ///
    /// A response with no matching entry is dropped: it may be a duplicate
    /// or the answer to a request that already timed out.
    pub fn resolve_response(&self, id: RequestId, outcome: Result<ResponseResult, JsonRpcErrorObject>) {
        let sender = self.inner.state.lock().pending.remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome.map_err(SessionError::Rpc));
            }
            None => {
                debug!(session_id = %self.inner.id, id = %id, "dropping unsolicited response");
            }
        }
    }

    /// Route a decoded response message to its pending entry by id
    pub fn resolve_message(&self, message: JsonRpcMessage) {
        match message.id() {
            Some(id) => self.resolve_response(id, message.into_outcome()),
            None => {
                warn!(session_id = %self.inner.id, "response without an id cannot be correlated");
            }
        }
    }

    /// Close the session: terminal and idempotent.
    ///
    /// Every outstanding handle fails deterministically with
    /// [`SessionError::Closed`]; none is silently dropped. Subsequent
    /// `send_request` calls fail without allocating an id.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.pending.drain().collect()
        };

        if !drained.is_empty() {
            debug!(
                session_id = %self.inner.id,
                outstanding = drained.len(),
                "failing outstanding requests on close"
            );
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(SessionError::Closed));
        }
    }

    fn arm_timeout(&self, id: RequestId) {
        let weak = Arc::downgrade(&self.inner);
        let timeout = self.inner.request_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let sender = inner.state.lock().pending.remove(&id);
            if let Some(tx) = sender {
                debug!(session_id = %inner.id, id = %id, "request timed out");
                let _ = tx.send(Err(SessionError::Timeout { id }));
            }
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("active", &state.active)
            .field("streaming_enabled", &self.inner.streaming_enabled)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Awaitable handle for one outstanding request
#[derive(Debug)]
pub struct ResponseHandle {
    id: RequestId,
    rx: oneshot::Receiver<RequestOutcome>,
}

impl ResponseHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Suspend until the request resolves, fails, or times out.
    ///
    /// Matching is purely by id, so out-of-order delivery resolves the right
    /// handle.
    pub async fn wait(self) -> RequestOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            // Completer dropped without sending: session state was torn down
            Err(_) => Err(SessionError::Closed),
        }
    }
}
