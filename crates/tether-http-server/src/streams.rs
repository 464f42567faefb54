//! Per-session event streams with bounded outbound queues.
//!
//! Each open stream is a bounded mpsc channel: the channel capacity is the
//! backpressure limit, writers await capacity once it is hit and resume as
//! the consumer drains, so a slow peer cannot cause unbounded buffering.
//! Messages are framed as SSE `data:` events; idle streams carry periodic
//! keepalive comments.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use hyper::Response;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use tether_json_rpc::JsonRpcNotification;
use tether_protocol::{NotificationSink, TetherError};

use crate::headers::SESSION_ID_HEADER;

/// HTTP body type shared by every server response
pub type ServerBody = http_body_util::combinators::UnsyncBoxBody<Bytes, Infallible>;

/// Configuration for event streams
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Maximum queued outbound messages per stream (the backpressure limit)
    pub queue_capacity: usize,
    /// Keep-alive comment interval
    pub keepalive_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// Error type for stream operations
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("no open event stream for session: {0}")]
    NoConnections(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

type SessionConnections = HashMap<String, mpsc::Sender<Value>>;

/// Registry of open event streams, keyed by session id.
///
/// A session may hold several concurrent streams (one per in-flight
/// streaming exchange plus the standalone GET stream); pushes go to every
/// stream of the session.
pub struct EventStreamManager {
    connections: RwLock<HashMap<String, SessionConnections>>,
    options: StreamOptions,
}

impl EventStreamManager {
    pub fn new(options: StreamOptions) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Open a new stream for `session_id`, returning the connection id and
    /// the receiving half the HTTP response body drains
    pub async fn open(&self, session_id: &str) -> (String, mpsc::Receiver<Value>) {
        let connection_id = uuid::Uuid::now_v7().to_string();
        let (sender, receiver) = mpsc::channel(self.options.queue_capacity);

        let mut connections = self.connections.write().await;
        connections
            .entry(session_id.to_string())
            .or_default()
            .insert(connection_id.clone(), sender);

        debug!(session_id = %session_id, connection_id = %connection_id, "opened event stream");
        (connection_id, receiver)
    }

    /// Remove one stream; the session entry disappears with its last stream
    pub async fn release(&self, session_id: &str, connection_id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(session_connections) = connections.get_mut(session_id) {
            session_connections.remove(connection_id);
            if session_connections.is_empty() {
                connections.remove(session_id);
            }
        }
    }

    /// Push a message to every open stream of the session.
    ///
    /// Awaits channel capacity, so a full queue suspends the writer until
    /// the consumer drains. Returns the number of streams reached.
    pub async fn push(&self, session_id: &str, message: Value) -> Result<usize, StreamError> {
        let senders: Vec<(String, mpsc::Sender<Value>)> = {
            let connections = self.connections.read().await;
            match connections.get(session_id) {
                Some(session_connections) => session_connections
                    .iter()
                    .map(|(id, sender)| (id.clone(), sender.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        if senders.is_empty() {
            return Err(StreamError::NoConnections(session_id.to_string()));
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (connection_id, sender) in senders {
            match sender.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(connection_id),
            }
        }

        for connection_id in dead {
            self.release(session_id, &connection_id).await;
        }
        Ok(delivered)
    }

    /// Drop every stream of the session; receivers observe end-of-stream
    pub async fn close_session(&self, session_id: &str) {
        let removed = self.connections.write().await.remove(session_id);
        if let Some(session_connections) = removed {
            debug!(
                session_id = %session_id,
                streams = session_connections.len(),
                "closed event streams"
            );
        }
    }

    pub async fn connection_count(&self, session_id: &str) -> usize {
        self.connections
            .read()
            .await
            .get(session_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Total open streams across all sessions
    pub async fn total_connections(&self) -> usize {
        self.connections.read().await.values().map(HashMap::len).sum()
    }
}

/// Format one JSON document as an SSE data event
pub(crate) fn sse_event(message: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", message))
}

/// Build an SSE response draining `receiver` until it ends, with periodic
/// keepalive comments while idle
pub(crate) fn sse_response(
    session_id: &str,
    mut receiver: mpsc::Receiver<Value>,
    keepalive_interval: Duration,
) -> Response<ServerBody> {
    let stream = async_stream::stream! {
        let mut keepalive = tokio::time::interval(keepalive_interval);
        // The first tick completes immediately; consume it
        keepalive.tick().await;

        loop {
            tokio::select! {
                maybe = receiver.recv() => match maybe {
                    Some(message) => yield Ok::<_, Infallible>(Frame::data(sse_event(&message))),
                    None => break,
                },
                _ = keepalive.tick() => {
                    yield Ok(Frame::data(Bytes::from_static(b": keepalive\n\n")));
                }
            }
        }
    };

    Response::builder()
        .status(hyper::StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache, no-transform")
        .header(SESSION_ID_HEADER, session_id)
        .body(StreamBody::new(stream).boxed_unsync())
        .expect("static response headers are valid")
}

/// Notification sink backed by a session's event streams.
///
/// Notifications are fire-and-forget: with no open stream they are dropped
/// with a debug log rather than failing the emitting handler.
pub struct SessionStreamSink {
    streams: Arc<EventStreamManager>,
    session_id: String,
}

impl SessionStreamSink {
    pub fn new(streams: Arc<EventStreamManager>, session_id: impl Into<String>) -> Self {
        Self {
            streams,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for SessionStreamSink {
    async fn push(&self, notification: JsonRpcNotification) -> tether_protocol::Result<()> {
        let message = serde_json::to_value(&notification).map_err(TetherError::Serialization)?;
        match self.streams.push(&self.session_id, message).await {
            Ok(_) => Ok(()),
            Err(StreamError::NoConnections(_)) => {
                debug!(session_id = %self.session_id, method = %notification.method, "no open stream, notification dropped");
                Ok(())
            }
            Err(StreamError::Serialization(err)) => Err(TetherError::Serialization(err)),
        }
    }
}

/// Notification sink bound to one streaming exchange's channel.
///
/// Progress events pushed by a handler during a streaming POST land on the
/// exchange's own stream, ahead of the final response document.
pub struct ExchangeSink {
    sender: mpsc::Sender<Value>,
}

impl ExchangeSink {
    pub fn new(sender: mpsc::Sender<Value>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationSink for ExchangeSink {
    async fn push(&self, notification: JsonRpcNotification) -> tether_protocol::Result<()> {
        let message = serde_json::to_value(&notification).map_err(TetherError::Serialization)?;
        if self.sender.send(message).await.is_err() {
            warn!(method = %notification.method, "streaming exchange ended before notification");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_push_reaches_every_stream() {
        let manager = EventStreamManager::new(StreamOptions::default());
        let (_, mut first) = manager.open("s1").await;
        let (_, mut second) = manager.open("s1").await;

        let delivered = manager.push("s1", json!({"n": 1})).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await, Some(json!({"n": 1})));
        assert_eq!(second.recv().await, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_push_without_streams_errors() {
        let manager = EventStreamManager::new(StreamOptions::default());
        assert!(matches!(
            manager.push("nobody", json!({})).await,
            Err(StreamError::NoConnections(_))
        ));
    }

    #[tokio::test]
    async fn test_dead_streams_are_pruned() {
        let manager = EventStreamManager::new(StreamOptions::default());
        let (_, receiver) = manager.open("s1").await;
        drop(receiver);

        // The dead stream is reached zero times and pruned
        let delivered = manager.push("s1", json!({})).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(manager.connection_count("s1").await, 0);
    }

    #[tokio::test]
    async fn test_close_session_ends_receivers() {
        let manager = EventStreamManager::new(StreamOptions::default());
        let (_, mut receiver) = manager.open("s1").await;

        manager.close_session("s1").await;
        assert_eq!(receiver.recv().await, None);
        assert_eq!(manager.total_connections().await, 0);
    }

    #[tokio::test]
    async fn test_backpressure_suspends_writer() {
        let manager = Arc::new(EventStreamManager::new(StreamOptions {
            queue_capacity: 1,
            keepalive_interval: Duration::from_secs(30),
        }));
        let (_, mut receiver) = manager.open("s1").await;

        manager.push("s1", json!(1)).await.unwrap();

        // Queue is full: the next push must wait until the consumer drains
        let blocked = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.push("s1", json!(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(receiver.recv().await, Some(json!(1)));
        blocked.await.unwrap().unwrap();
        assert_eq!(receiver.recv().await, Some(json!(2)));
    }

    #[test]
    fn test_sse_event_format() {
        let event = sse_event(&json!({"a": 1}));
        assert_eq!(&event[..], b"data: {\"a\":1}\n\n");
    }
}
