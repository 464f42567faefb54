//! Feature registration and dispatch.
//!
//! A feature is data plus a function table: the set of method names it owns
//! (fixed for its lifetime) and async handlers for requests and
//! notifications. Registration validates capability sets before anything is
//! wired up, so exactly one feature ever owns a method. Notifications fan
//! out to every interested party with per-element error isolation.
//!
//! The registry is assembled before traffic starts and then frozen into an
//! `Arc`; registration requires `&mut self`, so concurrent registration
//! during live traffic is unrepresentable rather than racy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use tether_json_rpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestParams,
    ResponseResult,
};

use crate::capabilities::{CapabilitySet, PeerCapabilities};
use crate::error::TetherError;

/// Async sink for pushing notifications to the peer while a request is in
/// flight (progress, log, change events). The server transport backs this
/// with the session's event stream.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, notification: JsonRpcNotification) -> crate::Result<()>;
}

pub type SharedNotificationSink = Arc<dyn NotificationSink>;

/// Per-dispatch context handed to feature handlers
#[derive(Clone, Default)]
pub struct FeatureContext {
    /// Session this dispatch belongs to; `None` for stateless requests
    pub session_id: Option<String>,
    /// Capabilities the peer declared at handshake time
    pub peer_capabilities: Option<PeerCapabilities>,
    /// Outbound notification sink; absent for stateless or unary-only peers
    pub notifier: Option<SharedNotificationSink>,
}

impl FeatureContext {
    /// Context for a request outside any session
    pub fn stateless() -> Self {
        Self::default()
    }

    pub fn for_session(
        session_id: impl Into<String>,
        peer_capabilities: PeerCapabilities,
        notifier: Option<SharedNotificationSink>,
    ) -> Self {
        Self {
            session_id: Some(session_id.into()),
            peer_capabilities: Some(peer_capabilities),
            notifier,
        }
    }

    /// Push a notification to the peer, if a sink is available
    pub async fn notify(&self, notification: JsonRpcNotification) -> crate::Result<()> {
        match &self.notifier {
            Some(sink) => sink.push(notification).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FeatureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureContext")
            .field("session_id", &self.session_id)
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}

/// A capability provider owning a disjoint set of method names
#[async_trait]
pub trait Feature: Send + Sync {
    /// The method names this feature answers; fixed for its lifetime
    fn capabilities(&self) -> &CapabilitySet;

    /// Handle a request for one of this feature's methods.
    /// Returns domain errors only; the registry converts them to JSON-RPC
    /// error responses at the dispatch boundary.
    async fn handle_request(
        &self,
        method: &str,
        params: Option<RequestParams>,
        cx: &FeatureContext,
    ) -> Result<Value, TetherError>;

    /// Handle a notification for one of this feature's methods
    async fn handle_notification(
        &self,
        method: &str,
        params: Option<RequestParams>,
        cx: &FeatureContext,
    ) -> Result<(), TetherError> {
        let _ = (method, params, cx);
        Ok(())
    }
}

/// A listener interested in every inbound notification regardless of method
#[async_trait]
pub trait NotificationListener: Send + Sync {
    async fn on_notification(
        &self,
        notification: &JsonRpcNotification,
        cx: &FeatureContext,
    ) -> Result<(), TetherError>;
}

/// Registration failures
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("capability collision on methods: {}", methods.join(", "))]
    CapabilityCollision { methods: Vec<String> },

    #[error("feature declares no capabilities")]
    EmptyCapabilities,
}

/// Registry of capability providers for one side of the conversation
#[derive(Default)]
pub struct FeatureRegistry {
    features: Vec<Arc<dyn Feature>>,
    listeners: Vec<Arc<dyn NotificationListener>>,
    methods: CapabilitySet,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature.
    ///
    /// Fails atomically when the feature's capability set intersects the
    /// union of everything already registered; on success returns the full
    /// capability superset.
    pub fn register(&mut self, feature: Arc<dyn Feature>) -> Result<CapabilitySet, RegistryError> {
        let capabilities = feature.capabilities();
        if capabilities.is_empty() {
            return Err(RegistryError::EmptyCapabilities);
        }

        let clashing = self.methods.intersection(capabilities);
        if !clashing.is_empty() {
            return Err(RegistryError::CapabilityCollision { methods: clashing });
        }

        self.methods.extend(capabilities);
        self.features.push(feature);
        Ok(self.methods.clone())
    }

    /// Register a listener for all inbound notifications
    pub fn add_listener(&mut self, listener: Arc<dyn NotificationListener>) {
        self.listeners.push(listener);
    }

    /// Union of every registered feature's capability set
    pub fn capability_superset(&self) -> &CapabilitySet {
        &self.methods
    }

    /// The single feature owning `method`, if any
    fn owner_of(&self, method: &str) -> Option<&Arc<dyn Feature>> {
        self.features
            .iter()
            .find(|feature| feature.capabilities().contains(method))
    }

    /// Route a request to its owning feature and produce the response.
    ///
    /// A missing owner yields a method-not-found error response; a handler
    /// failure is converted to an error response and never propagates.
    pub async fn dispatch_request(
        &self,
        request: JsonRpcRequest,
        cx: &FeatureContext,
    ) -> JsonRpcMessage {
        match self.owner_of(&request.method) {
            Some(feature) => {
                debug!(method = %request.method, id = %request.id, "dispatching request");
                match feature
                    .handle_request(&request.method, request.params, cx)
                    .await
                {
                    Ok(result) => {
                        JsonRpcMessage::success(request.id, ResponseResult::Success(result))
                    }
                    Err(domain_error) => {
                        let error_object = domain_error.to_error_object();
                        JsonRpcMessage::error(JsonRpcError::new(Some(request.id), error_object))
                    }
                }
            }
            None => JsonRpcMessage::error(JsonRpcError::method_not_found(
                request.id,
                &request.method,
            )),
        }
    }

    /// Deliver a notification to every interested feature and every
    /// registered listener. Each delivery is individually isolated: one
    /// failure is logged and the iteration continues.
    pub async fn dispatch_notification(
        &self,
        notification: &JsonRpcNotification,
        cx: &FeatureContext,
    ) {
        for feature in &self.features {
            if !feature.capabilities().contains(&notification.method) {
                continue;
            }
            if let Err(err) = feature
                .handle_notification(&notification.method, notification.params.clone(), cx)
                .await
            {
                warn!(method = %notification.method, error = %err, "notification handler failed");
            }
        }

        for listener in &self.listeners {
            if let Err(err) = listener.on_notification(notification, cx).await {
                warn!(method = %notification.method, error = %err, "notification listener failed");
            }
        }
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.features.len())
            .field("listeners", &self.listeners.len())
            .field("methods", &self.methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_json_rpc::RequestId;

    struct StaticFeature {
        capabilities: CapabilitySet,
        fail: bool,
        notified: AtomicUsize,
    }

    impl StaticFeature {
        fn new(methods: &[&str]) -> Self {
            Self {
                capabilities: methods.iter().copied().collect(),
                fail: false,
                notified: AtomicUsize::new(0),
            }
        }

        fn failing(methods: &[&str]) -> Self {
            Self {
                fail: true,
                ..Self::new(methods)
            }
        }
    }

    #[async_trait]
    impl Feature for StaticFeature {
        fn capabilities(&self) -> &CapabilitySet {
            &self.capabilities
        }

        async fn handle_request(
            &self,
            method: &str,
            _params: Option<RequestParams>,
            _cx: &FeatureContext,
        ) -> Result<Value, TetherError> {
            if self.fail {
                return Err(TetherError::internal("handler failure"));
            }
            Ok(json!({"handled": method}))
        }

        async fn handle_notification(
            &self,
            _method: &str,
            _params: Option<RequestParams>,
            _cx: &FeatureContext,
        ) -> Result<(), TetherError> {
            self.notified.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TetherError::internal("listener failure"));
            }
            Ok(())
        }
    }

    struct CountingListener(AtomicUsize);

    #[async_trait]
    impl NotificationListener for CountingListener {
        async fn on_notification(
            &self,
            _notification: &JsonRpcNotification,
            _cx: &FeatureContext,
        ) -> Result<(), TetherError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_collision_is_rejected_atomically() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(Arc::new(StaticFeature::new(&["ping", "tools/run"])))
            .unwrap();

        let err = registry
            .register(Arc::new(StaticFeature::new(&["ping", "files/read"])))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::CapabilityCollision {
                methods: vec!["ping".to_string()]
            }
        );

        // The registry is unchanged: files/read was not added alongside
        assert!(!registry.capability_superset().contains("files/read"));
        assert_eq!(registry.capability_superset().len(), 2);
    }

    #[tokio::test]
    async fn test_collision_keeps_original_owner() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(Arc::new(StaticFeature::new(&["ping"])))
            .unwrap();
        let _ = registry.register(Arc::new(StaticFeature::failing(&["ping"])));

        let response = registry
            .dispatch_request(
                JsonRpcRequest::new_no_params(RequestId(1), "ping"),
                &FeatureContext::stateless(),
            )
            .await;
        // Still served by the original (non-failing) owner
        assert!(!response.is_error());
    }

    #[test]
    fn test_register_returns_superset() {
        let mut registry = FeatureRegistry::new();
        let superset = registry
            .register(Arc::new(StaticFeature::new(&["a"])))
            .unwrap();
        assert_eq!(superset.len(), 1);

        let superset = registry
            .register(Arc::new(StaticFeature::new(&["b", "c"])))
            .unwrap();
        assert_eq!(superset.len(), 3);
    }

    #[test]
    fn test_empty_capability_set_rejected() {
        let mut registry = FeatureRegistry::new();
        let err = registry
            .register(Arc::new(StaticFeature::new(&[])))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyCapabilities);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let registry = FeatureRegistry::new();
        let response = registry
            .dispatch_request(
                JsonRpcRequest::new_no_params(RequestId(7), "missing/method"),
                &FeatureContext::stateless(),
            )
            .await;

        match response {
            JsonRpcMessage::Error(err) => {
                assert_eq!(err.error.code, tether_json_rpc::error_codes::METHOD_NOT_FOUND);
                assert!(err.error.message.contains("missing/method"));
                assert_eq!(err.id, Some(RequestId(7)));
            }
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_error_response() {
        let mut registry = FeatureRegistry::new();
        registry
            .register(Arc::new(StaticFeature::failing(&["boom"])))
            .unwrap();

        let response = registry
            .dispatch_request(
                JsonRpcRequest::new_no_params(RequestId(2), "boom"),
                &FeatureContext::stateless(),
            )
            .await;
        assert!(response.is_error());
        assert_eq!(response.id(), Some(RequestId(2)));
    }

    #[tokio::test]
    async fn test_notification_fan_out_isolates_failures() {
        let mut registry = FeatureRegistry::new();
        let failing = Arc::new(StaticFeature::failing(&["notifications/changed"]));
        registry.register(failing.clone()).unwrap();

        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        registry.add_listener(listener.clone());
        let second = Arc::new(CountingListener(AtomicUsize::new(0)));
        registry.add_listener(second.clone());

        registry
            .dispatch_notification(
                &JsonRpcNotification::new_no_params("notifications/changed"),
                &FeatureContext::stateless(),
            )
            .await;

        // The failing feature ran, and its failure did not stop the listeners
        assert_eq!(failing.notified.load(Ordering::SeqCst), 1);
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }
}
