//! Capability declarations and handshake data objects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// An ordered set of method names a feature or peer can answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, method: impl Into<String>) -> bool {
        self.0.insert(method.into())
    }

    pub fn contains(&self, method: &str) -> bool {
        self.0.contains(method)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Methods present in both sets
    pub fn intersection(&self, other: &CapabilitySet) -> Vec<String> {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Merge `other` into this set
    pub fn extend(&mut self, other: &CapabilitySet) {
        self.0.extend(other.0.iter().cloned());
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Peer identification exchanged during the handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for PeerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What a peer declares it can do.
///
/// `methods` is the set the declaring peer can answer (so the other side can
/// route its own outbound requests); `streaming` signals willingness to
/// accept event-stream delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    #[serde(default)]
    pub methods: CapabilitySet,
    #[serde(default)]
    pub streaming: bool,
}

impl PeerCapabilities {
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_methods(mut self, methods: CapabilitySet) -> Self {
        self.methods = methods;
        self
    }
}

/// Parameters of the `handshake` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    pub protocol_version: String,
    pub capabilities: PeerCapabilities,
    pub client_info: PeerInfo,
}

impl HandshakeParams {
    pub fn new(capabilities: PeerCapabilities, client_info: PeerInfo) -> Self {
        Self {
            protocol_version: ProtocolVersion::LATEST.as_str().to_string(),
            capabilities,
            client_info,
        }
    }
}

/// Result of a successful `handshake` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResult {
    pub protocol_version: String,
    pub capabilities: PeerCapabilities,
    pub server_info: PeerInfo,
}

impl HandshakeResult {
    pub fn new(
        version: ProtocolVersion,
        capabilities: PeerCapabilities,
        server_info: PeerInfo,
    ) -> Self {
        Self {
            protocol_version: version.as_str().to_string(),
            capabilities,
            server_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set_intersection() {
        let a: CapabilitySet = ["ping", "tools/run"].into_iter().collect();
        let b: CapabilitySet = ["ping", "files/read"].into_iter().collect();

        assert_eq!(a.intersection(&b), vec!["ping".to_string()]);
        assert!(a.contains("tools/run"));
        assert!(!a.contains("files/read"));
    }

    #[test]
    fn test_capability_set_extend() {
        let mut a: CapabilitySet = ["ping"].into_iter().collect();
        let b: CapabilitySet = ["files/read"].into_iter().collect();
        a.extend(&b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_handshake_wire_format() {
        let params = HandshakeParams::new(
            PeerCapabilities::default().with_streaming(true),
            PeerInfo::new("agent", "1.0.0"),
        );
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"protocolVersion\":\"2025-01\""));
        assert!(json.contains("\"clientInfo\""));

        let parsed: HandshakeParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_capabilities_default_on_missing_fields() {
        let parsed: PeerCapabilities = serde_json::from_str("{}").unwrap();
        assert!(!parsed.streaming);
        assert!(parsed.methods.is_empty());
    }
}
