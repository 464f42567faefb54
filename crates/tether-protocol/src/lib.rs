//! # Tether Protocol Layer
//!
//! Protocol-level types shared by the client and server transports: the
//! protocol version catalog, capability declarations exchanged during the
//! handshake, method name constants, the domain error type feature handlers
//! return, and the feature dispatch registry that routes inbound methods to
//! exactly one capability owner.
//!
//! Everything here is transport-agnostic; it depends only on the JSON-RPC
//! message model.

pub mod capabilities;
pub mod error;
pub mod features;
pub mod methods;
pub mod ping;
pub mod version;

pub mod prelude;

// Re-export main types
pub use capabilities::{CapabilitySet, HandshakeParams, HandshakeResult, PeerCapabilities, PeerInfo};
pub use error::TetherError;
pub use features::{
    Feature, FeatureContext, FeatureRegistry, NotificationListener, NotificationSink,
    RegistryError, SharedNotificationSink,
};
pub use ping::PingFeature;
pub use version::ProtocolVersion;

/// Result type for protocol-level operations
pub type Result<T> = std::result::Result<T, TetherError>;
