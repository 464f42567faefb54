//! Convenience re-exports for protocol consumers

pub use crate::capabilities::{
    CapabilitySet, HandshakeParams, HandshakeResult, PeerCapabilities, PeerInfo,
};
pub use crate::error::TetherError;
pub use crate::features::{
    Feature, FeatureContext, FeatureRegistry, NotificationListener, NotificationSink,
    RegistryError, SharedNotificationSink,
};
pub use crate::methods;
pub use crate::ping::PingFeature;
pub use crate::version::ProtocolVersion;
