//! Convenience re-exports for client consumers

pub use crate::client::{TetherClient, TetherClientBuilder};
pub use crate::config::{ClientConfig, RetryConfig, TimeoutConfig};
pub use crate::error::{ProtocolError, Result, TetherClientError, TransportError};

pub use tether_protocol::{
    CapabilitySet, Feature, FeatureContext, FeatureRegistry, NotificationListener,
    PeerCapabilities, PeerInfo, ProtocolVersion, TetherError, methods,
};
pub use tether_session::{ResponseHandle, Session, SessionError};
