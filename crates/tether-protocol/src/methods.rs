//! Method names fixed by the protocol.
//!
//! The method set is closed-ish: either side may originate `ping`, the
//! handshake pair is client-initiated, and the `notifications/*` family is
//! fire-and-forget in both directions.

/// Session-opening handshake request (client → server)
pub const HANDSHAKE: &str = "handshake";

/// Connectivity probe, answerable by either side
pub const PING: &str = "ping";

/// Emitted by the client once the handshake result has been applied
pub const READY: &str = "notifications/ready";

/// Incremental progress for a long-running request
pub const PROGRESS: &str = "notifications/progress";

/// Log message forwarded to the peer
pub const LOG: &str = "notifications/log";

/// Capability-owned state changed on the emitting side
pub const CHANGED: &str = "notifications/changed";

/// The peer abandoned an outstanding request
pub const CANCELLED: &str = "notifications/cancelled";
