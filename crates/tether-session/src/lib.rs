//! # Tether Session Management
//!
//! The session is the unit of conversation state: a monotonic request-id
//! sequence, the table of outstanding requests awaiting responses, the
//! capabilities negotiated at handshake time, and an active/closed lifecycle
//! flag. Sessions are serial within themselves (all mutation goes through
//! one lock that is never held across an await) and parallel with respect to
//! each other.
//!
//! The crate also provides the server-side session store abstraction with an
//! in-memory backend suitable for development, testing, and single-instance
//! deployments.

pub mod session;
pub mod store;

pub mod prelude;

// Re-export main types
pub use session::{
    DEFAULT_REQUEST_TIMEOUT, RequestOutcome, ResponseHandle, Session, SessionError,
};
pub use store::{
    InMemoryConfig, InMemorySessionStore, SessionStore, SessionStoreError, SharedSessionStore,
};
