//! Convenience re-exports for session consumers

pub use crate::session::{
    DEFAULT_REQUEST_TIMEOUT, RequestOutcome, ResponseHandle, Session, SessionError,
};
pub use crate::store::{
    InMemoryConfig, InMemorySessionStore, SessionStore, SessionStoreError, SharedSessionStore,
};
