//! # Tether Client
//!
//! Client-side transport for the Tether protocol over streamable HTTP. The
//! client performs the session handshake, issues requests and notifications
//! with the session header on every exchange, consumes event-stream replies
//! incrementally, and routes asynchronous server pushes: notifications fan
//! out through a client-side feature registry, and server-initiated requests
//! are dispatched and answered back on the same session.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tether_client::TetherClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TetherClient::builder("http://localhost:7420/rpc")
//!         .streaming(true)
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.ping().await?;
//!
//!     let result = client.request("tools/run", None).await?;
//!     println!("result: {:?}", result);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
mod sse;

pub mod prelude;

// Re-export main types
pub use client::{
    PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER, TetherClient, TetherClientBuilder,
};
pub use config::{ClientConfig, RetryConfig, TimeoutConfig};
pub use error::{ProtocolError, Result, TetherClientError, TransportError};

// Re-export foundational types
pub use tether_json_rpc::prelude as json_rpc;
pub use tether_protocol::prelude as protocol;
pub use tether_session::{ResponseHandle, Session, SessionError};
