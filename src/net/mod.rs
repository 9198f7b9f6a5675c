//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (mutual TLS handshake, client certificate required)
//!     → connection.rs (lifecycle tracking)
//!     → hand off to the connection worker
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Plaintext is opt-in and meant for local development only

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use tls::{load_mtls_config, TlsError};
