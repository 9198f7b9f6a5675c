//! Zero-trust query gateway library.
//!
//! Clients connect over mutually authenticated TLS and exchange newline-delimited JSON
//! records. Every record runs through a fixed, ordered pipeline (authentication,
//! authorization, validation, rate limiting, audit, execution, response shaping) and is
//! answered with exactly one envelope.

pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use lifecycle::Shutdown;
pub use server::GatewayServer;
