//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build store, registry, gateway → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Close connectors → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Draining is bounded by the configured grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
