//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! byte stream
//!     → framer.rs (one JSON record per line, bounded)
//!     → worker decodes the record into a request map
//!     ...
//! pipeline result
//!     → envelope.rs (status envelope + processed_at/user stamp)
//!     → framer.rs (serialize, terminate, flush)
//! ```

pub mod envelope;
pub mod framer;

pub use framer::{FrameError, MessageFramer};
