//! Data store subsystem.
//!
//! # Data Flow
//! ```text
//! Execution stage
//!     → registry.rs (database name → shared connector, created lazily)
//!     → connector.rs (Connector capability: connect / execute_query / close)
//!     → memory.rs (bundled in-process backend for memory:// URIs)
//!     → mongo.rs (MongoDB driver for mongodb:// and mongodb+srv:// URIs)
//! ```
//!
//! # Design Decisions
//! - One connector per logical database for the life of the process
//! - Connectors are shared across workers and must be safe for concurrent use
//! - Registry is torn down only at shutdown
//! - The store URI's scheme picks the backend once, at startup

pub mod connector;
pub mod memory;
pub mod mongo;
pub mod registry;

pub use connector::{Connector, ConnectorError, ConnectorFactory, QueryRequest};
pub use memory::{MemoryConnector, MemoryConnectorFactory, MemoryStore};
pub use mongo::{MongoConnector, MongoConnectorFactory};
pub use registry::ConnectorRegistry;
