//! Request-processing pipeline.
//!
//! # Data Flow
//! ```text
//! decoded record → RequestContext
//!     → authentication   (establish identity)
//!     → authorization    (collection ACL, queries only)
//!     → validation       (shape checks per request type)
//!     → rate_limit       (fixed window per user)
//!     → audit            (best-effort record)
//!     → execution        (connector call)
//!     → response_shaping (always; uniform envelope)
//! ```
//!
//! # Design Decisions
//! - The first stage that records an error halts the business stages
//! - Stage order is fixed when the pipeline is built, not per request
//! - Stages own only their own state; shared state lives behind `Arc`

pub mod context;
pub mod engine;
pub mod stage;
pub mod stages;

pub use context::RequestContext;
pub use engine::{Pipeline, PipelineStages};
pub use stage::Stage;
