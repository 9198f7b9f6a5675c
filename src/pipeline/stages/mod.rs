//! The seven pipeline stages, one concern each.

pub mod audit;
pub mod authentication;
pub mod authorization;
pub mod execution;
pub mod rate_limit;
pub mod response;
pub mod validation;

pub use audit::AuditStage;
pub use authentication::{AuthenticationStage, CredentialTable};
pub use authorization::{AuthorizationStage, CollectionAcl};
pub use execution::ExecutionStage;
pub use rate_limit::{Clock, ManualClock, RateLimitStage, RateLimiter, SystemClock};
pub use response::ResponseShapingStage;
pub use validation::ValidationStage;
