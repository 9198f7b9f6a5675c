//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the gateway, registry and server at startup
//! ```
//!
//! # Design Decisions
//! - Config is loaded once; credential and ACL tables are read-only afterwards
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use validation::{validate_config, ValidationError};
pub use schema::{
    AuthConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig,
    StoreConfig, TimeoutConfig, TlsConfig, ValidationConfig,
};
