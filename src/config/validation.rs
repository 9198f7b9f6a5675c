//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (ACL entries reference known users)
//! - Validate value ranges (windows > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use crate::config::schema::GatewayConfig;
use crate::store::memory::MEMORY_SCHEME;
use crate::store::mongo::is_mongo_scheme;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("listener.tls is required unless listener.insecure_plaintext is set")]
    MissingTls,

    #[error("store.uri: {0}")]
    InvalidStoreUri(String),

    #[error("store.seed_path only applies to memory:// stores")]
    SeedWithoutMemoryStore,

    #[error("store.default_database must not be empty")]
    EmptyDefaultDatabase,

    #[error("auth.collections references unknown user {0:?}")]
    UnknownAclUser(String),

    #[error("observability.log_level: unknown level {0:?}")]
    InvalidLogLevel(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if SocketAddr::from_str(&config.listener.bind_address).is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.listener.tls.is_none() && !config.listener.insecure_plaintext {
        errors.push(ValidationError::MissingTls);
    }

    match url::Url::parse(&config.store.uri) {
        Ok(uri) if uri.scheme() == MEMORY_SCHEME => {}
        Ok(uri) if is_mongo_scheme(uri.scheme()) => {
            if config.store.seed_path.is_some() {
                errors.push(ValidationError::SeedWithoutMemoryStore);
            }
        }
        Ok(uri) => errors.push(ValidationError::InvalidStoreUri(format!(
            "unsupported scheme {:?}",
            uri.scheme()
        ))),
        Err(e) => errors.push(ValidationError::InvalidStoreUri(e.to_string())),
    }
    if config.store.default_database.trim().is_empty() {
        errors.push(ValidationError::EmptyDefaultDatabase);
    }

    for user in config.auth.collections.keys() {
        if !config.auth.users.contains_key(user) {
            errors.push(ValidationError::UnknownAclUser(user.clone()));
        }
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::Zero("rate_limit.window_secs"));
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::Zero("rate_limit.max_requests"));
        }
    }
    if config.validation.max_frame_bytes == 0 {
        errors.push(ValidationError::Zero("validation.max_frame_bytes"));
    }

    if tracing::Level::from_str(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && SocketAddr::from_str(&config.observability.metrics_address).is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
