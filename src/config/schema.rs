//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Root configuration for the query gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, mTLS).
    pub listener: ListenerConfig,

    /// Backing data store settings.
    pub store: StoreConfig,

    /// Static credential table and collection ACL.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Request shape checks.
    pub validation: ValidationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Mutual TLS material. Required unless `insecure_plaintext` is set.
    pub tls: Option<TlsConfig>,

    /// Accept unencrypted connections. Local development and tests only.
    pub insecure_plaintext: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Deadline for the TLS handshake in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8443".to_string(),
            tls: None,
            insecure_plaintext: false,
            max_connections: 10_000,
            handshake_timeout_secs: 10,
        }
    }
}

/// Mutual TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to the server certificate chain (PEM).
    pub cert_path: String,

    /// Path to the server private key (PEM).
    pub key_path: String,

    /// Path to the CA bundle that client certificates must chain to (PEM).
    pub ca_cert_path: String,
}

/// Data store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connector URI. Never exposed to clients.
    pub uri: String,

    /// Logical database used when a request names none.
    pub default_database: String,

    /// Deadline for establishing a connector in seconds.
    pub connect_timeout_secs: u64,

    /// Optional JSON file seeding the in-memory store.
    pub seed_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "memory://local".to_string(),
            default_database: "test".to_string(),
            connect_timeout_secs: 10,
            seed_path: None,
        }
    }
}

/// Static credential table and per-user collection ACL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// username -> secret
    pub users: BTreeMap<String, String>,

    /// username -> permitted collection names
    pub collections: BTreeMap<String, BTreeSet<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        // Demo table. Replace before deploying.
        let users = BTreeMap::from([
            ("alice".to_string(), "alice-pass".to_string()),
            ("bob".to_string(), "bob-pass".to_string()),
        ]);
        let collections = BTreeMap::from([
            (
                "alice".to_string(),
                BTreeSet::from(["orders".to_string(), "users".to_string()]),
            ),
            ("bob".to_string(), BTreeSet::from(["orders".to_string()])),
        ]);
        Self { users, collections }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per user per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 60,
        }
    }
}

/// Request validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Fail queries whose embedded filter does not parse, instead of ignoring the filter.
    pub reject_malformed_filter: bool,

    /// Largest accepted record in bytes, terminator excluded.
    pub max_frame_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reject_malformed_filter: false,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on a single connector call. `None` leaves it to the connector.
    pub execution_secs: Option<u64>,

    /// How long shutdown waits for open connections to finish.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            execution_secs: None,
            shutdown_grace_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
