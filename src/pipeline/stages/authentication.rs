//! Authentication stage: establishes the request's identity.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;

type SecretDigest = [u8; 32];

fn digest(secret: &str) -> SecretDigest {
    Sha256::digest(secret.as_bytes()).into()
}

/// Static username → secret table.
///
/// Only SHA-256 digests are held. Every comparison is between two 32-byte
/// values, so timing does not depend on the presented secret's length.
#[derive(Clone, Default)]
pub struct CredentialTable {
    digests: HashMap<String, SecretDigest>,
}

impl CredentialTable {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            digests: config
                .users
                .iter()
                .map(|(user, secret)| (user.clone(), digest(secret)))
                .collect(),
        }
    }

    /// Check a username/secret pair.
    ///
    /// An unknown user still hashes and compares the presented secret, against
    /// an all-zero digest.
    pub fn verify(&self, user: &str, secret: &str) -> bool {
        let presented = digest(secret);
        match self.digests.get(user) {
            Some(expected) => bool::from(expected[..].ct_eq(&presented[..])),
            None => {
                let _ = SecretDigest::default()[..].ct_eq(&presented[..]);
                false
            }
        }
    }
}

impl std::fmt::Debug for CredentialTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialTable")
            .field("users", &self.digests.len())
            .finish()
    }
}

/// Verifies `user`/`password` fields, either embedded on any request or on an
/// explicit `type: "auth"` handshake.
#[derive(Debug, Clone)]
pub struct AuthenticationStage {
    credentials: CredentialTable,
}

impl AuthenticationStage {
    pub fn new(credentials: CredentialTable) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Stage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        if ctx.user().is_some() {
            return;
        }

        let user = ctx.field_str("user").filter(|u| !u.is_empty());
        let handshake = ctx.request_type() == Some("auth");

        let Some(user) = user else {
            ctx.fail(if handshake {
                GatewayError::AuthenticationFailed
            } else {
                GatewayError::AuthenticationRequired
            });
            return;
        };

        let secret = ctx.field_str("password").unwrap_or_default();
        if !self.credentials.verify(user, secret) {
            tracing::warn!(request_id = %ctx.request_id(), user, "Authentication failed");
            ctx.fail(GatewayError::AuthenticationFailed);
            return;
        }

        let user = user.to_string();
        ctx.set_user(user);
    }
}
