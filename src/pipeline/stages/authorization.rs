//! Authorization stage: collection-level access control for queries.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::Stage;

/// Static username → permitted collections table.
#[derive(Debug, Clone, Default)]
pub struct CollectionAcl {
    permitted: HashMap<String, BTreeSet<String>>,
}

impl CollectionAcl {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            permitted: config
                .collections
                .iter()
                .map(|(user, collections)| (user.clone(), collections.clone()))
                .collect(),
        }
    }

    pub fn permits(&self, user: &str, collection: &str) -> bool {
        self.permitted
            .get(user)
            .is_some_and(|collections| collections.contains(collection))
    }
}

/// Checks a query's target collection against the user's permitted set.
/// Requests of any other type pass through untouched.
#[derive(Debug, Clone)]
pub struct AuthorizationStage {
    acl: CollectionAcl,
}

impl AuthorizationStage {
    pub fn new(acl: CollectionAcl) -> Self {
        Self { acl }
    }
}

#[async_trait]
impl Stage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn process(&self, ctx: &mut RequestContext) {
        if ctx.request_type() != Some("query") {
            return;
        }

        let Some(collection) = ctx.field_str("collection").filter(|c| !c.is_empty()) else {
            ctx.fail(GatewayError::Validation("missing collection".to_string()));
            return;
        };

        let Some(user) = ctx.user() else {
            ctx.fail(GatewayError::AuthenticationRequired);
            return;
        };

        if !self.acl.permits(user, collection) {
            tracing::warn!(
                request_id = %ctx.request_id(),
                user,
                collection,
                "Collection access denied"
            );
            ctx.fail(GatewayError::AccessDenied);
        }
    }
}
