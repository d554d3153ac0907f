//! API-key authentication filter.
//!
//! Accepts a key in either `X-Api-Key: <key>` or
//! `Authorization: Bearer <key>` and resolves it to a tenant through the
//! configured [`TenantDirectory`].  Unknown or missing keys are rejected
//! with [`GatewayError::Authentication`].

use super::reject;
use async_trait::async_trait;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayFilter, RequestStage, TenantDirectory,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key from `X-Api-Key`, falling back to a bearer token.
pub fn extract_api_key(ctx: &GatewayContext) -> Option<&str> {
    if let Some(key) = ctx.header("x-api-key").map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key);
    }
    ctx.header("authorization")
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

pub struct TenantAuthFilter {
    directory: Arc<dyn TenantDirectory>,
}

impl TenantAuthFilter {
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl GatewayFilter for TenantAuthFilter {
    fn name(&self) -> &str {
        "tenant-auth"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        let Some(key) = extract_api_key(ctx) else {
            warn!(request_id = %ctx.request_id, "rejected request: missing API key");
            ctx.stage = RequestStage::RejectedUnauthenticated;
            return reject(GatewayError::Authentication(
                "missing authentication credentials".into(),
            ));
        };

        match self.directory.lookup(key).await? {
            Some(tenant) => {
                debug!(request_id = %ctx.request_id, tenant = %tenant.id, tier = %tenant.tier, "authenticated");
                ctx.tenant = Some(tenant);
                Ok(FilterAction::Continue)
            }
            None => {
                // The key itself is never logged.
                warn!(request_id = %ctx.request_id, "rejected request: invalid API key");
                ctx.stage = RequestStage::RejectedUnauthenticated;
                reject(GatewayError::Authentication("invalid API key".into()))
            }
        }
    }
}
