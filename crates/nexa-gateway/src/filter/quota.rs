//! Quota admission filter.
//!
//! Charges one unit to the authenticated tenant before dispatch.  Requests
//! rejected here never reach validation, the cache, or an engine.

use super::reject;
use crate::quota::QuotaEnforcer;
use async_trait::async_trait;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{FilterAction, FilterOrder, GatewayContext, GatewayFilter, RequestStage};
use std::sync::Arc;
use tracing::warn;

pub struct QuotaFilter {
    enforcer: Arc<QuotaEnforcer>,
}

impl QuotaFilter {
    pub fn new(enforcer: Arc<QuotaEnforcer>) -> Self {
        Self { enforcer }
    }
}

#[async_trait]
impl GatewayFilter for QuotaFilter {
    fn name(&self) -> &str {
        "quota"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::QUOTA
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        let Some(tenant) = ctx.tenant.clone() else {
            ctx.stage = RequestStage::RejectedUnauthenticated;
            return reject(GatewayError::Authentication(
                "quota requires an authenticated tenant".into(),
            ));
        };

        match self.enforcer.admit(&tenant).await {
            Ok(decision) => {
                ctx.quota = Some(decision);
                Ok(FilterAction::Continue)
            }
            Err(e @ GatewayError::QuotaExceeded { .. }) => {
                warn!(request_id = %ctx.request_id, tenant = %tenant.id, "rejected request: quota exhausted");
                ctx.stage = RequestStage::RejectedQuota;
                reject(e)
            }
            Err(e) => {
                ctx.stage = RequestStage::FailedInternal;
                reject(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use nexa_kernel::gateway::{Tenant, Tier, TierLimits};

    fn filter() -> QuotaFilter {
        QuotaFilter::new(Arc::new(QuotaEnforcer::new(
            Arc::new(InMemoryStore::new()),
            TierLimits::default(),
            false,
        )))
    }

    #[tokio::test]
    async fn records_decision_then_rejects_at_ceiling() {
        let f = filter();
        let mut c = GatewayContext::new("r1", "/predict/bio", "bio");
        c.tenant = Some(Tenant::new("t", Tier::Premium(1)));

        assert_eq!(f.on_request(&mut c).await.unwrap(), FilterAction::Continue);
        assert_eq!(c.quota.as_ref().unwrap().used, 1);

        let mut c2 = GatewayContext::new("r2", "/predict/bio", "bio");
        c2.tenant = Some(Tenant::new("t", Tier::Premium(1)));
        assert!(matches!(
            f.on_request(&mut c2).await.unwrap(),
            FilterAction::Reject(GatewayError::QuotaExceeded { .. })
        ));
        assert_eq!(c2.stage, RequestStage::RejectedQuota);
    }

    #[tokio::test]
    async fn anonymous_requests_are_refused() {
        let mut c = GatewayContext::new("r", "/predict/bio", "bio");
        assert!(matches!(
            filter().on_request(&mut c).await.unwrap(),
            FilterAction::Reject(GatewayError::Authentication(_))
        ));
    }
}
