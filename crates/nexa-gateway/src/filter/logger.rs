//! Structured access-logging filter.
//!
//! Emits `tracing` events on the request and response path with the request
//! id, path, tenant, final stage, status, and round-trip latency.

use async_trait::async_trait;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{FilterAction, FilterOrder, GatewayContext, GatewayFilter};
use tracing::{error, info, warn};

const START_ATTR: &str = "log.request_start_ms";

#[derive(Default)]
pub struct LoggingFilter;

impl LoggingFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::LOGGING
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
        info!(
            request_id = %ctx.request_id,
            path       = %ctx.path,
            family     = %ctx.family,
            "→ inbound request"
        );
        ctx.set_attr(START_ATTR, &now_ms());
        Ok(FilterAction::Continue)
    }

    async fn on_response(&self, ctx: &GatewayContext, status: u16) {
        // Absent when an earlier filter rejected the request.
        let latency_ms = ctx
            .get_attr::<u64>(START_ATTR)
            .map(|start| now_ms().saturating_sub(start));

        if status >= 500 {
            error!(
                request_id = %ctx.request_id,
                path       = %ctx.path,
                tenant     = ctx.principal(),
                stage      = %ctx.stage,
                status,
                latency_ms = ?latency_ms,
                "← error response"
            );
        } else if status >= 400 {
            warn!(
                request_id = %ctx.request_id,
                path       = %ctx.path,
                tenant     = ctx.principal(),
                stage      = %ctx.stage,
                status,
                "← rejected"
            );
        } else {
            info!(
                request_id = %ctx.request_id,
                path       = %ctx.path,
                tenant     = ctx.principal(),
                stage      = %ctx.stage,
                status,
                latency_ms = ?latency_ms,
                "← outbound response"
            );
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterPipeline, TenantAuthFilter};
    use crate::tenants::StaticTenantDirectory;
    use std::sync::Arc;

    #[tokio::test]
    async fn stamps_start_time() {
        let mut ctx = GatewayContext::new("r", "/predict/bio", "bio");
        let action = LoggingFilter::new().on_request(&mut ctx).await.unwrap();
        assert_eq!(action, FilterAction::Continue);
        assert!(ctx.get_attr::<u64>(START_ATTR).is_some());
        LoggingFilter::new().on_response(&ctx, 200).await;
    }

    #[tokio::test]
    async fn logs_requests_that_auth_refuses() {
        let auth = TenantAuthFilter::new(Arc::new(StaticTenantDirectory::new()));
        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(auth) as Arc<dyn GatewayFilter>,
            Arc::new(LoggingFilter::new()),
        ];
        let pipeline = FilterPipeline::new(filters);
        assert_eq!(pipeline.names(), ["access-log", "tenant-auth"]);

        let mut ctx = GatewayContext::new("r", "/predict/bio", "bio").with_header("x-api-key", "nope");
        let action = pipeline.run_request(&mut ctx).await;
        assert!(matches!(action, FilterAction::Reject(GatewayError::Authentication(_))));
        assert!(ctx.get_attr::<u64>(START_ATTR).is_some());
        pipeline.run_response(&ctx, 401).await;
    }
}
