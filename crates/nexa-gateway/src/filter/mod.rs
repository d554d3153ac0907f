//! Admission filters.

mod auth;
mod logger;
mod quota;

pub use auth::{TenantAuthFilter, extract_api_key};
pub use logger::LoggingFilter;
pub use quota::QuotaFilter;

use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{FilterAction, GatewayContext, GatewayFilter};
use std::sync::Arc;

/// Ordered list of filters executed as a pipeline.
///
/// Filters are sorted by [`FilterOrder`](nexa_kernel::gateway::FilterOrder)
/// ascending (lowest value runs first on the request path).
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every `on_request` hook in ascending order, stopping at the first
    /// rejection.  A filter that fails outright is reported as a rejection.
    pub async fn run_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        for filter in &self.filters {
            match filter.on_request(ctx).await {
                Ok(FilterAction::Continue) => {}
                Ok(other) => return other,
                Err(e) => return FilterAction::Reject(e),
            }
        }
        FilterAction::Continue
    }

    /// Run every `on_response` hook in descending order.
    pub async fn run_response(&self, ctx: &GatewayContext, status: u16) {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, status).await;
        }
    }
}

/// Rejection helper shared by the filters.
pub(crate) fn reject(err: GatewayError) -> Result<FilterAction, GatewayError> {
    Ok(FilterAction::Reject(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nexa_kernel::gateway::FilterOrder;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        order: FilterOrder,
        reject: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl GatewayFilter for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn order(&self) -> FilterOrder {
            self.order
        }
        async fn on_request(&self, _ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError> {
            self.seen.lock().push(format!("req:{}", self.name));
            if self.reject {
                return reject(GatewayError::Authentication("no".into()));
            }
            Ok(FilterAction::Continue)
        }
        async fn on_response(&self, _ctx: &GatewayContext, status: u16) {
            self.seen.lock().push(format!("resp:{}:{status}", self.name));
        }
    }

    fn recorder(
        name: &'static str,
        order: u32,
        reject: bool,
        seen: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn GatewayFilter> {
        Arc::new(Recorder {
            name,
            order: FilterOrder(order),
            reject,
            seen: seen.clone(),
        })
    }

    #[tokio::test]
    async fn runs_in_order_and_unwinds_in_reverse() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = FilterPipeline::new(vec![
            recorder("late", 300, false, &seen),
            recorder("early", 10, false, &seen),
        ]);
        assert_eq!(pipeline.names(), ["early", "late"]);

        let mut ctx = GatewayContext::new("r", "/predict/bio", "bio");
        assert_eq!(pipeline.run_request(&mut ctx).await, FilterAction::Continue);
        pipeline.run_response(&ctx, 200).await;

        assert_eq!(
            *seen.lock(),
            ["req:early", "req:late", "resp:late:200", "resp:early:200"]
        );
    }

    #[tokio::test]
    async fn rejection_short_circuits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = FilterPipeline::new(vec![
            recorder("auth", 100, true, &seen),
            recorder("quota", 200, false, &seen),
        ]);

        let mut ctx = GatewayContext::new("r", "/predict/bio", "bio");
        let action = pipeline.run_request(&mut ctx).await;
        assert!(matches!(
            action,
            FilterAction::Reject(GatewayError::Authentication(_))
        ));
        assert_eq!(*seen.lock(), ["req:auth"]);
    }
}
