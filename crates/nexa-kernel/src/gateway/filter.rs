//! Gateway filter trait and ordering.
//!
//! Filters run in ascending [`FilterOrder`] on the request path and in
//! descending order on the response path:
//!
//! ```text
//! Request  ──► Logging ──► Auth ──► Quota
//!                  (dispatch: resolve → validate → cache → engine)
//! Response ◄── Quota ◄── Auth ◄── Logging
//! ```

use super::types::GatewayContext;
use crate::error::GatewayError;
use async_trait::async_trait;

/// Numeric ordering slot for a filter in the chain.
///
/// Filters with equal order values run in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    /// Runs before authentication (request id injection, tracing).
    pub const PRE_AUTH: FilterOrder = FilterOrder(0);
    /// API key → tenant resolution.
    pub const AUTH: FilterOrder = FilterOrder(100);
    /// Quota admission.  Must run after `AUTH`.
    pub const QUOTA: FilterOrder = FilterOrder(200);
    /// Access logging.  Ahead of `AUTH` so refused requests are logged too.
    pub const LOGGING: FilterOrder = FilterOrder(10);
}

/// What the pipeline does after a filter's request hook.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterAction {
    /// Pass the request on to the next filter, then the dispatcher.
    Continue,
    /// Short-circuit with a typed error; the server maps it to a status.
    Reject(GatewayError),
}

/// A single stage of the admission pipeline.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Stable identifier used in logs.
    fn name(&self) -> &str;

    fn order(&self) -> FilterOrder;

    /// Inspect or enrich the context before dispatch.
    ///
    /// `Err` is reserved for the filter itself failing; an ordinary refusal is
    /// `Ok(FilterAction::Reject(..))`.
    async fn on_request(&self, ctx: &mut GatewayContext) -> Result<FilterAction, GatewayError>;

    /// Observe the final status of the request.
    async fn on_response(&self, _ctx: &GatewayContext, _status: u16) {}
}
