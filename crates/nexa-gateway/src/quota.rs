//! Per-tenant quota admission over calendar-month windows.
//!
//! Admission is one atomic increment-and-compare against the shared store, so
//! concurrent requests from any number of replicas can never push a tenant
//! past its ceiling.  A denied request leaves the counter untouched.

use chrono::{DateTime, Utc};
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{QuotaDecision, QuotaState, SharedStore, Tenant, TierLimits};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Counters outlive their month so late reads still see the final count.
pub const QUOTA_COUNTER_TTL: Duration = Duration::from_secs(35 * 24 * 60 * 60);

/// `YYYY-MM` in UTC.
pub fn window_id(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

pub fn quota_key(tenant_id: &str, window: &str) -> String {
    format!("quota:{tenant_id}:{window}")
}

pub struct QuotaEnforcer {
    store: Arc<dyn SharedStore>,
    limits: TierLimits,
    fail_open: bool,
}

impl QuotaEnforcer {
    /// `fail_open = false` rejects requests while the store is unreachable.
    pub fn new(store: Arc<dyn SharedStore>, limits: TierLimits, fail_open: bool) -> Self {
        Self {
            store,
            limits,
            fail_open,
        }
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    /// Charge one unit to `tenant` in the current window.
    pub async fn admit(&self, tenant: &Tenant) -> Result<QuotaDecision, GatewayError> {
        self.admit_at(tenant, Utc::now()).await
    }

    /// Charge one unit to `tenant` in the window containing `now`.
    pub async fn admit_at(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, GatewayError> {
        let window = window_id(now);
        let key = quota_key(&tenant.id, &window);
        let limit = self.limits.ceiling(tenant.tier);

        let increment = match self.store.incr_within(&key, limit, QUOTA_COUNTER_TTL).await {
            Ok(inc) => inc,
            Err(e) if self.fail_open => {
                warn!(tenant = %tenant.id, error = %e, "quota store unreachable; admitting without charge");
                return Ok(QuotaDecision {
                    state: state_for(0, limit),
                    window,
                    used: 0,
                    limit,
                });
            }
            Err(e) => {
                error!(tenant = %tenant.id, error = %e, "quota store unreachable; rejecting");
                return Err(e.into());
            }
        };

        if !increment.admitted {
            let limit = limit.unwrap_or(increment.count);
            debug!(tenant = %tenant.id, window = %window, limit, "quota exhausted");
            return Err(GatewayError::QuotaExceeded {
                tenant: tenant.id.clone(),
                limit,
                window,
            });
        }

        Ok(QuotaDecision {
            state: state_for(increment.count, limit),
            used: increment.count,
            window,
            limit,
        })
    }

    /// Read-only view of the current window, for reporting.
    pub async fn usage(&self, tenant: &Tenant) -> Result<QuotaDecision, GatewayError> {
        let window = window_id(Utc::now());
        let used = self.store.counter(&quota_key(&tenant.id, &window)).await?;
        let limit = self.limits.ceiling(tenant.tier);
        Ok(QuotaDecision {
            state: state_for(used, limit),
            window,
            used,
            limit,
        })
    }
}

fn state_for(used: u64, limit: Option<u64>) -> QuotaState {
    match limit {
        None => QuotaState::Unbounded,
        Some(l) if used >= l => QuotaState::AtLimit,
        Some(_) => QuotaState::WithinLimit,
    }
}
