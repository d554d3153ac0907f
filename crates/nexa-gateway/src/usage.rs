//! Per-tenant usage history for the `/usage` report.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Records older than this are dropped on the next write or purge.
pub const USAGE_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
struct UsageRecord {
    at: DateTime<Utc>,
    model: String,
    latency_ms: f64,
    cached: bool,
}

/// Aggregate view of one tenant's recent calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub average_response_time_ms: f64,
    pub cache_hits: u64,
    pub model_usage: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct UsageTracker {
    records: DashMap<String, Vec<UsageRecord>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tenant: &str, model: &str, latency_ms: f64, cached: bool) {
        self.record_at(tenant, model, latency_ms, cached, Utc::now());
    }

    pub fn record_at(
        &self,
        tenant: &str,
        model: &str,
        latency_ms: f64,
        cached: bool,
        at: DateTime<Utc>,
    ) {
        let cutoff = at - ChronoDuration::days(USAGE_RETENTION_DAYS);
        let mut entry = self.records.entry(tenant.to_string()).or_default();
        entry.retain(|r| r.at >= cutoff);
        entry.push(UsageRecord {
            at,
            model: model.to_string(),
            latency_ms,
            cached,
        });
    }

    pub fn summary(&self, tenant: &str) -> UsageSummary {
        self.summary_at(tenant, Utc::now())
    }

    pub fn summary_at(&self, tenant: &str, now: DateTime<Utc>) -> UsageSummary {
        let cutoff = now - ChronoDuration::days(USAGE_RETENTION_DAYS);
        let Some(records) = self.records.get(tenant) else {
            return UsageSummary::default();
        };

        let mut summary = UsageSummary::default();
        let mut latency_total = 0.0;
        for r in records.iter().filter(|r| r.at >= cutoff) {
            summary.total_calls += 1;
            latency_total += r.latency_ms;
            if r.cached {
                summary.cache_hits += 1;
            }
            *summary.model_usage.entry(r.model.clone()).or_default() += 1;
        }
        if summary.total_calls > 0 {
            summary.average_response_time_ms = latency_total / summary.total_calls as f64;
        }
        summary
    }

    /// Drop expired records and tenants with none left.
    pub fn purge_expired(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(USAGE_RETENTION_DAYS);
        self.records.retain(|_, records| {
            records.retain(|r| r.at >= cutoff);
            !records.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn summarises_calls() {
        let usage = UsageTracker::new();
        usage.record("acme", "bio_2", 10.0, false);
        usage.record("acme", "bio_2", 2.0, true);
        usage.record("acme", "astro_1", 6.0, false);
        usage.record("other", "bio_1", 100.0, false);

        let s = usage.summary("acme");
        assert_eq!(s.total_calls, 3);
        assert_eq!(s.cache_hits, 1);
        assert!((s.average_response_time_ms - 6.0).abs() < 1e-9);
        assert_eq!(s.model_usage["bio_2"], 2);
        assert_eq!(s.model_usage["astro_1"], 1);
    }

    #[test]
    fn unknown_tenant_is_empty() {
        assert_eq!(UsageTracker::new().summary("nobody"), UsageSummary::default());
    }

    #[test]
    fn old_records_fall_out_of_the_window() {
        let usage = UsageTracker::new();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        usage.record_at("acme", "bio_1", 1.0, false, start);
        usage.record_at("acme", "bio_1", 1.0, false, start + ChronoDuration::days(31));

        let s = usage.summary_at("acme", start + ChronoDuration::days(31));
        assert_eq!(s.total_calls, 1);
    }
}
