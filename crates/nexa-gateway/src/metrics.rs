//! Prometheus metrics for the gateway.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    /// Completed prediction requests by family and HTTP status.
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    /// Actual model computations (cache misses that reached an engine).
    pub engine_invocations_total: IntCounterVec,
    /// Cache lookups by result (`hit`, `miss`).
    pub cache_lookups_total: IntCounterVec,
    pub active_requests: IntGauge,
    /// Quota refusals by reason (`exhausted`, `store_unavailable`).
    pub quota_denials_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("nexa_requests_total", "Prediction requests by family and status"),
            &["family", "status"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nexa_request_duration_seconds",
                "Prediction request latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["family"],
        )?;
        let engine_invocations_total = IntCounterVec::new(
            Opts::new("nexa_engine_invocations_total", "Model computations by family and version"),
            &["family", "version"],
        )?;
        let cache_lookups_total = IntCounterVec::new(
            Opts::new("nexa_cache_lookups_total", "Response cache lookups by result"),
            &["result"],
        )?;
        let active_requests =
            IntGauge::new("nexa_active_requests", "Prediction requests currently in flight")?;
        let quota_denials_total = IntCounterVec::new(
            Opts::new("nexa_quota_denials_total", "Requests refused by quota admission"),
            &["reason"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(engine_invocations_total.clone()))?;
        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(quota_denials_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            engine_invocations_total,
            cache_lookups_total,
            active_requests,
            quota_denials_total,
        })
    }

    pub fn observe_request(&self, family: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        self.requests_total
            .with_label_values(&[family, status.as_str()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[family])
            .observe(elapsed.as_secs_f64());
    }

    /// Count a request as in flight until the guard is dropped.
    pub fn in_flight(&self) -> InFlightGuard {
        self.active_requests.inc();
        InFlightGuard(self.active_requests.clone())
    }

    pub fn cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn engine_invoked(&self, family: &str, version: &str) {
        self.engine_invocations_total
            .with_label_values(&[family, version])
            .inc();
    }

    pub fn quota_denied(&self, reason: &str) {
        self.quota_denials_total.with_label_values(&[reason]).inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = TextEncoder::new().encode_utf8(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        buffer
    }
}

/// Decrements `nexa_active_requests` on drop, including when the handler
/// future is cancelled.
pub struct InFlightGuard(IntGauge);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recorded_series() {
        let m = GatewayMetrics::new().unwrap();
        m.observe_request("bio", 200, Duration::from_millis(12));
        m.cache_lookup(true);
        m.engine_invoked("bio", "2");
        m.quota_denied("exhausted");

        let out = m.render();
        assert!(out.contains(r#"nexa_requests_total{family="bio",status="200"} 1"#));
        assert!(out.contains(r#"nexa_cache_lookups_total{result="hit"} 1"#));
        assert!(out.contains(r#"nexa_engine_invocations_total{family="bio",version="2"} 1"#));
        assert!(out.contains(r#"nexa_quota_denials_total{reason="exhausted"} 1"#));
        assert!(out.contains("nexa_request_duration_seconds_bucket"));
    }

    #[tokio::test]
    async fn in_flight_gauge_recovers_from_cancelled_requests() {
        let m = GatewayMetrics::new().unwrap();
        let guard = m.in_flight();
        assert_eq!(m.active_requests.get(), 1);
        drop(guard);
        assert_eq!(m.active_requests.get(), 0);

        let metrics = m.clone();
        let request = tokio::spawn(async move {
            let _guard = metrics.in_flight();
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        assert_eq!(m.active_requests.get(), 1);

        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        assert_eq!(m.active_requests.get(), 0);
    }
}
