//! Wire types and the per-request context.

use super::tenant::{QuotaDecision, Tenant};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /predict/{family}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Family-specific payload; validated by the family's engine.
    pub input: Value,
    /// Explicit model version; the latest version is used when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Body returned for a successful prediction.
///
/// Family-specific result fields are flattened into the top level next to
/// `model`, `confidence`, and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// `<family>_<version>`, e.g. `bio_2`.
    pub model: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub confidence: f64,
    /// RFC 3339 time at which the result was computed.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Position of a request in the admission pipeline.
///
/// ```text
/// Received → Validated → CacheChecked → Computed | ServedFromCache → Responded
/// ```
///
/// Rejections and failures are terminal.  There is no retry state; retrying
/// is the client's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Received,
    Validated,
    CacheChecked,
    Computed,
    ServedFromCache,
    Responded,
    RejectedInvalidInput,
    RejectedQuota,
    RejectedUnauthenticated,
    FailedInternal,
}

impl RequestStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStage::Responded
                | RequestStage::RejectedInvalidInput
                | RequestStage::RejectedQuota
                | RequestStage::RejectedUnauthenticated
                | RequestStage::FailedInternal
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Received => "received",
            RequestStage::Validated => "validated",
            RequestStage::CacheChecked => "cache_checked",
            RequestStage::Computed => "computed",
            RequestStage::ServedFromCache => "served_from_cache",
            RequestStage::Responded => "responded",
            RequestStage::RejectedInvalidInput => "rejected_invalid_input",
            RequestStage::RejectedQuota => "rejected_quota",
            RequestStage::RejectedUnauthenticated => "rejected_unauthenticated",
            RequestStage::FailedInternal => "failed_internal",
        }
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable context that flows through the filter chain for a single request.
///
/// Filters read from and write to this context, so the quota filter can see
/// the tenant resolved by the auth filter and the access log can report both.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// Unique identifier for correlating this request across logs.
    pub request_id: String,
    /// Request path, e.g. `/predict/bio`.
    pub path: String,
    /// Family segment as supplied by the caller (not yet resolved).
    pub family: String,
    /// HTTP headers (names lowercased).
    pub headers: HashMap<String, String>,
    /// Tenant resolved by the auth filter; `None` until authenticated.
    pub tenant: Option<Tenant>,
    /// Quota admission recorded by the quota filter.
    pub quota: Option<QuotaDecision>,
    pub stage: RequestStage,
    /// Free-form attributes written and read by filters.
    pub attributes: HashMap<String, Value>,
}

impl GatewayContext {
    pub fn new(
        request_id: impl Into<String>,
        path: impl Into<String>,
        family: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            path: path.into(),
            family: family.into(),
            headers: HashMap::new(),
            tenant: None,
            quota: None,
            stage: RequestStage::Received,
            attributes: HashMap::new(),
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_lowercase(), value.into());
        self
    }

    /// Header lookup by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Read a typed attribute, `None` if absent or of the wrong shape.
    pub fn get_attr<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Write a serializable attribute.
    pub fn set_attr<T: Serialize>(&mut self, key: impl Into<String>, val: &T) {
        if let Ok(v) = serde_json::to_value(val) {
            self.attributes.insert(key.into(), v);
        }
    }

    /// Id of the authenticated tenant, or `"anonymous"`.
    pub fn principal(&self) -> &str {
        self.tenant.as_ref().map(|t| t.id.as_str()).unwrap_or("anonymous")
    }
}
