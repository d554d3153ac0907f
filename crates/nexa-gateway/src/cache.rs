//! Response cache keyed by a content fingerprint.
//!
//! A fingerprint covers the resolved family, the resolved version, and the
//! canonical form of the validated input, so equivalent requests share an
//! entry and a new model version never serves results computed by an older
//! one.  The cached value is the serialized response body, which keeps cache
//! hits byte-identical to the original computation.
//!
//! The cache is advisory: store failures are logged and treated as misses.

use nexa_kernel::gateway::SharedStore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key prefix separating cache entries from quota counters.
pub const CACHE_KEY_PREFIX: &str = "cache:";

/// `cache:<sha256 hex>` over `[family, version, canonical input]`.
///
/// `serde_json` writes object keys in sorted order, so the digest does not
/// depend on how the caller ordered its fields.
pub fn fingerprint(family: &str, version: &str, canonical_input: &Value) -> String {
    let material = Value::Array(vec![
        Value::from(family),
        Value::from(version),
        canonical_input.clone(),
    ]);
    let mut hasher = Sha256::new();
    hasher.update(material.to_string().as_bytes());
    format!("{CACHE_KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

pub struct ResponseCache {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached body for `key`; any store failure reads as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(hit) => {
                debug!(key, hit = hit.is_some(), "cache lookup");
                hit
            }
            Err(e) => {
                warn!(key, error = %e, "cache lookup failed; treating as miss");
                None
            }
        }
    }

    /// Store a body.  Failure is logged and otherwise ignored.
    pub async fn put(&self, key: &str, body: Vec<u8>) {
        if let Err(e) = self.store.set_with_ttl(key, body, self.ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
}
