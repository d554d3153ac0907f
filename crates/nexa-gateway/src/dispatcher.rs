//! Request dispatch: admission, resolution, validation, cache, engine.
//!
//! ```text
//! filters (log → auth → quota) → resolve version → engine validates input
//!     → cache lookup ──hit──► cached body
//!           │miss
//!           ▼
//!     engine (spawned) → cache store → fresh body
//! ```
//!
//! The whole sequence runs under the request deadline.  The engine call runs
//! on its own task, so a computation that outlives the deadline still
//! finishes and populates the cache for the next identical request.

use crate::backend::EngineRegistry;
use crate::cache::{ResponseCache, fingerprint};
use crate::filter::FilterPipeline;
use crate::manifest::{Manifest, ModelVersionManager};
use crate::metrics::GatewayMetrics;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{
    FilterAction, GatewayContext, ModelFamily, PredictRequest, PredictResponse, PredictorFactory,
    RequestStage,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A successful prediction, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    /// Serialized [`PredictResponse`].
    pub body: Vec<u8>,
    /// `<family>_<version>` that served the request.
    pub model: String,
    pub cache_hit: bool,
}

pub struct Dispatcher {
    pipeline: FilterPipeline,
    manifest: Arc<ModelVersionManager>,
    factory: Arc<dyn PredictorFactory>,
    engines: RwLock<Arc<EngineRegistry>>,
    cache: Arc<ResponseCache>,
    metrics: GatewayMetrics,
    deadline: Duration,
}

impl Dispatcher {
    /// Build the engine table from the manager's current snapshot.
    pub fn new(
        pipeline: FilterPipeline,
        manifest: Arc<ModelVersionManager>,
        factory: Arc<dyn PredictorFactory>,
        cache: Arc<ResponseCache>,
        metrics: GatewayMetrics,
        deadline: Duration,
    ) -> Self {
        let engines =
            EngineRegistry::build(&manifest.snapshot(), manifest.model_dir(), factory.as_ref());
        Self {
            pipeline,
            manifest,
            factory,
            engines: RwLock::new(Arc::new(engines)),
            cache,
            metrics,
            deadline,
        }
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    pub fn manifest(&self) -> &ModelVersionManager {
        &self.manifest
    }

    pub fn engines(&self) -> Arc<EngineRegistry> {
        self.engines.read().clone()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run a prediction request end to end under the deadline.
    pub async fn handle(
        &self,
        ctx: &mut GatewayContext,
        request: PredictRequest,
    ) -> Result<Dispatched, GatewayError> {
        self.with_deadline(ctx, Ok(request)).await
    }

    /// Like [`handle`](Self::handle) for a raw JSON body.  A malformed body
    /// is reported as a validation failure, after authentication and quota.
    pub async fn handle_json(
        &self,
        ctx: &mut GatewayContext,
        body: &[u8],
    ) -> Result<Dispatched, GatewayError> {
        let request = serde_json::from_slice::<PredictRequest>(body).map_err(|e| {
            GatewayError::invalid(ctx.family.as_str(), format!("malformed request body: {e}"))
        });
        self.with_deadline(ctx, request).await
    }

    async fn with_deadline(
        &self,
        ctx: &mut GatewayContext,
        request: Result<PredictRequest, GatewayError>,
    ) -> Result<Dispatched, GatewayError> {
        match tokio::time::timeout(self.deadline, self.run(ctx, request)).await {
            Ok(result) => result,
            Err(_) => {
                let ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX);
                warn!(request_id = %ctx.request_id, deadline_ms = ms, "request deadline elapsed");
                ctx.stage = RequestStage::FailedInternal;
                Err(GatewayError::Timeout(ms))
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut GatewayContext,
        request: Result<PredictRequest, GatewayError>,
    ) -> Result<Dispatched, GatewayError> {
        if let FilterAction::Reject(err) = self.pipeline.run_request(ctx).await {
            match &err {
                GatewayError::QuotaExceeded { .. } => self.metrics.quota_denied("exhausted"),
                GatewayError::StoreUnavailable(_) => self.metrics.quota_denied("store_unavailable"),
                _ => {}
            }
            return Err(err);
        }

        let request = match request {
            Ok(r) => r,
            Err(e) => {
                ctx.stage = RequestStage::RejectedInvalidInput;
                return Err(e);
            }
        };

        let resolved = match self.manifest.resolve(&ctx.family, request.version.as_deref()) {
            Ok(r) => r,
            Err(e) => {
                ctx.stage = RequestStage::RejectedInvalidInput;
                return Err(e);
            }
        };
        let Some(family) = ModelFamily::from_name(&resolved.family) else {
            ctx.stage = RequestStage::RejectedInvalidInput;
            return Err(GatewayError::ModelNotFound(resolved.family));
        };
        let model = resolved.model_id();

        let Some(engine) = self.engines().get(family, &resolved.version) else {
            ctx.stage = RequestStage::FailedInternal;
            return Err(GatewayError::Internal(format!("model {model} is not loaded")));
        };

        let validated = match engine.validate(&request.input) {
            Ok(v) => v,
            Err(e) => {
                ctx.stage = RequestStage::RejectedInvalidInput;
                return Err(e);
            }
        };
        ctx.stage = RequestStage::Validated;

        let key = fingerprint(family.name(), &resolved.version, &validated.input.canonical());
        let cached = self.cache.get(&key).await;
        ctx.stage = RequestStage::CacheChecked;
        self.metrics.cache_lookup(cached.is_some());
        if let Some(body) = cached {
            debug!(request_id = %ctx.request_id, model = %model, "served from cache");
            ctx.stage = RequestStage::ServedFromCache;
            return Ok(Dispatched {
                body,
                model,
                cache_hit: true,
            });
        }

        let task = {
            let cache = self.cache.clone();
            let metrics = self.metrics.clone();
            let model = model.clone();
            tokio::spawn(async move {
                metrics.engine_invoked(engine.family().name(), engine.version());
                let prediction = engine.infer(&validated.input).await?;
                let response = PredictResponse {
                    model,
                    fields: prediction.fields,
                    confidence: prediction.confidence,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    warnings: validated.warnings,
                };
                let body = serde_json::to_vec(&response)
                    .map_err(|e| GatewayError::Internal(format!("response encoding: {e}")))?;
                cache.put(&key, body.clone()).await;
                Ok::<_, GatewayError>(body)
            })
        };

        let body = match task.await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                ctx.stage = RequestStage::FailedInternal;
                return Err(e);
            }
            Err(join) => {
                ctx.stage = RequestStage::FailedInternal;
                return Err(GatewayError::Internal(format!("engine task failed: {join}")));
            }
        };
        ctx.stage = RequestStage::Computed;

        Ok(Dispatched {
            body,
            model,
            cache_hit: false,
        })
    }

    /// Reload the manifest from disk and rebuild the engine table.
    ///
    /// In-flight requests keep the engines they already hold.
    pub async fn refresh(&self) -> Result<Arc<Manifest>, GatewayError> {
        let manifest = self.manifest.clone();
        let factory = self.factory.clone();
        let (snapshot, engines) = tokio::task::spawn_blocking(move || {
            let snapshot = manifest.refresh();
            let engines = EngineRegistry::build(&snapshot, manifest.model_dir(), factory.as_ref());
            (snapshot, engines)
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("manifest refresh failed: {e}")))?;

        info!(entries = snapshot.len(), engines = engines.len(), "models refreshed");
        *self.engines.write() = Arc::new(engines);
        Ok(snapshot)
    }

    /// Family → whether its latest version has a loaded engine and an
    /// artifact on disk.
    pub fn health(&self) -> BTreeMap<&'static str, bool> {
        let engines = self.engines();
        ModelFamily::ALL
            .iter()
            .map(|family| {
                let up = self
                    .manifest
                    .resolve(family.name(), None)
                    .is_ok_and(|m| m.artifact.is_file() && engines.get(*family, &m.version).is_some());
                (family.name(), up)
            })
            .collect()
    }
}
