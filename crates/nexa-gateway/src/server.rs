//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] wires together the manifest, engines, shared store,
//! filter pipeline, and dispatcher into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/predict/{family}` | Run a prediction (authenticated, metered). |
//! | `GET`  | `/models` | Family → available versions. |
//! | `GET`  | `/health` | Overall status plus per-family availability. |
//! | `GET`  | `/usage` | Quota window and recent usage for the caller. |
//! | `POST` | `/models/refresh` | Rescan the model directory (admin key). |
//! | `GET`  | `/metrics` | Prometheus text exposition. |

use crate::backend::BuiltinPredictorFactory;
use crate::cache::ResponseCache;
use crate::config::GatewayServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ApiError, ApiResult};
use crate::filter::{FilterPipeline, LoggingFilter, QuotaFilter, TenantAuthFilter};
use crate::manifest::ModelVersionManager;
use crate::metrics::GatewayMetrics;
use crate::quota::QuotaEnforcer;
use crate::store::InMemoryStore;
use crate::usage::UsageTracker;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{
    FilterAction, GatewayContext, GatewayFilter, ModelFamily, PredictorFactory, RequestStage,
    SharedStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Header carrying the admin key for `POST /models/refresh`.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// `hit` or `miss` on every successful prediction.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    auth: Arc<TenantAuthFilter>,
    quota: Arc<QuotaEnforcer>,
    usage: Arc<UsageTracker>,
    metrics: GatewayMetrics,
    admin_api_key: Option<Arc<str>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

pub struct GatewayServer {
    config: GatewayServerConfig,
    store: Arc<InMemoryStore>,
    factory: Arc<dyn PredictorFactory>,
    usage: Arc<UsageTracker>,
}

impl GatewayServer {
    /// Create a server backed by the in-process store and built-in predictors.
    pub fn new(config: GatewayServerConfig) -> Self {
        Self {
            config,
            store: Arc::new(InMemoryStore::new()),
            factory: Arc::new(BuiltinPredictorFactory),
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Builder helper: load models through a different factory.
    pub fn with_predictor_factory(mut self, factory: Arc<dyn PredictorFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn config(&self) -> &GatewayServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Load the manifest and engines and build the axum [`Router`].
    ///
    /// Missing or unusable models do not fail the build; the gateway starts
    /// with whatever families loaded.
    pub fn build_app(&self) -> Result<Router, GatewayError> {
        let config = &self.config;
        let store: Arc<dyn SharedStore> = self.store.clone();

        let metrics = GatewayMetrics::new()
            .map_err(|e| GatewayError::Internal(format!("metrics registry: {e}")))?;

        let manifest = Arc::new(ModelVersionManager::open(
            &config.model_dir,
            &config.manifest_file,
        ));
        let cache = Arc::new(ResponseCache::new(store.clone(), config.cache_ttl()));
        let quota = Arc::new(QuotaEnforcer::new(
            store,
            config.tier_limits,
            config.quota_fail_open,
        ));
        let auth = Arc::new(TenantAuthFilter::new(Arc::new(config.tenant_directory())));

        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            auth.clone() as Arc<dyn GatewayFilter>,
            Arc::new(QuotaFilter::new(quota.clone())),
            Arc::new(LoggingFilter::new()),
        ];
        let dispatcher = Dispatcher::new(
            FilterPipeline::new(filters),
            manifest,
            self.factory.clone(),
            cache,
            metrics.clone(),
            config.request_timeout(),
        );

        if config.tenants.is_empty() {
            warn!("no tenants configured; every prediction request will be rejected");
        }

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            auth,
            quota,
            usage: self.usage.clone(),
            metrics,
            admin_api_key: config.admin_api_key.as_deref().map(Arc::from),
        };

        Ok(Router::new()
            .route("/predict/{family}", post(predict_handler))
            .route("/models", get(list_models_handler))
            .route("/models/refresh", post(refresh_models_handler))
            .route("/health", get(health_handler))
            .route("/usage", get(usage_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state))
    }

    /// Bind to `{host}:{port}` and serve until the process exits.
    pub async fn start(self) -> std::io::Result<()> {
        let app = self
            .build_app()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        self.spawn_gc();

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(addr = %addr, "Nexa inference gateway starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await
    }

    /// Periodically purge expired store entries and usage records.
    fn spawn_gc(&self) {
        let store = self.store.clone();
        let usage = self.usage.clone();
        let period = self.config.store_gc_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.purge_expired();
                usage.purge_expired();
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn context_from(path: &str, family: &str, headers: &HeaderMap) -> GatewayContext {
    let mut ctx = GatewayContext::new(Uuid::new_v4().to_string(), path, family);
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            ctx.headers.insert(name.as_str().to_lowercase(), v.to_string());
        }
    }
    ctx
}

/// `POST /predict/{family}`.
async fn predict_handler(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let _in_flight = state.metrics.in_flight();

    let mut ctx = context_from(&format!("/predict/{family}"), &family, &headers);
    let outcome = state.dispatcher.handle_json(&mut ctx, &body).await;

    let response = match outcome {
        Ok(done) => {
            ctx.stage = RequestStage::Responded;
            let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
            state
                .usage
                .record(ctx.principal(), &done.model, latency_ms, done.cache_hit);

            let cache_status = if done.cache_hit { "hit" } else { "miss" };
            let mut resp = Response::new(Body::from(done.body));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            resp.headers_mut()
                .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
            resp
        }
        Err(e) => ApiError(e).into_response(),
    };

    let status = response.status().as_u16();
    state.dispatcher.pipeline().run_response(&ctx, status).await;

    let label = ModelFamily::from_name(&family)
        .map(|f| f.name())
        .unwrap_or("unknown");
    state
        .metrics
        .observe_request(label, status, started.elapsed());
    response
}

/// `GET /models`: family → versions in ascending version order.
async fn list_models_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.manifest().list())
}

/// `GET /health`: `ok` when every family is available, else `degraded`.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.dispatcher.health();
    let status = if models.values().all(|up| *up) {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({ "status": status, "models": models }))
}

/// `GET /usage`: the caller's quota window and recent call statistics.
async fn usage_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let mut ctx = context_from("/usage", "", &headers);
    if let FilterAction::Reject(e) = state.auth.on_request(&mut ctx).await? {
        return Err(ApiError(e));
    }
    let Some(tenant) = ctx.tenant else {
        return Err(ApiError(GatewayError::Authentication(
            "missing authentication credentials".into(),
        )));
    };

    let quota = state.quota.usage(&tenant).await?;
    let summary = state.usage.summary(&tenant.id);
    Ok(Json(json!({
        "tenant": tenant.id,
        "tier": tenant.tier,
        "window": quota.window,
        "used": quota.used,
        "limit": quota.limit,
        "remaining": quota.remaining(),
        "state": quota.state,
        "metrics": summary,
    })))
}

/// `POST /models/refresh`: reload the manifest and engines.
async fn refresh_models_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(expected) = state.admin_api_key.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let supplied = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok());
    if supplied != Some(expected) {
        warn!("rejected model refresh: bad admin key");
        return ApiError(GatewayError::Authentication("invalid admin key".into())).into_response();
    }

    match state.dispatcher.refresh().await {
        Ok(_) => Json(json!({ "models": state.dispatcher.manifest().list() })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// `GET /metrics`: Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
