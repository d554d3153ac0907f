//! Inference gateway kernel contract.
//!
//! This module defines the trait interfaces and data types for the Nexa
//! gateway.  Concrete implementations belong in `nexa-gateway`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              nexa-kernel  (this module)                     │
//! │  ModelFamily / FamilyInput (validation)                     │
//! │  Predictor + PredictorFactory traits                        │
//! │  SharedStore trait      TenantDirectory trait  Tier         │
//! │  GatewayFilter trait    PredictRequest/Response             │
//! │  RequestStage           GatewayContext                      │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              nexa-gateway  (runtime crate)                  │
//! │  ModelVersionManager   EngineRegistry   ResponseCache       │
//! │  QuotaEnforcer   InMemoryStore   FilterPipeline             │
//! │  Dispatcher   GatewayServer (axum)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod family;
pub mod filter;
pub mod store;
pub mod tenant;
pub mod types;

pub use engine::{Prediction, Predictor, PredictorFactory};
pub use family::{
    AstrophysicsInput, BiologyInput, FamilyInput, MaterialsInput, ModelFamily, ValidatedInput,
};
pub use filter::{FilterAction, FilterOrder, GatewayFilter};
pub use store::{Increment, SharedStore};
pub use tenant::{QuotaDecision, QuotaState, Tenant, TenantDirectory, Tier, TierLimits};
pub use types::{GatewayContext, PredictRequest, PredictResponse, RequestStage};

pub use crate::error::{GatewayError, StoreError};
