//! Model computation contract.
//!
//! The gateway never looks inside a model.  A [`Predictor`] is the black box
//! behind one (family, version) pair; a [`PredictorFactory`] turns a manifest
//! artifact into a ready predictor at startup or on manifest refresh.

use super::family::{FamilyInput, ModelFamily};
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Family-specific result fields plus an overall confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Result fields merged into the top level of the response body.
    pub fields: Map<String, Value>,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(confidence: f64) -> Self {
        Self {
            fields: Map::new(),
            confidence,
        }
    }

    /// Builder helper: attach a result field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A loaded model, safe for concurrent read-only use.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Run the model.  The input has already been validated for this family.
    async fn infer(&self, input: &FamilyInput) -> Result<Prediction, GatewayError>;
}

/// Loads predictors from manifest artifacts.
pub trait PredictorFactory: Send + Sync {
    fn load(
        &self,
        family: ModelFamily,
        version: &str,
        artifact: &Path,
    ) -> Result<Arc<dyn Predictor>, GatewayError>;
}
