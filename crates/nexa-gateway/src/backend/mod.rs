//! Inference engines.

mod builtin;
mod registry;

pub use builtin::{AstrophysicsPredictor, BiologyPredictor, BuiltinPredictorFactory, MaterialsPredictor};
pub use registry::{EngineRegistry, ModelEngine};
