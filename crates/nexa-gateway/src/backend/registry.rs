//! Loaded engines keyed by (family, version).

use crate::manifest::Manifest;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{
    FamilyInput, ModelFamily, Prediction, Predictor, PredictorFactory, ValidatedInput,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// One loaded model.  Read-only after construction and shared across
/// concurrent requests.
pub struct ModelEngine {
    family: ModelFamily,
    version: String,
    artifact: PathBuf,
    predictor: Arc<dyn Predictor>,
}

impl ModelEngine {
    pub fn new(
        family: ModelFamily,
        version: impl Into<String>,
        artifact: impl Into<PathBuf>,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        Self {
            family,
            version: version.into(),
            artifact: artifact.into(),
            predictor,
        }
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// `<family>_<version>`.
    pub fn model_id(&self) -> String {
        format!("{}_{}", self.family, self.version)
    }

    /// Check a raw payload against this engine's family rules.
    pub fn validate(&self, payload: &Value) -> Result<ValidatedInput, GatewayError> {
        self.family.parse_input(payload)
    }

    pub async fn infer(&self, input: &FamilyInput) -> Result<Prediction, GatewayError> {
        if input.family() != self.family {
            return Err(GatewayError::Internal(format!(
                "{} engine received {} input",
                self.family,
                input.family()
            )));
        }
        self.predictor.infer(input).await
    }
}

/// Engine table built from a manifest snapshot.
///
/// A failing artifact or an unrecognised family disables only that entry;
/// the rest of the table still loads.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<(ModelFamily, String), Arc<ModelEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(manifest: &Manifest, model_dir: &Path, factory: &dyn PredictorFactory) -> Self {
        let mut registry = Self::new();
        for (family_name, version, artifact) in manifest.entries() {
            let Some(family) = ModelFamily::from_name(family_name) else {
                warn!(family = family_name, "no engine for model family; skipping");
                continue;
            };
            let path = model_dir.join(artifact);
            match factory.load(family, version, &path) {
                Ok(predictor) => {
                    registry.insert(ModelEngine::new(family, version, path, predictor));
                }
                Err(e) => {
                    error!(family = %family, version, artifact, error = %e, "engine failed to load");
                }
            }
        }
        info!(engines = registry.len(), "engine registry built");
        registry
    }

    /// Add an engine, replacing any previous one for the same key.
    pub fn insert(&mut self, engine: ModelEngine) {
        self.engines
            .insert((engine.family, engine.version.clone()), Arc::new(engine));
    }

    pub fn get(&self, family: ModelFamily, version: &str) -> Option<Arc<ModelEngine>> {
        self.engines.get(&(family, version.to_string())).cloned()
    }

    /// `true` when at least one version of `family` is loaded.
    pub fn has_family(&self, family: ModelFamily) -> bool {
        self.engines.keys().any(|(f, _)| *f == family)
    }

    pub fn families(&self) -> BTreeSet<&'static str> {
        self.engines.keys().map(|(f, _)| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BuiltinPredictorFactory;

    struct Refuses;

    impl PredictorFactory for Refuses {
        fn load(&self, family: ModelFamily, version: &str, _: &Path) -> Result<Arc<dyn Predictor>, GatewayError> {
            if version == "bad" {
                return Err(GatewayError::Internal(format!("cannot load {family} {version}")));
            }
            Ok(BuiltinPredictorFactory::predictor_for(family, version))
        }
    }

    fn manifest() -> Manifest {
        let mut m = Manifest::new();
        m.insert("bio", "1", "bio_1.pt");
        m.insert("bio", "bad", "bio_bad.pt");
        m.insert("astro", "1", "astro_1.pt");
        m.insert("chemistry", "1", "chemistry_1.pt");
        m
    }

    #[test]
    fn failed_and_unknown_entries_are_skipped() {
        let reg = EngineRegistry::build(&manifest(), Path::new("/models"), &Refuses);
        assert_eq!(reg.len(), 2);
        assert!(reg.get(ModelFamily::Biology, "1").is_some());
        assert!(reg.get(ModelFamily::Biology, "bad").is_none());
        assert!(reg.has_family(ModelFamily::Astrophysics));
        assert!(!reg.has_family(ModelFamily::Materials));
        assert_eq!(reg.families().into_iter().collect::<Vec<_>>(), ["astro", "bio"]);
    }

    #[test]
    fn engine_knows_its_artifact() {
        let reg = EngineRegistry::build(&manifest(), Path::new("/models"), &Refuses);
        let engine = reg.get(ModelFamily::Biology, "1").unwrap();
        assert_eq!(engine.model_id(), "bio_1");
        assert_eq!(engine.artifact(), Path::new("/models/bio_1.pt"));
    }

    #[tokio::test]
    async fn engine_rejects_foreign_input() {
        let reg = EngineRegistry::build(&manifest(), Path::new("/models"), &Refuses);
        let engine = reg.get(ModelFamily::Astrophysics, "1").unwrap();
        let bio = reg
            .get(ModelFamily::Biology, "1")
            .unwrap()
            .validate(&serde_json::json!("ACDE"))
            .unwrap()
            .input;
        assert!(matches!(engine.infer(&bio).await, Err(GatewayError::Internal(_))));
        assert!(engine.validate(&serde_json::json!({ "temp": -1.0 })).is_err());
    }
}
