//! Reference predictors for the three built-in families.
//!
//! These stand in for trained networks: outputs are deterministic functions
//! of the input, so identical requests always produce identical results.

use async_trait::async_trait;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{
    AstrophysicsInput, BiologyInput, FamilyInput, MaterialsInput, ModelFamily, Prediction,
    Predictor, PredictorFactory,
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Solar effective temperature in kelvin.
const SOLAR_TEMP_K: f64 = 5772.0;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn wrong_input(expected: ModelFamily, got: &FamilyInput) -> GatewayError {
    GatewayError::Internal(format!("{expected} predictor received {} input", got.family()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Biology
// ─────────────────────────────────────────────────────────────────────────────

/// Version 1 predicts secondary structure; later versions predict tertiary
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiologyPredictor {
    Secondary,
    Tertiary,
}

impl BiologyPredictor {
    pub fn for_version(version: &str) -> Self {
        if version == "1" {
            BiologyPredictor::Secondary
        } else {
            BiologyPredictor::Tertiary
        }
    }

    fn run(&self, input: &BiologyInput) -> Prediction {
        let n = input.sequence.chars().count();
        match self {
            BiologyPredictor::Secondary => {
                let confidence = 0.92;
                let structure: String = if confidence < input.confidence_threshold {
                    "U".repeat(n)
                } else {
                    "HEC".chars().cycle().take(n).collect()
                };
                Prediction::new(round2(confidence * 100.0))
                    .with_field("sequence", input.sequence.clone())
                    .with_field("secondary_structure", structure)
            }
            BiologyPredictor::Tertiary => {
                let confidence = 0.89;
                let coords: Vec<Value> = if confidence < input.confidence_threshold {
                    Vec::new()
                } else {
                    (0..n)
                        .map(|i| {
                            let i = i as f64;
                            json!([round2(i * 1.1), round2(i * 1.2), round2(i * 1.3)])
                        })
                        .collect()
                };
                Prediction::new(round2(confidence * 100.0))
                    .with_field("sequence", input.sequence.clone())
                    .with_field("tertiary_coordinates", coords)
            }
        }
    }
}

#[async_trait]
impl Predictor for BiologyPredictor {
    async fn infer(&self, input: &FamilyInput) -> Result<Prediction, GatewayError> {
        match input {
            FamilyInput::Biology(b) => Ok(self.run(b)),
            other => Err(wrong_input(ModelFamily::Biology, other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Astrophysics
// ─────────────────────────────────────────────────────────────────────────────

/// Spectral classification and Stefan–Boltzmann radius estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstrophysicsPredictor;

impl AstrophysicsPredictor {
    pub fn spectral_class(temp: f64) -> &'static str {
        match temp {
            t if t >= 30_000.0 => "O",
            t if t >= 10_000.0 => "B",
            t if t >= 7_500.0 => "A",
            t if t >= 6_000.0 => "F",
            t if t >= 5_200.0 => "G",
            t if t >= 3_700.0 => "K",
            _ => "M",
        }
    }

    /// Radius in solar units from L = 4πR²σT⁴, normalised to the Sun.
    pub fn radius(temp: f64, luminosity: f64) -> f64 {
        luminosity.sqrt() * (SOLAR_TEMP_K / temp).powi(2)
    }

    fn run(&self, input: &AstrophysicsInput) -> Prediction {
        Prediction::new(97.49)
            .with_field("stellar_class", Self::spectral_class(input.temp))
            .with_field("radius_solar", round2(Self::radius(input.temp, input.luminosity)))
            .with_field("metallicity", input.metallicity)
    }
}

#[async_trait]
impl Predictor for AstrophysicsPredictor {
    async fn infer(&self, input: &FamilyInput) -> Result<Prediction, GatewayError> {
        match input {
            FamilyInput::Astrophysics(a) => Ok(self.run(a)),
            other => Err(wrong_input(ModelFamily::Astrophysics, other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Materials
// ─────────────────────────────────────────────────────────────────────────────

/// Battery-material property estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialsPredictor;

impl MaterialsPredictor {
    const CONFIDENCE: f64 = 99.9999951393316;

    const PROPERTIES: [(&'static str, f64); 7] = [
        ("formation_energy_per_atom", -0.4063791),
        ("energy_per_atom", -0.027647773),
        ("density", -0.6608056),
        ("volume", 0.12958337),
        ("n_elements", 5.313307),
        ("li_fraction", 0.10428204),
        ("predicted_band_gap", 1.515275),
    ];

    fn run(&self, input: &MaterialsInput) -> Prediction {
        let below_threshold = Self::CONFIDENCE / 100.0 < input.energy_threshold;
        let properties: serde_json::Map<String, Value> = Self::PROPERTIES
            .iter()
            .map(|(name, value)| {
                let v = if below_threshold { Value::Null } else { json!(value) };
                (name.to_string(), v)
            })
            .collect();
        Prediction::new(Self::CONFIDENCE)
            .with_field("input_structure", input.structure.clone())
            .with_field("predicted_properties", properties)
    }
}

#[async_trait]
impl Predictor for MaterialsPredictor {
    async fn infer(&self, input: &FamilyInput) -> Result<Prediction, GatewayError> {
        match input {
            FamilyInput::Materials(m) => Ok(self.run(m)),
            other => Err(wrong_input(ModelFamily::Materials, other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Loads the built-in predictor for each manifest entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPredictorFactory;

impl BuiltinPredictorFactory {
    pub fn predictor_for(family: ModelFamily, version: &str) -> Arc<dyn Predictor> {
        match family {
            ModelFamily::Biology => Arc::new(BiologyPredictor::for_version(version)),
            ModelFamily::Astrophysics => Arc::new(AstrophysicsPredictor),
            ModelFamily::Materials => Arc::new(MaterialsPredictor),
        }
    }
}

impl PredictorFactory for BuiltinPredictorFactory {
    fn load(
        &self,
        family: ModelFamily,
        version: &str,
        artifact: &Path,
    ) -> Result<Arc<dyn Predictor>, GatewayError> {
        if !artifact.is_file() {
            return Err(GatewayError::Internal(format!(
                "artifact {} is not readable",
                artifact.display()
            )));
        }
        debug!(family = %family, version, artifact = %artifact.display(), "loading built-in predictor");
        Ok(Self::predictor_for(family, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn predict(family: ModelFamily, version: &str, payload: Value) -> Prediction {
        let input = family.parse_input(&payload).unwrap().input;
        BuiltinPredictorFactory::predictor_for(family, version)
            .infer(&input)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn bio_v1_secondary_structure() {
        let p = predict(ModelFamily::Biology, "1", json!("ACDEF")).await;
        assert_eq!(p.fields["secondary_structure"], "HECHE");
        assert_eq!(p.confidence, 92.0);
    }

    #[tokio::test]
    async fn bio_v2_tertiary_coordinates() {
        let p = predict(ModelFamily::Biology, "2", json!("ACD")).await;
        assert_eq!(
            p.fields["tertiary_coordinates"],
            json!([[0.0, 0.0, 0.0], [1.1, 1.2, 1.3], [2.2, 2.4, 2.6]])
        );
        assert_eq!(p.confidence, 89.0);
    }

    #[tokio::test]
    async fn bio_threshold_masks_structure() {
        let p = predict(
            ModelFamily::Biology,
            "1",
            json!({ "sequence": "ACD", "confidence_threshold": 0.95 }),
        )
        .await;
        assert_eq!(p.fields["secondary_structure"], "UUU");
    }

    #[tokio::test]
    async fn astro_classifies_the_sun() {
        let p = predict(
            ModelFamily::Astrophysics,
            "1",
            json!({ "temp": 5772.0, "luminosity": 1.0, "metallicity": 0.0 }),
        )
        .await;
        assert_eq!(p.fields["stellar_class"], "G");
        assert_eq!(p.fields["radius_solar"], 1.0);
    }

    #[tokio::test]
    async fn materials_reports_properties() {
        let p = predict(ModelFamily::Materials, "1", json!("LiFePO4")).await;
        assert_eq!(p.fields["input_structure"], "LiFePO4");
        assert_eq!(p.fields["predicted_properties"]["predicted_band_gap"], 1.515275);
    }

    #[tokio::test]
    async fn predictors_reject_other_families() {
        let bio = ModelFamily::Biology.parse_input(&json!("ACD")).unwrap().input;
        assert!(MaterialsPredictor.infer(&bio).await.is_err());
    }

    #[test]
    fn factory_requires_artifact_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bio_1.pt");
        assert!(BuiltinPredictorFactory.load(ModelFamily::Biology, "1", &path).is_err());
        std::fs::write(&path, b"w").unwrap();
        assert!(BuiltinPredictorFactory.load(ModelFamily::Biology, "1", &path).is_ok());
    }
}
