//! Model families and their input contracts.
//!
//! Each family is dispatched by an explicit [`ModelFamily`] tag.  Raw JSON
//! payloads are turned into a typed [`FamilyInput`] by
//! [`ModelFamily::parse_input`], which is also where validation happens:
//! a payload either becomes a typed input (possibly with advisory warnings)
//! or is rejected with [`GatewayError::InputValidation`].

use crate::error::GatewayError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::LazyLock;

/// Amino-acid alphabet accepted in biology sequences.
pub const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Shortest materials structure string that is worth sending to a model.
pub const MIN_STRUCTURE_LEN: usize = 3;

/// Metallicity range ([Fe/H], dex) outside of which astrophysics predictions
/// are flagged as extrapolated.
pub const METALLICITY_RANGE: (f64, f64) = (-4.0, 1.0);

const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;
const DEFAULT_ENERGY_THRESHOLD: f64 = 0.5;

static FORMULA_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z][a-z]?\d*(?:\.\d+)?)+$").expect("static regex")
});

/// A named class of inference task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Biology,
    Astrophysics,
    Materials,
}

impl ModelFamily {
    /// Every family the gateway knows how to serve.
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::Biology,
        ModelFamily::Astrophysics,
        ModelFamily::Materials,
    ];

    /// Canonical name used in manifest keys, artifact filenames, and the
    /// `model` field of responses.
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Biology => "bio",
            ModelFamily::Astrophysics => "astro",
            ModelFamily::Materials => "materials",
        }
    }

    /// Case-insensitive lookup accepting the canonical name and common aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bio" | "biology" => Some(ModelFamily::Biology),
            "astro" | "astrophysics" => Some(ModelFamily::Astrophysics),
            "materials" | "material" | "mat" => Some(ModelFamily::Materials),
            _ => None,
        }
    }

    /// Validate a raw payload and convert it into the family's typed input.
    pub fn parse_input(&self, payload: &Value) -> Result<ValidatedInput, GatewayError> {
        match self {
            ModelFamily::Biology => BiologyInput::parse(payload),
            ModelFamily::Astrophysics => AstrophysicsInput::parse(payload),
            ModelFamily::Materials => MaterialsInput::parse(payload),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A payload that passed validation, with any advisory warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub input: FamilyInput,
    pub warnings: Vec<String>,
}

impl ValidatedInput {
    fn clean(input: FamilyInput) -> Self {
        Self {
            input,
            warnings: Vec::new(),
        }
    }
}

/// Typed, validated input with one variant per family.
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyInput {
    Biology(BiologyInput),
    Astrophysics(AstrophysicsInput),
    Materials(MaterialsInput),
}

impl FamilyInput {
    pub fn family(&self) -> ModelFamily {
        match self {
            FamilyInput::Biology(_) => ModelFamily::Biology,
            FamilyInput::Astrophysics(_) => ModelFamily::Astrophysics,
            FamilyInput::Materials(_) => ModelFamily::Materials,
        }
    }

    /// Canonical JSON form.  Two payloads that mean the same thing (string vs
    /// object form, different case, surrounding whitespace, omitted defaults)
    /// produce the same value, so they share a cache fingerprint.
    pub fn canonical(&self) -> Value {
        match self {
            FamilyInput::Biology(b) => json!({
                "sequence": b.sequence,
                "confidence_threshold": b.confidence_threshold,
            }),
            FamilyInput::Astrophysics(a) => json!({
                "temp": a.temp,
                "luminosity": a.luminosity,
                "metallicity": a.metallicity,
            }),
            FamilyInput::Materials(m) => json!({
                "structure": m.structure,
                "energy_threshold": m.energy_threshold,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Biology
// ─────────────────────────────────────────────────────────────────────────────

/// Protein sequence input.
#[derive(Debug, Clone, PartialEq)]
pub struct BiologyInput {
    /// Upper-cased amino-acid sequence.
    pub sequence: String,
    pub confidence_threshold: f64,
}

impl BiologyInput {
    fn parse(payload: &Value) -> Result<ValidatedInput, GatewayError> {
        let family = ModelFamily::Biology.name();
        let (raw, fields) = string_or_field(payload, "sequence", family)?;

        let sequence = raw.trim().to_ascii_uppercase();
        if sequence.is_empty() {
            return Err(GatewayError::invalid(family, "sequence must not be empty"));
        }
        if let Some((pos, bad)) = sequence
            .chars()
            .enumerate()
            .find(|(_, c)| !AMINO_ACIDS.contains(*c))
        {
            return Err(GatewayError::invalid(
                family,
                format!("sequence contains disallowed character '{bad}' at position {pos}"),
            ));
        }

        let confidence_threshold = optional_f64(fields, "confidence_threshold", family)?
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(GatewayError::invalid(
                family,
                "confidence_threshold must lie in [0, 1]",
            ));
        }

        Ok(ValidatedInput::clean(FamilyInput::Biology(BiologyInput {
            sequence,
            confidence_threshold,
        })))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Astrophysics
// ─────────────────────────────────────────────────────────────────────────────

/// Stellar observables.
#[derive(Debug, Clone, PartialEq)]
pub struct AstrophysicsInput {
    /// Effective temperature in kelvin.
    pub temp: f64,
    /// Luminosity in solar units.
    pub luminosity: f64,
    /// Metallicity [Fe/H] in dex.
    pub metallicity: f64,
}

impl AstrophysicsInput {
    fn parse(payload: &Value) -> Result<ValidatedInput, GatewayError> {
        let family = ModelFamily::Astrophysics.name();
        let fields = payload.as_object().ok_or_else(|| {
            GatewayError::invalid(
                family,
                "expected an object with temp, luminosity and metallicity",
            )
        })?;

        let temp = required_f64(fields, "temp", family)?;
        let luminosity = required_f64(fields, "luminosity", family)?;
        let metallicity = required_f64(fields, "metallicity", family)?;

        if temp <= 0.0 {
            return Err(GatewayError::invalid(family, "temp must be positive"));
        }
        if luminosity <= 0.0 {
            return Err(GatewayError::invalid(family, "luminosity must be positive"));
        }

        let mut warnings = Vec::new();
        let (lo, hi) = METALLICITY_RANGE;
        if !(lo..=hi).contains(&metallicity) {
            warnings.push(format!(
                "metallicity {metallicity} is outside the calibrated range [{lo}, {hi}]"
            ));
        }

        Ok(ValidatedInput {
            input: FamilyInput::Astrophysics(AstrophysicsInput {
                temp,
                luminosity,
                metallicity,
            }),
            warnings,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Materials
// ─────────────────────────────────────────────────────────────────────────────

/// Crystal structure (formula or POSCAR text).
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialsInput {
    pub structure: String,
    pub energy_threshold: f64,
}

impl MaterialsInput {
    fn parse(payload: &Value) -> Result<ValidatedInput, GatewayError> {
        let family = ModelFamily::Materials.name();
        let (raw, fields) = string_or_field(payload, "structure", family)?;

        let structure = raw.trim().to_string();
        if structure.chars().count() < MIN_STRUCTURE_LEN {
            return Err(GatewayError::invalid(
                family,
                format!("structure must be at least {MIN_STRUCTURE_LEN} characters"),
            ));
        }

        let energy_threshold =
            optional_f64(fields, "energy_threshold", family)?.unwrap_or(DEFAULT_ENERGY_THRESHOLD);
        if energy_threshold < 0.0 {
            return Err(GatewayError::invalid(
                family,
                "energy_threshold must not be negative",
            ));
        }

        let mut warnings = Vec::new();
        if !structure
            .split_whitespace()
            .any(|token| FORMULA_TOKEN.is_match(token))
        {
            warnings.push(
                "structure has no recognisable element symbols; expected a formula or POSCAR block"
                    .to_string(),
            );
        }

        Ok(ValidatedInput {
            input: FamilyInput::Materials(MaterialsInput {
                structure,
                energy_threshold,
            }),
            warnings,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Accept either a bare string or an object carrying the string under `field`.
fn string_or_field<'a>(
    payload: &'a Value,
    field: &str,
    family: &str,
) -> Result<(&'a str, Option<&'a Map<String, Value>>), GatewayError> {
    match payload {
        Value::String(s) => Ok((s.as_str(), None)),
        Value::Object(map) => match map.get(field) {
            Some(Value::String(s)) => Ok((s.as_str(), Some(map))),
            Some(_) => Err(GatewayError::invalid(
                family,
                format!("field '{field}' must be a string"),
            )),
            None => Err(GatewayError::invalid(
                family,
                format!("missing required field '{field}'"),
            )),
        },
        _ => Err(GatewayError::invalid(
            family,
            format!("expected a string or an object with '{field}'"),
        )),
    }
}

fn required_f64(fields: &Map<String, Value>, name: &str, family: &str) -> Result<f64, GatewayError> {
    optional_f64(Some(fields), name, family)?
        .ok_or_else(|| GatewayError::invalid(family, format!("missing required field '{name}'")))
}

fn optional_f64(
    fields: Option<&Map<String, Value>>,
    name: &str,
    family: &str,
) -> Result<Option<f64>, GatewayError> {
    match fields.and_then(|f| f.get(name)) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(GatewayError::invalid(
                family,
                format!("field '{name}' must be a finite number"),
            )),
        },
    }
}
