//! Configuration loading
//!
//! Gateway settings can be written in any format the `config` crate
//! understands (YAML, TOML, JSON, INI, RON, JSON5).  The format is picked from
//! the file extension, `${VAR}` / `$VAR` references are substituted from the
//! process environment before parsing, and [`load_with_env`] layers
//! `PREFIX_FIELD__NESTED` environment variables on top of the file.

use config::{Config as Cfg, Environment, File};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;

pub use config::FileFormat;

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex")
});

static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("static regex"));

/// Detect configuration format from file extension
///
/// `.yaml`/`.yml`, `.toml`, `.json`, `.ini`, `.ron`, `.json5`.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// `${NAME}` is replaced first, then bare `$NAME`.  References to unset
/// variables are left untouched so the parser can report them verbatim.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn deserialize<T: DeserializeOwned>(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<T> {
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, detecting the format from its extension.
///
/// ```rust,ignore
/// use nexa_kernel::config::load_config;
///
/// #[derive(serde::Deserialize)]
/// struct ServerSection {
///     port: u16,
/// }
///
/// let cfg: ServerSection = load_config("gateway.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration from a string with an explicit format.
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);
    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Merge several files in order; later files override earlier ones key by key.
pub fn merge_configs<T>(paths: &[&str]) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();
    for path in paths {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        builder = builder.add_source(File::from_str(&substitute_env_vars(&content), format));
    }
    deserialize(builder)
}

fn env_source(env_prefix: &str) -> Environment {
    Environment::with_prefix(env_prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Build configuration from `{env_prefix}_...` variables alone.  Fields
/// without a variable fall back to the target's serde defaults.
pub fn load_from_env<T>(env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    deserialize(Cfg::builder().add_source(env_source(env_prefix)))
}

/// Load a file and then apply `{env_prefix}_...` environment overrides.
///
/// Nested fields are addressed with a double underscore, so
/// `NEXA_CACHE_TTL_SECS=60` overrides `cache_ttl_secs` and
/// `NEXA_TIER_LIMITS__FREE=50` overrides `tier_limits.free`.
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(
        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(env_source(env_prefix)),
    )
}
