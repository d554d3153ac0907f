//! Gateway configuration.
//!
//! Settings come from an optional file (TOML, YAML, JSON, ... chosen by
//! extension, with `${VAR}` substitution), then `NEXA_*` environment
//! variables, then the short operational overrides listed below.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `GATEWAY_PORT` | `port` |
//! | `MODEL_DIR` | `model_dir` |
//! | `CACHE_TTL_SECS` | `cache_ttl_secs` |
//! | `REQUEST_TIMEOUT_MS` | `request_timeout_ms` |
//! | `QUOTA_FAIL_OPEN` | `quota_fail_open` |

use crate::tenants::StaticTenantDirectory;
use nexa_kernel::config::{ConfigResult, load_from_env, load_with_env};
use nexa_kernel::gateway::{Tenant, Tier, TierLimits};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Prefix for structured environment overrides, e.g. `NEXA_TIER_LIMITS__FREE`.
pub const ENV_PREFIX: &str = "NEXA";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// One API key and the tenant it authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub api_key: String,
    pub tenant_id: String,
    pub tier: Tier,
}

/// Runtime configuration for [`GatewayServer`](crate::server::GatewayServer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayServerConfig {
    pub host: String,
    /// TCP port to listen on (default: 3000).
    pub port: u16,
    /// Directory holding model artifacts and the manifest.
    pub model_dir: PathBuf,
    /// Manifest filename inside `model_dir`.
    pub manifest_file: String,
    pub cache_ttl_secs: u64,
    /// Overall per-request deadline.
    pub request_timeout_ms: u64,
    /// Admit requests while the quota store is unreachable.
    pub quota_fail_open: bool,
    /// Interval of the expired-entry purge task.
    pub store_gc_interval_secs: u64,
    pub log_format: LogFormat,
    /// Enables `POST /models/refresh` when set.
    pub admin_api_key: Option<String>,
    pub tenants: Vec<TenantConfig>,
    pub tier_limits: TierLimits,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            model_dir: PathBuf::from("models"),
            manifest_file: "manifest.json".to_string(),
            cache_ttl_secs: 3600,
            request_timeout_ms: 30_000,
            quota_fail_open: false,
            store_gc_interval_secs: 60,
            log_format: LogFormat::Text,
            admin_api_key: None,
            tenants: Vec::new(),
            tier_limits: TierLimits::default(),
        }
    }
}

impl GatewayServerConfig {
    /// Load from `path` or from defaults, with `NEXA_*` overrides either
    /// way, then apply the operational environment overrides.
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        let mut config: Self = match path {
            Some(p) => load_with_env(p, ENV_PREFIX)?,
            None => load_from_env(ENV_PREFIX)?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the short-form environment variables.  Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse("GATEWAY_PORT") {
            self.port = port;
        }
        if let Ok(dir) = std::env::var("MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = env_parse("CACHE_TTL_SECS") {
            self.cache_ttl_secs = ttl;
        }
        if let Some(ms) = env_parse("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = ms;
        }
        if let Some(open) = env_parse("QUOTA_FAIL_OPEN") {
            self.quota_fail_open = open;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn store_gc_interval(&self) -> Duration {
        Duration::from_secs(self.store_gc_interval_secs.max(1))
    }

    pub fn tenant_directory(&self) -> StaticTenantDirectory {
        self.tenants
            .iter()
            .map(|t| (t.api_key.clone(), Tenant::new(t.tenant_id.clone(), t.tier)))
            .collect()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexa_kernel::config::{FileFormat, from_str};

    #[test]
    fn defaults() {
        let c = GatewayServerConfig::default();
        assert_eq!(c.port, 3000);
        assert_eq!(c.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(c.request_timeout(), Duration::from_secs(30));
        assert!(!c.quota_fail_open);
        assert!(c.tenant_directory().is_empty());
    }

    #[test]
    fn parses_toml_with_tenants() {
        let c: GatewayServerConfig = from_str(
            r#"
            port = 8080
            model_dir = "/srv/models"
            admin_api_key = "root"
            log_format = "json"

            [tier_limits]
            free = 50

            [[tenants]]
            api_key = "k1"
            tenant_id = "acme"
            tier = "premium-5k"
            "#,
            FileFormat::Toml,
        )
        .unwrap();

        assert_eq!(c.port, 8080);
        assert_eq!(c.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(c.manifest_file, "manifest.json");
        assert_eq!(c.log_format, LogFormat::Json);
        assert_eq!(c.tier_limits.free, 50);
        assert_eq!(c.tier_limits.standard, 1_000);
        assert_eq!(c.tenants[0].tier, Tier::Premium(5_000));
        assert_eq!(c.tenant_directory().len(), 1);
    }

    #[test]
    fn structured_env_overrides_apply_without_a_file() {
        unsafe { std::env::set_var("NEXA_TIER_LIMITS__STANDARD", "77"); }
        unsafe { std::env::set_var("NEXA_STORE_GC_INTERVAL_SECS", "9"); }

        let c = GatewayServerConfig::load(None).unwrap();
        assert_eq!(c.tier_limits.standard, 77);
        assert_eq!(c.tier_limits.free, 300);
        assert_eq!(c.store_gc_interval(), Duration::from_secs(9));
        assert_eq!(c.manifest_file, "manifest.json");

        unsafe { std::env::remove_var("NEXA_TIER_LIMITS__STANDARD"); }
        unsafe { std::env::remove_var("NEXA_STORE_GC_INTERVAL_SECS"); }
    }

    #[test]
    fn unknown_tier_is_a_config_error() {
        let r: ConfigResult<GatewayServerConfig> = from_str(
            r#"{ "tenants": [{ "api_key": "k", "tenant_id": "t", "tier": "gold" }] }"#,
            FileFormat::Json,
        );
        assert!(r.is_err());
    }
}
