//! Tenants, subscription tiers, and the identity lookup contract.

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription level determining a tenant's quota ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tier {
    Free,
    Standard,
    /// Premium plans are named by their ceiling, e.g. `premium-5k`.
    Premium(u64),
    Enterprise,
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "free" => return Ok(Tier::Free),
            "standard" | "pro" => return Ok(Tier::Standard),
            "enterprise" => return Ok(Tier::Enterprise),
            _ => {}
        }

        let amount = lower
            .strip_prefix("premium-")
            .ok_or_else(|| format!("unknown tier '{s}'"))?;
        let (digits, scale) = match amount.strip_suffix('k') {
            Some(d) => (d, 1_000),
            None => (amount, 1),
        };
        digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(scale))
            .filter(|n| *n > 0)
            .map(Tier::Premium)
            .ok_or_else(|| format!("invalid premium ceiling in tier '{s}'"))
    }
}

impl TryFrom<String> for Tier {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tier> for String {
    fn from(tier: Tier) -> Self {
        tier.to_string()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Free => f.write_str("free"),
            Tier::Standard => f.write_str("standard"),
            Tier::Premium(n) if n % 1_000 == 0 => write!(f, "premium-{}k", n / 1_000),
            Tier::Premium(n) => write!(f, "premium-{n}"),
            Tier::Enterprise => f.write_str("enterprise"),
        }
    }
}

/// Static tier table.  Free and standard ceilings may be overridden from
/// configuration; premium ceilings are carried by the tier itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub free: u64,
    pub standard: u64,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            free: 300,
            standard: 1_000,
        }
    }
}

impl TierLimits {
    /// Requests allowed per window, `None` for unbounded tiers.
    pub fn ceiling(&self, tier: Tier) -> Option<u64> {
        match tier {
            Tier::Free => Some(self.free),
            Tier::Standard => Some(self.standard),
            Tier::Premium(n) => Some(n),
            Tier::Enterprise => None,
        }
    }
}

/// Identity record resolved from an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub tier: Tier,
}

impl Tenant {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
        }
    }
}

/// Where a tenant stands against its ceiling after an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaState {
    WithinLimit,
    /// The admitted request consumed the last unit of the window.
    AtLimit,
    Unbounded,
}

/// Result of a successful quota admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    /// Window identifier, e.g. `2026-10`.
    pub window: String,
    /// Units consumed in the window, including this request.
    pub used: u64,
    /// Ceiling for the window; `None` when unbounded.
    pub limit: Option<u64>,
    pub state: QuotaState,
}

impl QuotaDecision {
    /// Units left in the window, `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.used))
    }
}

/// Maps API keys to tenants.
///
/// `Ok(None)` means the key is unknown; `Err` is reserved for lookup
/// failures (the directory itself being unreachable).
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup(&self, api_key: &str) -> Result<Option<Tenant>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tier_names_and_aliases() {
        assert_eq!("free".parse::<Tier>().unwrap(), Tier::Free);
        assert_eq!("pro".parse::<Tier>().unwrap(), Tier::Standard);
        assert_eq!("premium-1k".parse::<Tier>().unwrap(), Tier::Premium(1_000));
        assert_eq!("premium-10K".parse::<Tier>().unwrap(), Tier::Premium(10_000));
        assert_eq!("premium-3".parse::<Tier>().unwrap(), Tier::Premium(3));
        assert_eq!("Enterprise".parse::<Tier>().unwrap(), Tier::Enterprise);
    }

    #[test]
    fn rejects_unknown_and_zero() {
        assert!("gold".parse::<Tier>().is_err());
        assert!("premium-".parse::<Tier>().is_err());
        assert!("premium-0".parse::<Tier>().is_err());
        assert!("premium-abc".parse::<Tier>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for tier in [
            Tier::Free,
            Tier::Standard,
            Tier::Premium(5_000),
            Tier::Premium(3),
            Tier::Enterprise,
        ] {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn ceilings_follow_the_table() {
        let limits = TierLimits::default();
        assert_eq!(limits.ceiling(Tier::Free), Some(300));
        assert_eq!(limits.ceiling(Tier::Standard), Some(1_000));
        assert_eq!(limits.ceiling(Tier::Premium(5_000)), Some(5_000));
        assert_eq!(limits.ceiling(Tier::Enterprise), None);

        let tuned = TierLimits { free: 10, ..TierLimits::default() };
        assert_eq!(tuned.ceiling(Tier::Free), Some(10));
    }

    #[test]
    fn tier_deserialises_from_string() {
        let tenant: Tenant =
            serde_json::from_str(r#"{ "id": "acme", "tier": "premium-5k" }"#).unwrap();
        assert_eq!(tenant.tier, Tier::Premium(5_000));
        assert!(serde_json::from_str::<Tenant>(r#"{ "id": "x", "tier": "gold" }"#).is_err());
    }
}
