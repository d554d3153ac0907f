//! `nexa-kernel`: contracts for the Nexa scientific inference gateway.
//!
//! The kernel defines *what* the gateway talks to, never *how*:
//!
//! | Contract | Purpose |
//! |----------|---------|
//! | [`gateway::Predictor`] | black-box model computation for one (family, version) |
//! | [`gateway::SharedStore`] | external key-value store with TTL and atomic increment-and-compare |
//! | [`gateway::TenantDirectory`] | API key → tenant/tier lookup |
//!
//! Concrete implementations (manifest scanning, caching, quota enforcement,
//! the axum server) live in `nexa-gateway`.

#[cfg(feature = "config")]
pub mod config;

pub mod error;
pub mod gateway;

pub use error::{GatewayError, StoreError};
