//! `nexa-gateway`: Nexa scientific inference gateway runtime.
//!
//! This crate provides the concrete implementations of the contracts defined
//! in `nexa-kernel::gateway`:
//!
//! | Kernel contract | Implementation |
//! |----------------|----------------|
//! | [`SharedStore`](gateway::SharedStore) | [`store::InMemoryStore`] |
//! | [`TenantDirectory`](gateway::TenantDirectory) | [`tenants::StaticTenantDirectory`] |
//! | [`PredictorFactory`](gateway::PredictorFactory) | [`backend::BuiltinPredictorFactory`] |
//! | [`GatewayFilter`](gateway::GatewayFilter) | [`filter::TenantAuthFilter`], [`filter::QuotaFilter`], [`filter::LoggingFilter`] |
//!
//! The [`server::GatewayServer`] wires the model manifest, engines, response
//! cache, and quota enforcer into an axum HTTP service.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use nexa_gateway::config::GatewayServerConfig;
//! use nexa_gateway::server::GatewayServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GatewayServerConfig {
//!         model_dir: "models".into(),
//!         ..Default::default()
//!     };
//!     GatewayServer::new(config).start().await.unwrap();
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod metrics;
pub mod quota;
pub mod server;
pub mod store;
pub mod tenants;
pub mod usage;

// Re-export the kernel gateway types for convenience.
pub use nexa_kernel::gateway;
