//! Shared runtime state for nx-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself.

use std::sync::Arc;

use nx_config::PortalConfig;
use nx_payments::{HttpProvider, ProviderApi};
use sqlx::PgPool;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub provider: Arc<dyn ProviderApi>,
    pub config: PortalConfig,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool, config: PortalConfig) -> Self {
        let provider = Arc::new(HttpProvider::new(config.provider.clone()));
        Self::with_provider(pool, config, provider)
    }

    /// Tests inject a mock provider here.
    pub fn with_provider(
        pool: PgPool,
        config: PortalConfig,
        provider: Arc<dyn ProviderApi>,
    ) -> Self {
        Self {
            pool,
            provider,
            config,
            build: BuildInfo {
                service: "nx-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
