//! Component wiring shared by the CLI and the HTTP server.

use std::sync::Arc;

use docrag_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::extract::OfficeParser;
use crate::gateway::EmbeddingGateway;
use crate::ingest::IngestionPipeline;
use crate::migrate;
use crate::providers::StrategyRegistry;
use crate::registry::{builtin_seeds, ProviderRegistry, ProviderSeed, RegistrySettings};
use crate::retrieval::RetrievalEngine;
use crate::sqlite_store::SqliteStore;

/// Every service, built over one store.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub registry: ProviderRegistry,
    pub gateway: Arc<EmbeddingGateway>,
    pub pipeline: IngestionPipeline,
    pub retrieval: RetrievalEngine,
}

impl App {
    /// Connect to the configured database, apply migrations, and build
    /// the services.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Self::with_store(config, Arc::new(SqliteStore::new(pool)))
    }

    /// Build the services over an existing store.
    pub fn with_store(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let registry = ProviderRegistry::new(
            store.clone(),
            StrategyRegistry::with_builtins(),
            RegistrySettings::from_config(&config.providers),
        )?;
        let gateway = Arc::new(EmbeddingGateway::new(registry.clone()));
        let pipeline = IngestionPipeline::new(
            store.clone(),
            gateway.clone(),
            Arc::new(OfficeParser),
            config.chunking.clone(),
        );
        let retrieval =
            RetrievalEngine::new(store, gateway.clone(), config.retrieval.default_limit);
        Ok(Self {
            config: Arc::new(config.clone()),
            registry,
            gateway,
            pipeline,
            retrieval,
        })
    }

    /// Seeds for the built-in providers with configured overrides applied.
    pub fn builtin_seeds(&self) -> Vec<ProviderSeed> {
        builtin_seeds(self.registry.strategies(), &self.config.providers)
    }
}
