//! Provider registry: provider records, model catalogs, connection tests.
//!
//! # Lifecycle
//!
//! ```text
//! bootstrap / register ──► test_provider ──(success)──► refresh_models
//!                               │                            │
//!                     status persisted on record      catalog replaced
//! ```
//!
//! A connection test never fails the caller on provider errors: the
//! outcome is stored on the record and returned as a [`TestOutcome`]. On
//! success a catalog refresh is spawned in the background; its failure is
//! logged and does not touch the test result.
//!
//! Writes to one provider record are serialized by a per-record lock.
//! Reads take no lock; the store always returns whole records.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docrag_core::models::{Model, ModelSpec, Provider, ProviderConfig, ProviderKind, ProviderView, TestResult};
use docrag_core::store::Store;

use crate::config::ProvidersConfig;
use crate::error::{Error, ProviderError, Result};
use crate::providers::{ProviderContext, ProviderStrategy, StrategyRegistry};

/// Timeouts and per-provider catalog requirements.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub test_timeout: Duration,
    pub request_timeout: Duration,
    /// Extra required model ids keyed by provider name.
    pub required_models: HashMap<String, Vec<String>>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
            required_models: HashMap::new(),
        }
    }
}

impl RegistrySettings {
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self {
            test_timeout: Duration::from_secs(config.test_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            required_models: config
                .overrides
                .keys()
                .map(|name| (name.clone(), config.required_models(name)))
                .collect(),
        }
    }
}

/// A provider to ensure at bootstrap.
#[derive(Debug, Clone)]
pub struct ProviderSeed {
    pub name: String,
    pub config: ProviderConfig,
    pub credential: Option<String>,
}

/// Seeds for every registered strategy, with configuration overrides
/// applied. Credentials come from `api_key_env` (default
/// `<NAME>_API_KEY`) for API providers.
pub fn builtin_seeds(strategies: &StrategyRegistry, config: &ProvidersConfig) -> Vec<ProviderSeed> {
    strategies
        .iter()
        .map(|strategy| {
            let name = strategy.name().to_string();
            let overrides = config.get(&name);
            let mut provider_config = strategy.default_config();
            if let Some(url) = overrides.and_then(|o| o.base_url.as_ref()) {
                provider_config.set_base_url(url.clone());
            }
            let credential = match strategy.kind() {
                ProviderKind::Local => None,
                ProviderKind::Api => {
                    let var = overrides
                        .and_then(|o| o.api_key_env.clone())
                        .unwrap_or_else(|| format!("{}_API_KEY", name.to_uppercase()));
                    std::env::var(&var).ok().filter(|v| !v.trim().is_empty())
                }
            };
            ProviderSeed {
                name,
                config: provider_config,
                credential,
            }
        })
        .collect()
}

/// Input for [`ProviderRegistry::register`].
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    pub config: ProviderConfig,
    pub credential: Option<String>,
    pub is_active: bool,
}

/// Whether an attribute is part of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Change<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Change<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Change::Keep => None,
            Change::Set(v) => Some(v),
        }
    }
}

/// Partial update of a provider. Unset attributes are left alone.
#[derive(Debug, Clone, Default)]
pub struct ProviderPatch {
    pub name: Change<String>,
    /// An empty or blank value is ignored; the stored credential stays.
    pub credential: Change<String>,
    pub config: Change<ProviderConfig>,
    pub is_active: Change<bool>,
}

/// Result of a connection test.
#[derive(Debug, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
    /// Failure class, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// The catalog refresh spawned on success.
    #[serde(skip)]
    pub refresh: Option<RefreshHandle>,
}

/// A detached catalog refresh that may be awaited.
#[derive(Debug)]
pub struct RefreshHandle(JoinHandle<Result<usize>>);

impl RefreshHandle {
    /// Wait for the refresh. Returns the catalog size, or `None` if the
    /// refresh failed (the failure has already been logged).
    pub async fn wait(self) -> Option<usize> {
        match self.0.await {
            Ok(Ok(count)) => Some(count),
            _ => None,
        }
    }
}

#[derive(Default)]
struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RecordLocks {
    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, id: &str) {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

/// Owns provider records and their model catalogs.
///
/// Cheap to clone; clones share the store, HTTP client, and locks.
#[derive(Clone)]
pub struct ProviderRegistry {
    store: Arc<dyn Store>,
    strategies: Arc<StrategyRegistry>,
    client: reqwest::Client,
    settings: Arc<RegistrySettings>,
    locks: Arc<RecordLocks>,
    /// Serializes record creation so name checks and inserts do not race.
    create_lock: Arc<tokio::sync::Mutex<()>>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("provider name must not be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Validation(format!(
            "provider name '{}' may only contain letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(name.to_string())
}

fn validate_config(config: &ProviderConfig) -> Result<()> {
    let url = reqwest::Url::parse(config.base_url()).map_err(|e| {
        Error::Validation(format!("invalid baseUrl '{}': {}", config.base_url(), e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "baseUrl must be http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(())
}

/// Append a synthesized entry for every required id missing from `specs`.
pub fn ensure_required(specs: &mut Vec<ModelSpec>, required: &[String]) {
    for id in required {
        if !specs.iter().any(|m| &m.model_id == id) {
            let mut spec = ModelSpec::new(id.clone());
            spec.metadata = serde_json::json!({ "synthesized": true });
            specs.push(spec);
        }
    }
}

impl ProviderRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        strategies: StrategyRegistry,
        settings: RegistrySettings,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            store,
            strategies: Arc::new(strategies),
            client,
            settings: Arc::new(settings),
            locks: Arc::new(RecordLocks::default()),
            create_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// The full record, credential included. Not for external exposure.
    pub async fn load(&self, id: &str) -> Result<Provider> {
        self.store
            .get_provider(id)
            .await?
            .ok_or_else(|| Error::not_found("Provider", id))
    }

    pub fn context<'a>(&'a self, provider: &'a Provider) -> ProviderContext<'a> {
        ProviderContext {
            client: &self.client,
            provider,
            request_timeout_secs: self.settings.request_timeout.as_secs(),
        }
    }

    pub fn strategy_for(&self, provider: &Provider) -> Arc<dyn ProviderStrategy> {
        self.strategies.resolve(provider)
    }

    /// Ensure every seed exists by name. Existing records keep their
    /// credential unless the seed carries a non-empty one.
    pub async fn bootstrap(&self, seeds: &[ProviderSeed]) -> Result<Vec<ProviderView>> {
        let _create = self.create_lock.lock().await;
        let mut views = Vec::with_capacity(seeds.len());

        for seed in seeds {
            validate_name(&seed.name)?;
            validate_config(&seed.config)?;
            let credential = seed.credential.clone().filter(|c| !c.trim().is_empty());

            let provider = match self.store.find_provider_by_name(&seed.name).await? {
                Some(existing) => {
                    let _guard = self.locks.lock(&existing.id).await;
                    let mut current = self.load(&existing.id).await?;
                    current.config = seed.config.clone();
                    if credential.is_some() {
                        current.credential = credential;
                    }
                    current.updated_at = now();
                    self.store.upsert_provider(&current).await?;
                    debug!(provider = %current.name, "Bootstrap updated provider");
                    current
                }
                None => {
                    let ts = now();
                    let provider = Provider {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: seed.name.clone(),
                        credential,
                        is_active: true,
                        is_connected: false,
                        last_test_result: TestResult::Unset,
                        last_test_message: None,
                        config: seed.config.clone(),
                        created_at: ts,
                        updated_at: ts,
                    };
                    self.store.upsert_provider(&provider).await?;
                    info!(provider = %provider.name, kind = provider.kind().as_str(), "Bootstrap created provider");
                    provider
                }
            };
            views.push(ProviderView::from(&provider));
        }

        Ok(views)
    }

    pub async fn register(&self, new: NewProvider) -> Result<ProviderView> {
        let name = validate_name(&new.name)?;
        validate_config(&new.config)?;

        let _create = self.create_lock.lock().await;
        if self.store.find_provider_by_name(&name).await?.is_some() {
            return Err(Error::duplicate("Provider", name));
        }

        let ts = now();
        let provider = Provider {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            credential: new.credential.filter(|c| !c.trim().is_empty()),
            is_active: new.is_active,
            is_connected: false,
            last_test_result: TestResult::Unset,
            last_test_message: None,
            config: new.config,
            created_at: ts,
            updated_at: ts,
        };
        self.store.upsert_provider(&provider).await?;
        info!(provider = %provider.name, "Registered provider");
        Ok(ProviderView::from(&provider))
    }

    pub async fn update(&self, id: &str, patch: ProviderPatch) -> Result<ProviderView> {
        let new_name = patch.name.into_option().map(|n| validate_name(&n)).transpose()?;
        if let Change::Set(config) = &patch.config {
            validate_config(config)?;
        }

        // Renames go through the creation lock so the uniqueness check holds.
        let _create = match new_name {
            Some(_) => Some(self.create_lock.lock().await),
            None => None,
        };
        let _guard = self.locks.lock(id).await;
        let mut provider = self.load(id).await?;

        if let Some(name) = new_name {
            if name != provider.name {
                if self.store.find_provider_by_name(&name).await?.is_some() {
                    return Err(Error::duplicate("Provider", name));
                }
                provider.name = name;
            }
        }
        if let Change::Set(credential) = patch.credential {
            if !credential.trim().is_empty() {
                provider.credential = Some(credential);
            }
        }
        if let Change::Set(config) = patch.config {
            provider.config = config;
        }
        if let Change::Set(active) = patch.is_active {
            provider.is_active = active;
        }
        provider.updated_at = now();

        self.store.upsert_provider(&provider).await?;
        Ok(ProviderView::from(&provider))
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let guard = self.locks.lock(id).await;
        if !self.store.delete_provider(id).await? {
            return Err(Error::not_found("Provider", id));
        }
        drop(guard);
        self.locks.forget(id);
        info!(provider_id = id, "Removed provider");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<ProviderView> {
        Ok(ProviderView::from(&self.load(id).await?))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<ProviderView> {
        self.store
            .find_provider_by_name(name)
            .await?
            .map(|p| ProviderView::from(&p))
            .ok_or_else(|| Error::not_found("Provider", name))
    }

    pub async fn list(&self) -> Result<Vec<ProviderView>> {
        Ok(self
            .store
            .list_providers()
            .await?
            .iter()
            .map(ProviderView::from)
            .collect())
    }

    pub async fn list_models(&self, provider_id: &str) -> Result<Vec<Model>> {
        self.load(provider_id).await?;
        Ok(self.store.list_models(provider_id).await?)
    }

    /// Test connectivity and persist the outcome on the record.
    ///
    /// Only a missing provider is an error; provider failures are reported
    /// through the returned [`TestOutcome`].
    pub async fn test_provider(&self, id: &str) -> Result<TestOutcome> {
        let provider = self.load(id).await?;
        let result = self.run_test(&provider).await;

        let (success, message, code) = match &result {
            Ok(message) => (true, message.clone(), None),
            Err(e) => (false, e.to_string(), Some(e.code())),
        };
        match &result {
            Ok(_) => info!(provider = %provider.name, "Connection test succeeded"),
            Err(e) => warn!(provider = %provider.name, error = %e, "Connection test failed"),
        }

        {
            let _guard = self.locks.lock(id).await;
            // Re-read so a concurrent credential rotation is not overwritten.
            let mut current = self.load(id).await?;
            current.is_connected = success;
            current.last_test_result = if success {
                TestResult::Success
            } else {
                TestResult::Error
            };
            current.last_test_message = Some(message.clone());
            current.updated_at = now();
            self.store.upsert_provider(&current).await?;
        }

        let refresh = success.then(|| self.spawn_refresh(id));
        Ok(TestOutcome {
            success,
            message,
            code,
            refresh,
        })
    }

    async fn run_test(&self, provider: &Provider) -> std::result::Result<String, ProviderError> {
        if provider.kind() == ProviderKind::Api && provider.credential().is_none() {
            return Err(ProviderError::MissingCredential {
                provider: provider.name.clone(),
            });
        }

        let strategy = self.strategy_for(provider);
        let ctx = self.context(provider);
        match tokio::time::timeout(self.settings.test_timeout, strategy.test(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.name.clone(),
                secs: self.settings.test_timeout.as_secs(),
            }),
        }
    }

    fn spawn_refresh(&self, id: &str) -> RefreshHandle {
        let registry = self.clone();
        let id = id.to_string();
        RefreshHandle(tokio::spawn(async move {
            match registry.refresh_models(&id).await {
                Ok(models) => Ok(models.len()),
                Err(e) => {
                    warn!(provider_id = %id, error = %e, "Model refresh after connection test failed");
                    Err(e)
                }
            }
        }))
    }

    /// Replace the provider's catalog with a fresh listing.
    ///
    /// Fetch failures fall back to the strategy's hardcoded catalog (or
    /// nothing). Required models are always present. Models that survive
    /// the refresh keep their selection.
    pub async fn refresh_models(&self, id: &str) -> Result<Vec<Model>> {
        let provider = self.load(id).await?;
        let strategy = self.strategy_for(&provider);
        let ctx = self.context(&provider);

        let mut specs = match strategy.fetch_models(&ctx).await {
            Ok(specs) => specs,
            Err(e) => match strategy.fallback_models() {
                Some(fallback) => {
                    warn!(provider = %provider.name, error = %e, "Model listing failed, using fallback catalog");
                    fallback
                }
                None => {
                    warn!(provider = %provider.name, error = %e, "Model listing failed, catalog left empty");
                    Vec::new()
                }
            },
        };

        let mut required = strategy.required_models();
        if let Some(extra) = self.settings.required_models.get(&provider.name) {
            required.extend(extra.iter().cloned());
        }
        ensure_required(&mut specs, &required);

        let _guard = self.locks.lock(id).await;
        let selected: HashSet<String> = self
            .store
            .list_models(id)
            .await?
            .into_iter()
            .filter(|m| m.is_selected)
            .map(|m| m.model_id)
            .collect();

        let models: Vec<Model> = specs
            .into_iter()
            .map(|spec| {
                let mut model = Model::from_spec(id, spec);
                model.is_selected = selected.contains(&model.model_id);
                model
            })
            .collect();

        self.store.replace_models(id, &models).await?;
        let stored = self.store.list_models(id).await?;
        info!(provider = %provider.name, models = stored.len(), "Refreshed model catalog");
        Ok(stored)
    }

    /// Mark one model as the provider's selected model.
    pub async fn select_model(&self, provider_id: &str, model_id: &str) -> Result<Model> {
        let _guard = self.locks.lock(provider_id).await;
        self.load(provider_id).await?;

        let mut models = self.store.list_models(provider_id).await?;
        if !models.iter().any(|m| m.model_id == model_id) {
            return Err(Error::not_found("Model", model_id));
        }
        for model in &mut models {
            model.is_selected = model.model_id == model_id;
        }
        self.store.replace_models(provider_id, &models).await?;

        models
            .into_iter()
            .find(|m| m.model_id == model_id)
            .ok_or_else(|| Error::not_found("Model", model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::store::memory::InMemoryStore;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(
            Arc::new(InMemoryStore::new()),
            StrategyRegistry::with_builtins(),
            RegistrySettings::default(),
        )
        .unwrap()
    }

    fn seed(name: &str, credential: Option<&str>) -> ProviderSeed {
        ProviderSeed {
            name: name.to_string(),
            config: ProviderConfig::api("https://api.example.com"),
            credential: credential.map(str::to_string),
        }
    }

    #[test]
    fn test_ensure_required_synthesizes_missing() {
        let mut specs = vec![ModelSpec::new("a")];
        ensure_required(&mut specs, &["a".to_string(), "b".to_string()]);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].model_id, "b");
        assert_eq!(specs[1].metadata["synthesized"], true);
    }

    #[tokio::test]
    async fn test_bootstrap_preserves_credential() {
        let registry = registry();
        registry.bootstrap(&[seed("openai", Some("sk-first-key-1234"))]).await.unwrap();
        registry.bootstrap(&[seed("openai", None)]).await.unwrap();
        registry.bootstrap(&[seed("openai", Some("  "))]).await.unwrap();

        let all = registry.list().await.unwrap();
        assert_eq!(all.len(), 1);
        let provider = registry.load(&all[0].id).await.unwrap();
        assert_eq!(provider.credential(), Some("sk-first-key-1234"));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_config() {
        let registry = registry();
        let new = NewProvider {
            name: "custom".to_string(),
            config: ProviderConfig::local("http://localhost:1234/v1"),
            credential: None,
            is_active: true,
        };
        registry.register(new.clone()).await.unwrap();
        assert!(matches!(
            registry.register(new).await.unwrap_err(),
            Error::Duplicate { .. }
        ));

        let bad = NewProvider {
            name: "bad".to_string(),
            config: ProviderConfig::local("not a url"),
            credential: None,
            is_active: true,
        };
        assert!(matches!(
            registry.register(bad).await.unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_update_patch_presence() {
        let registry = registry();
        let views = registry
            .bootstrap(&[seed("openai", Some("sk-original-key-0000"))])
            .await
            .unwrap();
        let id = views[0].id.clone();

        let patch = ProviderPatch {
            is_active: Change::Set(false),
            credential: Change::Set(String::new()),
            ..Default::default()
        };
        let view = registry.update(&id, patch).await.unwrap();
        assert!(!view.is_active);
        assert_eq!(view.name, "openai");
        let provider = registry.load(&id).await.unwrap();
        assert_eq!(provider.credential(), Some("sk-original-key-0000"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_stored_not_thrown() {
        let registry = registry();
        let views = registry.bootstrap(&[seed("openai", None)]).await.unwrap();
        let outcome = registry.test_provider(&views[0].id).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some("missing_credential"));
        assert!(outcome.refresh.is_none());

        let view = registry.get(&views[0].id).await.unwrap();
        assert!(!view.is_connected);
        assert_eq!(view.last_test_result, TestResult::Error);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.test_provider("nope").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
