//! Provider strategies.
//!
//! Each provider name maps to a [`ProviderStrategy`] that knows how to
//! test connectivity, list models, and (where supported) embed text for
//! that provider's wire protocol. The [`StrategyRegistry`] resolves a
//! stored [`Provider`] to its strategy; names without a registered
//! strategy fall back to a generic strategy for their [`ProviderKind`].
//!
//! # Built-in strategies
//!
//! | Name | Kind | Test endpoint | Embeddings |
//! |------|------|---------------|------------|
//! | `openai` | api | `GET /models` | `POST /embeddings` |
//! | `anthropic` | api | `GET /v1/models` | unsupported |
//! | `ollama` | local | `GET /api/tags` | `POST /api/embed` |
//! | `gemini` | api | `GET /v1beta/models` | `POST /v1beta/models/{m}:embedContent` |
//!
//! Adding a provider means implementing [`ProviderStrategy`] and calling
//! [`StrategyRegistry::register`].

pub mod anthropic;
pub mod generic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use docrag_core::models::{ModelSpec, Provider, ProviderConfig, ProviderKind};

use crate::error::ProviderError;

/// Longest provider error body carried into a message.
const MAX_ERROR_BODY: usize = 300;

/// Everything a strategy needs to talk to one provider.
pub struct ProviderContext<'a> {
    pub client: &'a reqwest::Client,
    pub provider: &'a Provider,
    /// Per-request timeout applied by `client`, for error messages.
    pub request_timeout_secs: u64,
}

impl<'a> ProviderContext<'a> {
    pub fn name(&self) -> &str {
        &self.provider.name
    }

    pub fn endpoint(&self, path: &str) -> String {
        self.provider.config.endpoint(path)
    }

    /// The provider's credential, or `MissingCredential`.
    pub fn credential(&self) -> Result<&str, ProviderError> {
        self.provider
            .credential()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: self.provider.name.clone(),
            })
    }

    /// Send a request, mapping transport failures and non-2xx statuses
    /// to [`ProviderError`].
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(self.name(), &e, self.request_timeout_secs))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(
            self.name(),
            status.as_u16(),
            extract_error_message(&body),
        ))
    }

    /// Send a request and decode a successful JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: self.name().to_string(),
                message: e.to_string(),
            })
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Understands `{"error": {"message": ".."}}` (OpenAI, Anthropic, Gemini)
/// and `{"error": ".."}` (Ollama). Anything else is returned as raw text,
/// truncated.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        match json.get("error") {
            Some(serde_json::Value::String(msg)) => return msg.clone(),
            Some(err) => {
                if let Some(msg) = err.get("message").and_then(|m| m.as_str()) {
                    return msg.to_string();
                }
            }
            None => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    let mut text: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
    if trimmed.chars().count() > MAX_ERROR_BODY {
        text.push_str("...");
    }
    text
}

/// Protocol adapter for one provider.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Provider name this strategy serves (e.g. `"openai"`).
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Configuration used when bootstrapping this provider.
    fn default_config(&self) -> ProviderConfig;

    /// Check connectivity and credentials. Returns a success message.
    async fn test(&self, ctx: &ProviderContext<'_>) -> Result<String, ProviderError>;

    /// List the provider's relevant models from its native endpoint.
    async fn fetch_models(&self, ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError>;

    /// Catalog to use when [`fetch_models`](Self::fetch_models) fails.
    /// `None` means the catalog is left empty.
    fn fallback_models(&self) -> Option<Vec<ModelSpec>> {
        None
    }

    /// Model ids that must always appear in this provider's catalog.
    fn required_models(&self) -> Vec<String> {
        Vec::new()
    }

    /// Convert `text` into an embedding vector with `model`.
    async fn embed(
        &self,
        ctx: &ProviderContext<'_>,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>, ProviderError> {
        let _ = (model, text);
        Err(ProviderError::Unsupported {
            provider: ctx.name().to_string(),
            operation: "embeddings",
        })
    }
}

/// Map from provider name to strategy.
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn ProviderStrategy>>,
    /// Registration order, used for bootstrap.
    order: Vec<String>,
    generic_api: Arc<dyn ProviderStrategy>,
    generic_local: Arc<dyn ProviderStrategy>,
}

impl StrategyRegistry {
    /// A registry with only the generic fallbacks.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            order: Vec::new(),
            generic_api: Arc::new(generic::GenericApi),
            generic_local: Arc::new(generic::GenericLocal),
        }
    }

    /// The four well-known providers, in bootstrap order.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(openai::OpenAi));
        registry.register(Arc::new(anthropic::Anthropic));
        registry.register(Arc::new(ollama::Ollama));
        registry.register(Arc::new(gemini::Gemini));
        registry
    }

    /// Register (or replace) the strategy for `strategy.name()`.
    pub fn register(&mut self, strategy: Arc<dyn ProviderStrategy>) {
        let name = strategy.name().to_string();
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.strategies.insert(name, strategy);
    }

    /// Strategy for a stored provider: by name, else generic by kind.
    pub fn resolve(&self, provider: &Provider) -> Arc<dyn ProviderStrategy> {
        if let Some(strategy) = self.strategies.get(&provider.name) {
            return strategy.clone();
        }
        match provider.kind() {
            ProviderKind::Api => self.generic_api.clone(),
            ProviderKind::Local => self.generic_local.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Registered strategies in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProviderStrategy>> {
        self.order.iter().filter_map(|name| self.strategies.get(name))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Whether `id` contains any of `families`.
pub(crate) fn matches_family(id: &str, families: &[&str]) -> bool {
    families.iter().any(|f| id.contains(f))
}

/// Mark `default_id` as the default if present, else the first entry.
pub(crate) fn mark_default(models: &mut [ModelSpec], default_id: Option<&str>) {
    let index = default_id
        .and_then(|id| models.iter().position(|m| m.model_id == id))
        .or(if models.is_empty() { None } else { Some(0) });
    if let Some(i) = index {
        models[i].is_default = true;
    }
}

/// Decode a JSON array of floats into an embedding.
pub(crate) fn parse_vector(
    provider: &str,
    value: Option<&serde_json::Value>,
) -> Result<Vec<f32>, ProviderError> {
    let array = value
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: "missing embedding array".to_string(),
        })?;
    array
        .iter()
        .map(|v| {
            let value = v.as_f64().ok_or_else(|| ProviderError::InvalidResponse {
                provider: provider.to_string(),
                message: "embedding contains a non-numeric value".to_string(),
            })?;
            // Values outside the f32 range would become infinite.
            let value = value as f32;
            if !value.is_finite() {
                return Err(ProviderError::InvalidResponse {
                    provider: provider.to_string(),
                    message: "embedding contains a non-finite value".to_string(),
                });
            }
            Ok(value)
        })
        .collect()
}
