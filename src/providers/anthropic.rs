//! Anthropic strategy: `x-api-key` plus `anthropic-version` headers.
//!
//! Anthropic has no embeddings endpoint, so collections cannot embed
//! through it.

use async_trait::async_trait;
use serde::Deserialize;

use docrag_core::models::{ApiConfig, ModelSpec, ProviderConfig, ProviderKind};

use super::{mark_default, matches_family, ProviderContext, ProviderStrategy};
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

pub struct Anthropic;

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl Anthropic {
    async fn list(&self, ctx: &ProviderContext<'_>) -> Result<ModelList, ProviderError> {
        let key = ctx.credential()?;
        let version = match &ctx.provider.config {
            ProviderConfig::Api(ApiConfig {
                api_version: Some(v),
                ..
            }) => v.as_str(),
            _ => DEFAULT_API_VERSION,
        };
        let request = ctx
            .client
            .get(ctx.endpoint("/v1/models"))
            .header("x-api-key", key)
            .header("anthropic-version", version);
        ctx.send_json(request).await
    }
}

#[async_trait]
impl ProviderStrategy for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Api
    }

    fn default_config(&self) -> ProviderConfig {
        ProviderConfig::Api(ApiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            organization: None,
            options: serde_json::Map::new(),
        })
    }

    async fn test(&self, ctx: &ProviderContext<'_>) -> Result<String, ProviderError> {
        let list = self.list(ctx).await?;
        Ok(format!(
            "Connected to Anthropic ({} models visible)",
            list.data.len()
        ))
    }

    async fn fetch_models(&self, ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError> {
        let list = self.list(ctx).await?;
        let mut models: Vec<ModelSpec> = list
            .data
            .into_iter()
            .filter(|m| matches_family(&m.id, &["claude"]))
            .map(|m| {
                let mut spec = ModelSpec::new(&m.id);
                if let Some(name) = m.display_name {
                    spec = spec.named(name);
                }
                if let Some(created) = m.created_at {
                    spec.metadata = serde_json::json!({ "created_at": created });
                }
                spec
            })
            .collect();
        mark_default(&mut models, Some(DEFAULT_MODEL));
        Ok(models)
    }

    fn fallback_models(&self) -> Option<Vec<ModelSpec>> {
        Some(vec![
            ModelSpec::new("claude-3-5-sonnet-latest")
                .named("Claude 3.5 Sonnet")
                .default_model(),
            ModelSpec::new("claude-3-5-haiku-latest").named("Claude 3.5 Haiku"),
            ModelSpec::new("claude-3-opus-latest").named("Claude 3 Opus"),
        ])
    }

    fn required_models(&self) -> Vec<String> {
        vec![DEFAULT_MODEL.to_string()]
    }
}
