//! Ollama strategy: a local server with no credential.
//!
//! Connectivity is `GET /api/tags` succeeding; the same listing is the
//! catalog. There is no fallback catalog: a server that cannot be listed
//! has no known models.

use async_trait::async_trait;
use serde::Deserialize;

use docrag_core::models::{LocalConfig, ModelSpec, ProviderConfig, ProviderKind};

use super::{mark_default, parse_vector, ProviderContext, ProviderStrategy};
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct Ollama;

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl Ollama {
    async fn tags(&self, ctx: &ProviderContext<'_>) -> Result<TagList, ProviderError> {
        ctx.send_json(ctx.client.get(ctx.endpoint("/api/tags"))).await
    }
}

#[async_trait]
impl ProviderStrategy for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn default_config(&self) -> ProviderConfig {
        ProviderConfig::local(DEFAULT_BASE_URL)
    }

    async fn test(&self, ctx: &ProviderContext<'_>) -> Result<String, ProviderError> {
        ctx.send(ctx.client.get(ctx.endpoint("/api/tags"))).await?;
        Ok(format!("Ollama is running at {}", ctx.provider.config.base_url()))
    }

    async fn fetch_models(&self, ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError> {
        let tags = self.tags(ctx).await?;
        let mut models: Vec<ModelSpec> = tags
            .models
            .into_iter()
            .map(|tag| {
                let mut spec = ModelSpec::new(tag.name);
                spec.metadata = serde_json::json!({
                    "size": tag.size,
                    "details": tag.details,
                });
                spec
            })
            .collect();
        mark_default(&mut models, None);
        Ok(models)
    }

    async fn embed(
        &self,
        ctx: &ProviderContext<'_>,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>, ProviderError> {
        let mut body = serde_json::json!({ "model": model, "input": text });
        if let ProviderConfig::Local(LocalConfig {
            keep_alive: Some(keep_alive),
            ..
        }) = &ctx.provider.config
        {
            body["keep_alive"] = serde_json::Value::String(keep_alive.clone());
        }

        let json: serde_json::Value = ctx
            .send_json(ctx.client.post(ctx.endpoint("/api/embed")).json(&body))
            .await?;
        let first = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first());
        parse_vector(ctx.name(), first)
    }
}
