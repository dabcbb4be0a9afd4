//! Fallback strategies for provider names with no dedicated adapter.

use async_trait::async_trait;
use serde::Deserialize;

use docrag_core::models::{ModelSpec, ProviderConfig, ProviderKind};

use super::openai::parse_embeddings_response;
use super::{ProviderContext, ProviderStrategy};
use crate::error::ProviderError;

pub const GENERIC_API: &str = "generic-api";
pub const GENERIC_LOCAL: &str = "generic-local";

/// Remote API with an unknown protocol: only credential presence can be
/// checked, and there is no catalog.
pub struct GenericApi;

#[async_trait]
impl ProviderStrategy for GenericApi {
    fn name(&self) -> &str {
        GENERIC_API
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Api
    }

    fn default_config(&self) -> ProviderConfig {
        ProviderConfig::api("https://localhost")
    }

    async fn test(&self, ctx: &ProviderContext<'_>) -> Result<String, ProviderError> {
        ctx.credential()?;
        Ok(format!("API key configured for {}", ctx.name()))
    }

    async fn fetch_models(&self, _ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Local server assumed to speak the OpenAI-compatible `/models` and
/// `/embeddings` routes (LM Studio, llama.cpp, vLLM).
pub struct GenericLocal;

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[async_trait]
impl ProviderStrategy for GenericLocal {
    fn name(&self) -> &str {
        GENERIC_LOCAL
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn default_config(&self) -> ProviderConfig {
        ProviderConfig::local("http://localhost:8080/v1")
    }

    async fn test(&self, ctx: &ProviderContext<'_>) -> Result<String, ProviderError> {
        ctx.send(ctx.client.get(ctx.endpoint("/models"))).await?;
        Ok(format!("{} is reachable", ctx.provider.config.base_url()))
    }

    async fn fetch_models(&self, ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError> {
        let list: ModelList = ctx.send_json(ctx.client.get(ctx.endpoint("/models"))).await?;
        Ok(list.data.into_iter().map(|m| ModelSpec::new(m.id)).collect())
    }

    async fn embed(
        &self,
        ctx: &ProviderContext<'_>,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({ "model": model, "input": text });
        let json: serde_json::Value = ctx
            .send_json(ctx.client.post(ctx.endpoint("/embeddings")).json(&body))
            .await?;
        parse_embeddings_response(ctx.name(), &json)
    }
}
