//! OpenAI strategy: Bearer auth against `https://api.openai.com/v1`.

use async_trait::async_trait;
use serde::Deserialize;

use docrag_core::models::{ModelSpec, ProviderConfig, ProviderKind};

use super::{mark_default, matches_family, parse_vector, ProviderContext, ProviderStrategy};
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const CHAT_FAMILIES: &[&str] = &["gpt-4", "gpt-3.5", "gpt-5", "o1", "o3", "o4"];

pub struct OpenAi;

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

impl OpenAi {
    fn authorized(
        &self,
        ctx: &ProviderContext<'_>,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        let key = ctx.credential()?;
        let mut request = request.bearer_auth(key);
        if let ProviderConfig::Api(api) = &ctx.provider.config {
            if let Some(org) = &api.organization {
                request = request.header("OpenAI-Organization", org);
            }
        }
        Ok(request)
    }

    async fn list(&self, ctx: &ProviderContext<'_>) -> Result<ModelList, ProviderError> {
        let request = self.authorized(ctx, ctx.client.get(ctx.endpoint("/models")))?;
        ctx.send_json(request).await
    }
}

#[async_trait]
impl ProviderStrategy for OpenAi {
    fn name(&self) -> &str {
        "openai"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Api
    }

    fn default_config(&self) -> ProviderConfig {
        ProviderConfig::api(DEFAULT_BASE_URL)
    }

    async fn test(&self, ctx: &ProviderContext<'_>) -> Result<String, ProviderError> {
        let list = self.list(ctx).await?;
        Ok(format!(
            "Connected to OpenAI ({} models visible)",
            list.data.len()
        ))
    }

    async fn fetch_models(&self, ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError> {
        let list = self.list(ctx).await?;
        let mut ids: Vec<ModelEntry> = list
            .data
            .into_iter()
            .filter(|m| matches_family(&m.id, CHAT_FAMILIES))
            .collect();
        ids.sort_by(|a, b| a.id.cmp(&b.id));

        let mut models: Vec<ModelSpec> = ids
            .into_iter()
            .map(|m| {
                let mut spec = ModelSpec::new(m.id);
                if let Some(owner) = m.owned_by {
                    spec.metadata = serde_json::json!({ "owned_by": owner });
                }
                spec
            })
            .collect();
        mark_default(&mut models, Some(DEFAULT_MODEL));
        Ok(models)
    }

    fn fallback_models(&self) -> Option<Vec<ModelSpec>> {
        Some(vec![
            ModelSpec::new("gpt-4o")
                .named("GPT-4o")
                .described("Flagship multimodal model"),
            ModelSpec::new("gpt-4o-mini")
                .named("GPT-4o mini")
                .described("Fast, inexpensive model for focused tasks")
                .default_model(),
            ModelSpec::new("gpt-4-turbo").named("GPT-4 Turbo"),
            ModelSpec::new("gpt-3.5-turbo").named("GPT-3.5 Turbo"),
        ])
    }

    fn required_models(&self) -> Vec<String> {
        vec![DEFAULT_MODEL.to_string()]
    }

    async fn embed(
        &self,
        ctx: &ProviderContext<'_>,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({ "model": model, "input": text });
        let request = self.authorized(ctx, ctx.client.post(ctx.endpoint("/embeddings")).json(&body))?;
        let json: serde_json::Value = ctx.send_json(request).await?;
        parse_embeddings_response(ctx.name(), &json)
    }
}

/// First vector of an OpenAI-style `{"data": [{"embedding": [..]}]}` body.
pub(crate) fn parse_embeddings_response(
    provider: &str,
    json: &serde_json::Value,
) -> Result<Vec<f32>, ProviderError> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first());
    parse_vector(provider, first.and_then(|item| item.get("embedding")))
}
