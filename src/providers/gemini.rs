//! Google Gemini strategy: `x-goog-api-key` against the `v1beta` API.

use async_trait::async_trait;
use serde::Deserialize;

use docrag_core::models::{ModelSpec, ProviderConfig, ProviderKind};

use super::{mark_default, parse_vector, ProviderContext, ProviderStrategy};
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct Gemini;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    /// `models/<id>`
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
    #[serde(default)]
    input_token_limit: Option<u64>,
}

impl Gemini {
    async fn list(&self, ctx: &ProviderContext<'_>) -> Result<ModelList, ProviderError> {
        let key = ctx.credential()?;
        let request = ctx
            .client
            .get(ctx.endpoint("/v1beta/models"))
            .header("x-goog-api-key", key);
        ctx.send_json(request).await
    }
}

#[async_trait]
impl ProviderStrategy for Gemini {
    fn name(&self) -> &str {
        "gemini"
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
            "Connected to Gemini ({} models visible)",
            list.models.len()
        ))
    }

    async fn fetch_models(&self, ctx: &ProviderContext<'_>) -> Result<Vec<ModelSpec>, ProviderError> {
        let list = self.list(ctx).await?;
        let mut models: Vec<ModelSpec> = list
            .models
            .into_iter()
            .filter(|m| {
                m.name.contains("gemini")
                    && m.supported_generation_methods
                        .iter()
                        .any(|g| g == "generateContent")
            })
            .map(|m| {
                let id = m.name.trim_start_matches("models/").to_string();
                let mut spec = ModelSpec::new(id);
                if let Some(name) = m.display_name {
                    spec = spec.named(name);
                }
                if let Some(desc) = m.description {
                    spec = spec.described(desc);
                }
                spec.metadata = serde_json::json!({ "input_token_limit": m.input_token_limit });
                spec
            })
            .collect();
        mark_default(&mut models, Some(DEFAULT_MODEL));
        Ok(models)
    }

    fn fallback_models(&self) -> Option<Vec<ModelSpec>> {
        Some(vec![
            ModelSpec::new("gemini-1.5-flash")
                .named("Gemini 1.5 Flash")
                .default_model(),
            ModelSpec::new("gemini-1.5-pro").named("Gemini 1.5 Pro"),
            ModelSpec::new("gemini-2.0-flash").named("Gemini 2.0 Flash"),
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
        let key = ctx.credential()?;
        let model = model.trim_start_matches("models/");
        let body = serde_json::json!({
            "model": format!("models/{}", model),
            "content": { "parts": [{ "text": text }] }
        });
        let request = ctx
            .client
            .post(ctx.endpoint(&format!("/v1beta/models/{}:embedContent", model)))
            .header("x-goog-api-key", key)
            .json(&body);
        let json: serde_json::Value = ctx.send_json(request).await?;
        parse_vector(
            ctx.name(),
            json.get("embedding").and_then(|e| e.get("values")),
        )
    }
}
