//! Embedding gateway: text to vector through a registered provider.
//!
//! The [`Embedder`] trait is the seam the ingestion pipeline and the
//! retrieval engine depend on; [`EmbeddingGateway`] is its production
//! implementation, resolving the provider through the
//! [`ProviderRegistry`] and delegating the wire call to the provider's
//! strategy.

use async_trait::async_trait;
use tracing::debug;

use docrag_core::embedding::{cosine_similarity, SimilarityError};

use crate::error::{Error, ProviderError, Result};
use crate::registry::ProviderRegistry;

/// Converts text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` with `model_id` on the provider `provider_id`.
    async fn embed(&self, text: &str, provider_id: &str, model_id: &str) -> Result<Vec<f32>>;
}

pub struct EmbeddingGateway {
    registry: ProviderRegistry,
}

impl EmbeddingGateway {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Cosine similarity of two vectors. Errors on a length mismatch or an
    /// all-zero vector.
    pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32> {
        cosine_similarity(a, b).map_err(|e| match e {
            SimilarityError::LengthMismatch { left, right } => Error::Validation(format!(
                "cannot compare vectors of different lengths ({} vs {})",
                left, right
            )),
            SimilarityError::ZeroVector => Error::Validation(e.to_string()),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingGateway {
    async fn embed(&self, text: &str, provider_id: &str, model_id: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("cannot embed empty text".to_string()));
        }
        if model_id.trim().is_empty() {
            return Err(Error::Validation("embedding model id is empty".to_string()));
        }

        let provider = self.registry.load(provider_id).await?;
        if !provider.is_active {
            return Err(Error::Validation(format!(
                "provider '{}' is inactive",
                provider.name
            )));
        }

        let strategy = self.registry.strategy_for(&provider);
        let ctx = self.registry.context(&provider);
        let vector = strategy.embed(&ctx, model_id, text).await?;
        if vector.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: provider.name.clone(),
                message: "empty embedding".to_string(),
            }
            .into());
        }

        debug!(provider = %provider.name, model = model_id, dims = vector.len(), "Embedded text");
        Ok(vector)
    }
}
