//! Semantic retrieval across one or more collections.
//!
//! The query is embedded with the target collections' embedding model,
//! every embedded chunk in those collections is loaded, and the candidates
//! are ranked by cosine similarity via [`docrag_core::search::rank_chunks`].

use std::sync::Arc;
use tracing::debug;

use docrag_core::models::Collection;
use docrag_core::search::{rank_chunks, RankError, SearchHit};
use docrag_core::store::Store;

use crate::error::{Error, Result};
use crate::gateway::Embedder;

#[derive(Clone)]
pub struct RetrievalEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    default_limit: usize,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, default_limit: usize) -> Self {
        Self {
            store,
            embedder,
            default_limit,
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Return the `limit` chunks most similar to `query` across
    /// `collection_ids`, best first.
    ///
    /// An empty target set returns no hits without embedding anything.
    /// All targets must share one embedding provider and model.
    pub async fn search(
        &self,
        query: &str,
        collection_ids: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        if collection_ids.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(Error::Validation("limit must be at least 1".to_string()));
        }
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }

        let collections = self.load_targets(collection_ids).await?;
        let space = &collections[0];
        let query_vec = self
            .embedder
            .embed(query, &space.embedding_provider_id, &space.embedding_model_id)
            .await?;

        let candidates = self.store.embedded_chunks(collection_ids).await?;
        let candidate_count = candidates.len();
        let hits = rank_chunks(&query_vec, candidates, limit).map_err(|e| match e {
            RankError::ZeroQuery => Error::Validation("query embedding is all-zero".to_string()),
            RankError::DimensionMismatch { .. } => Error::Validation(e.to_string()),
        })?;

        debug!(
            collections = collection_ids.len(),
            candidates = candidate_count,
            hits = hits.len(),
            "Ranked chunks"
        );
        Ok(hits)
    }

    async fn load_targets(&self, collection_ids: &[String]) -> Result<Vec<Collection>> {
        let mut collections = Vec::with_capacity(collection_ids.len());
        for id in collection_ids {
            let collection = self
                .store
                .get_collection(id)
                .await?
                .ok_or_else(|| Error::not_found("Collection", id.as_str()))?;
            collections.push(collection);
        }

        let first = &collections[0];
        if let Some(other) = collections.iter().find(|c| !c.same_embedding_space(first)) {
            return Err(Error::Validation(format!(
                "collections '{}' and '{}' use different embedding models ({} vs {})",
                first.name, other.name, first.embedding_model_id, other.embedding_model_id
            )));
        }
        Ok(collections)
    }
}
