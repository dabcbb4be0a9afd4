//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Every table sits behind its own `std::sync::RwLock`. Insertion order is
//! kept in `Vec`s so listing and retrieval order match what a SQL backend
//! returns for `ORDER BY` on insertion.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{Chunk, Collection, Document, Model, Provider};

use super::Store;

/// In-memory store. Cheap to construct; share it as `Arc<InMemoryStore>`.
#[derive(Default)]
pub struct InMemoryStore {
    providers: RwLock<HashMap<String, Provider>>,
    models: RwLock<Vec<Model>>,
    collections: RwLock<Vec<Collection>>,
    documents: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    fn document_ids_in(&self, collection_ids: &[String]) -> Result<Vec<String>> {
        let docs = read(&self.documents)?;
        Ok(docs
            .iter()
            .filter(|d| collection_ids.contains(&d.collection_id))
            .map(|d| d.id.clone())
            .collect())
    }

    /// Chunks of `doc_ids` (in that order) matching `keep`, each document's
    /// chunks sorted by index.
    fn chunks_for(&self, doc_ids: &[String], keep: impl Fn(&Chunk) -> bool) -> Result<Vec<Chunk>> {
        let chunks = read(&self.chunks)?;
        let mut out = Vec::new();
        for doc_id in doc_ids {
            let mut doc_chunks: Vec<Chunk> = chunks
                .iter()
                .filter(|c| &c.document_id == doc_id && keep(c))
                .cloned()
                .collect();
            doc_chunks.sort_by_key(|c| c.chunk_index);
            out.extend(doc_chunks);
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_provider(&self, provider: &Provider) -> Result<()> {
        let mut providers = write(&self.providers)?;
        if providers
            .values()
            .any(|p| p.name == provider.name && p.id != provider.id)
        {
            bail!("provider name '{}' is already taken", provider.name);
        }
        providers.insert(provider.id.clone(), provider.clone());
        Ok(())
    }

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>> {
        Ok(read(&self.providers)?.get(id).cloned())
    }

    async fn find_provider_by_name(&self, name: &str) -> Result<Option<Provider>> {
        Ok(read(&self.providers)?
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_providers(&self) -> Result<Vec<Provider>> {
        let mut all: Vec<Provider> = read(&self.providers)?.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete_provider(&self, id: &str) -> Result<bool> {
        let removed = write(&self.providers)?.remove(id).is_some();
        if removed {
            write(&self.models)?.retain(|m| m.provider_id != id);
        }
        Ok(removed)
    }

    async fn replace_models(&self, provider_id: &str, models: &[Model]) -> Result<()> {
        if models.iter().any(|m| m.provider_id != provider_id) {
            bail!("replace_models: model does not belong to provider {}", provider_id);
        }
        // One write guard for the whole swap keeps readers from seeing a mix.
        let mut stored = write(&self.models)?;
        stored.retain(|m| m.provider_id != provider_id);
        for model in models {
            match stored
                .iter_mut()
                .find(|m| m.provider_id == provider_id && m.model_id == model.model_id)
            {
                Some(existing) => *existing = model.clone(),
                None => stored.push(model.clone()),
            }
        }
        Ok(())
    }

    async fn list_models(&self, provider_id: &str) -> Result<Vec<Model>> {
        Ok(read(&self.models)?
            .iter()
            .filter(|m| m.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        let mut collections = write(&self.collections)?;
        if collections.iter().any(|c| c.name == collection.name) {
            bail!("collection name '{}' is already taken", collection.name);
        }
        collections.push(collection.clone());
        Ok(())
    }

    async fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        Ok(read(&self.collections)?.iter().find(|c| c.id == id).cloned())
    }

    async fn find_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
        Ok(read(&self.collections)?
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(read(&self.collections)?.clone())
    }

    async fn delete_collection(&self, id: &str) -> Result<bool> {
        let mut collections = write(&self.collections)?;
        let before = collections.len();
        collections.retain(|c| c.id != id);
        if collections.len() == before {
            return Ok(false);
        }
        let doc_ids = {
            let mut docs = write(&self.documents)?;
            let ids: Vec<String> = docs
                .iter()
                .filter(|d| d.collection_id == id)
                .map(|d| d.id.clone())
                .collect();
            docs.retain(|d| d.collection_id != id);
            ids
        };
        write(&self.chunks)?.retain(|c| !doc_ids.contains(&c.document_id));
        Ok(true)
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut docs = write(&self.documents)?;
        if docs.iter().any(|d| d.id == document.id) {
            bail!("document {} already exists", document.id);
        }
        docs.push(document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(read(&self.documents)?.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>> {
        Ok(read(&self.documents)?
            .iter()
            .filter(|d| d.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut docs = write(&self.documents)?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Ok(false);
        }
        write(&self.chunks)?.retain(|c| c.document_id != id);
        Ok(true)
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        if !read(&self.documents)?.iter().any(|d| d.id == chunk.document_id) {
            bail!("chunk {} references missing document {}", chunk.id, chunk.document_id);
        }
        let mut chunks = write(&self.chunks)?;
        match chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk.clone(),
            None => chunks.push(chunk.clone()),
        }
        Ok(())
    }

    async fn set_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        let mut chunks = write(&self.chunks)?;
        let chunk = chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .ok_or_else(|| anyhow!("chunk {} not found", chunk_id))?;
        chunk.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.chunks_for(&[document_id.to_string()], |_| true)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let mut chunks = write(&self.chunks)?;
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn chunks_missing_embedding(&self, collection_id: &str) -> Result<Vec<Chunk>> {
        let doc_ids = self.document_ids_in(&[collection_id.to_string()])?;
        self.chunks_for(&doc_ids, |c| c.embedding.is_none())
    }

    async fn embedded_chunks(&self, collection_ids: &[String]) -> Result<Vec<Chunk>> {
        let doc_ids = self.document_ids_in(collection_ids)?;
        self.chunks_for(&doc_ids, |c| c.embedding.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileType, ModelSpec, ProviderConfig, TestResult};

    fn provider(id: &str, name: &str) -> Provider {
        Provider {
            id: id.to_string(),
            name: name.to_string(),
            credential: None,
            is_active: true,
            is_connected: false,
            last_test_result: TestResult::Unset,
            last_test_message: None,
            config: ProviderConfig::local("http://localhost:11434"),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn document(id: &str, collection_id: &str) -> Document {
        Document {
            id: id.to_string(),
            collection_id: collection_id.to_string(),
            filename: format!("{}.pdf", id),
            filepath: format!("/tmp/{}.pdf", id),
            file_type: FileType::Pdf,
            file_size_bytes: 10,
            raw_content: "text".to_string(),
            metadata: serde_json::json!({}),
            created_at: 0,
        }
    }

    fn chunk(id: &str, doc: &str, index: i64, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            chunk_index: index,
            content: id.to_string(),
            embedding,
            start_offset: index as usize,
            end_offset: index as usize + 1,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_provider_name_is_unique() {
        let store = InMemoryStore::new();
        store.upsert_provider(&provider("p1", "ollama")).await.unwrap();
        assert!(store.upsert_provider(&provider("p2", "ollama")).await.is_err());
        // same id, same name is an update
        store.upsert_provider(&provider("p1", "ollama")).await.unwrap();
        assert_eq!(store.list_providers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_models_has_no_duplicates() {
        let store = InMemoryStore::new();
        let a = Model::from_spec("p1", ModelSpec::new("m1"));
        let b = Model::from_spec("p1", ModelSpec::new("m1"));
        let c = Model::from_spec("p1", ModelSpec::new("m2"));
        store.replace_models("p1", &[a, b, c.clone()]).await.unwrap();
        store.replace_models("p1", &[c]).await.unwrap();
        let models = store.list_models("p1").await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, "m2");
    }

    #[tokio::test]
    async fn test_embedded_chunks_natural_order() {
        let store = InMemoryStore::new();
        store.insert_document(&document("d1", "c1")).await.unwrap();
        store.insert_document(&document("d2", "c2")).await.unwrap();
        store.insert_document(&document("d3", "c1")).await.unwrap();
        store.insert_chunk(&chunk("d1-1", "d1", 1, Some(vec![1.0]))).await.unwrap();
        store.insert_chunk(&chunk("d1-0", "d1", 0, Some(vec![1.0]))).await.unwrap();
        store.insert_chunk(&chunk("d2-0", "d2", 0, Some(vec![1.0]))).await.unwrap();
        store.insert_chunk(&chunk("d3-0", "d3", 0, None)).await.unwrap();
        store.insert_chunk(&chunk("d3-1", "d3", 1, Some(vec![1.0]))).await.unwrap();

        let ids: Vec<String> = store
            .embedded_chunks(&["c1".to_string()])
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["d1-0", "d1-1", "d3-1"]);

        let missing = store.chunks_missing_embedding("c1").await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "d3-0");
    }

    #[tokio::test]
    async fn test_delete_document_cascades() {
        let store = InMemoryStore::new();
        store.insert_document(&document("d1", "c1")).await.unwrap();
        store.insert_chunk(&chunk("k1", "d1", 0, None)).await.unwrap();
        assert!(store.delete_document("d1").await.unwrap());
        assert!(store.list_chunks("d1").await.unwrap().is_empty());
        assert!(!store.delete_document("d1").await.unwrap());
    }

    #[tokio::test]
    async fn test_chunk_requires_document() {
        let store = InMemoryStore::new();
        assert!(store.insert_chunk(&chunk("k1", "ghost", 0, None)).await.is_err());
    }
}
