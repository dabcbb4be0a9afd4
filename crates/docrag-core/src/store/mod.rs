//! Storage abstraction for docrag.
//!
//! The [`Store`] trait defines every persistence operation the registry,
//! ingestion pipeline, and retrieval engine need, so backends are
//! pluggable (SQLite in the application package, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! are shared as `Arc<dyn Store>`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Collection, Document, Model, Provider};

/// Abstract storage backend.
///
/// Each method is a single logical operation: an implementation must
/// never expose a half-applied write to concurrent readers.
///
/// # Operations
///
/// | Group | Methods |
/// |-------|---------|
/// | Providers | [`upsert_provider`](Store::upsert_provider), [`get_provider`](Store::get_provider), [`find_provider_by_name`](Store::find_provider_by_name), [`list_providers`](Store::list_providers), [`delete_provider`](Store::delete_provider) |
/// | Models | [`replace_models`](Store::replace_models), [`list_models`](Store::list_models) |
/// | Collections | [`insert_collection`](Store::insert_collection), [`get_collection`](Store::get_collection), [`find_collection_by_name`](Store::find_collection_by_name), [`list_collections`](Store::list_collections), [`delete_collection`](Store::delete_collection) |
/// | Documents | [`insert_document`](Store::insert_document), [`get_document`](Store::get_document), [`list_documents`](Store::list_documents), [`delete_document`](Store::delete_document) |
/// | Chunks | [`insert_chunk`](Store::insert_chunk), [`set_chunk_embedding`](Store::set_chunk_embedding), [`list_chunks`](Store::list_chunks), [`delete_chunks`](Store::delete_chunks), [`chunks_missing_embedding`](Store::chunks_missing_embedding), [`embedded_chunks`](Store::embedded_chunks) |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a provider, keyed on `id`. Fails if another
    /// provider already uses the same `name`.
    async fn upsert_provider(&self, provider: &Provider) -> Result<()>;

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>>;

    async fn find_provider_by_name(&self, name: &str) -> Result<Option<Provider>>;

    /// All providers, ordered by name.
    async fn list_providers(&self) -> Result<Vec<Provider>>;

    /// Delete a provider and its models. Returns `false` if absent.
    async fn delete_provider(&self, id: &str) -> Result<bool>;

    /// Atomically replace a provider's catalog: delete every model it owns,
    /// then upsert each of `models` keyed on `(provider_id, model_id)`.
    async fn replace_models(&self, provider_id: &str, models: &[Model]) -> Result<()>;

    /// A provider's models in catalog order.
    async fn list_models(&self, provider_id: &str) -> Result<Vec<Model>>;

    /// Insert a new collection. Fails if the `name` is already taken.
    async fn insert_collection(&self, collection: &Collection) -> Result<()>;

    async fn get_collection(&self, id: &str) -> Result<Option<Collection>>;

    async fn find_collection_by_name(&self, name: &str) -> Result<Option<Collection>>;

    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Delete a collection with its documents and their chunks.
    async fn delete_collection(&self, id: &str) -> Result<bool>;

    async fn insert_document(&self, document: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// A collection's documents in upload order.
    async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>>;

    /// Delete a document and its chunks.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Insert or replace a single chunk, keyed on `id`.
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;

    async fn set_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()>;

    /// A document's chunks ordered by `chunk_index`.
    async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Delete a document's chunks, returning how many were removed.
    async fn delete_chunks(&self, document_id: &str) -> Result<u64>;

    /// Chunks in a collection whose embedding is null, in natural order.
    async fn chunks_missing_embedding(&self, collection_id: &str) -> Result<Vec<Chunk>>;

    /// Every chunk with a non-null embedding whose document belongs to one
    /// of `collection_ids`.
    ///
    /// Natural order: documents by upload order, then chunks by index.
    async fn embedded_chunks(&self, collection_ids: &[String]) -> Result<Vec<Chunk>>;
}
