//! Ingestion pipeline: collections, uploads, chunking, batch embedding.
//!
//! ```text
//! upload ─► validate ─► Parser ─► Document stored ─► return
//!                                        │
//!                            (background task, tracked)
//!                                        ▼
//!                     chunk_text ─► embed in batches of 10 ─► Chunk stored
//! ```
//!
//! Within a batch every chunk's embedding call runs concurrently; batches
//! run one after another. Each chunk is written as soon as its own call
//! settles. A failed embedding call is logged and the chunk is stored with
//! no embedding, so it stays available for reference but is never scored.

use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use docrag_core::chunk::{chunk_text, validate_params};
use docrag_core::models::{Chunk, Collection, Document, FileType};
use docrag_core::store::Store;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::extract::Parser;
use crate::gateway::Embedder;
use crate::tasks::{TaskState, TaskTracker};

/// Number of chunks embedded concurrently.
pub const EMBED_BATCH_SIZE: usize = 10;

/// Counters for one chunk-and-embed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub chunks: usize,
    pub embedded: usize,
    pub failed_embeddings: usize,
    pub failed_writes: usize,
}

/// Input for [`IngestionPipeline::create_collection`]. Chunking
/// parameters default to the configured values.
#[derive(Debug, Clone, Default)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub embedding_provider_id: String,
    /// Provider-native model identifier (e.g. `nomic-embed-text`).
    pub embedding_model_id: String,
}

/// How a chunk reaches the store once its embedding call settles.
#[derive(Clone, Copy)]
enum Persist {
    /// New chunk: insert it with or without an embedding.
    Insert,
    /// Stored chunk missing its embedding: update it only on success.
    UpdateEmbedding,
}

enum ChunkOutcome {
    Embedded,
    EmbedFailed,
    WriteFailed,
}

/// Owns the Collection → Document → Chunk lifecycle.
///
/// Cheap to clone; clones share the store, embedder, parser, and task
/// tracker.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    parser: Arc<dyn Parser>,
    tasks: TaskTracker,
    defaults: ChunkingConfig,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        parser: Arc<dyn Parser>,
        defaults: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            parser,
            tasks: TaskTracker::new(),
            defaults,
        }
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    // ---- collections ----

    pub async fn create_collection(&self, new: NewCollection) -> Result<Collection> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("collection name must not be empty".to_string()));
        }
        let chunk_size = new.chunk_size.unwrap_or(self.defaults.chunk_size);
        let chunk_overlap = new.chunk_overlap.unwrap_or(self.defaults.chunk_overlap);
        validate_params(chunk_size, chunk_overlap).map_err(|e| Error::Validation(e.to_string()))?;
        if new.embedding_model_id.trim().is_empty() {
            return Err(Error::Validation("embedding model id must not be empty".to_string()));
        }

        if self
            .store
            .get_provider(&new.embedding_provider_id)
            .await?
            .is_none()
        {
            return Err(Error::not_found("Provider", new.embedding_provider_id));
        }
        if self.store.find_collection_by_name(&name).await?.is_some() {
            return Err(Error::duplicate("Collection", name));
        }

        let collection = Collection {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description: new.description,
            chunk_size,
            chunk_overlap,
            embedding_provider_id: new.embedding_provider_id,
            embedding_model_id: new.embedding_model_id.trim().to_string(),
            created_at: now(),
        };
        self.store.insert_collection(&collection).await?;
        info!(collection = %collection.name, id = %collection.id, "Created collection");
        Ok(collection)
    }

    pub async fn get_collection(&self, id: &str) -> Result<Collection> {
        self.store
            .get_collection(id)
            .await?
            .ok_or_else(|| Error::not_found("Collection", id))
    }

    /// Look up by id, then by name.
    pub async fn find_collection(&self, id_or_name: &str) -> Result<Collection> {
        if let Some(c) = self.store.get_collection(id_or_name).await? {
            return Ok(c);
        }
        self.store
            .find_collection_by_name(id_or_name)
            .await?
            .ok_or_else(|| Error::not_found("Collection", id_or_name))
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(self.store.list_collections().await?)
    }

    pub async fn delete_collection(&self, id: &str) -> Result<()> {
        let documents = self.store.list_documents(id).await?;
        if !self.store.delete_collection(id).await? {
            return Err(Error::not_found("Collection", id));
        }
        for doc in &documents {
            self.tasks.forget(&doc.id);
        }
        info!(collection_id = id, documents = documents.len(), "Deleted collection");
        Ok(())
    }

    // ---- documents ----

    /// Validate, parse, and store a document, then chunk and embed it in
    /// the background.
    ///
    /// Returns once the document is stored. Use [`wait`](Self::wait) or
    /// [`ingest_status`](Self::ingest_status) to follow the background run.
    pub async fn upload(
        &self,
        collection_id: &str,
        path: &Path,
        filename: Option<&str>,
    ) -> Result<Document> {
        let collection = self.get_collection(collection_id).await?;

        let filename = match filename {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::Validation(format!("no filename in {}", path.display())))?,
        };
        let file_type = FileType::from_filename(&filename)
            .ok_or_else(|| Error::UnsupportedType(filename.clone()))?;

        let file_size_bytes = tokio::fs::metadata(path).await?.len();

        let parser = self.parser.clone();
        let parse_path = path.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&parse_path, file_type))
            .await
            .map_err(|e| Error::Parse(format!("parser task failed: {}", e)))?
            .map_err(|e| Error::Parse(e.to_string()))?;

        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id: collection.id.clone(),
            filename,
            filepath: path.display().to_string(),
            file_type,
            file_size_bytes,
            raw_content: parsed.text,
            metadata: parsed.metadata,
            created_at: now(),
        };
        self.store.insert_document(&document).await?;
        info!(
            document = %document.filename,
            id = %document.id,
            chars = document.raw_content.chars().count(),
            "Stored document"
        );

        self.tasks.set(&document.id, TaskState::Pending);
        self.spawn_processing(document.clone(), collection);
        Ok(document)
    }

    /// Start the background run. The caller has already marked the
    /// document `Pending`.
    fn spawn_processing(&self, document: Document, collection: Collection) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.process_document(&document, &collection).await;
        });
    }

    /// Chunk and embed one document, recording the outcome in the tracker.
    async fn process_document(&self, document: &Document, collection: &Collection) {
        self.tasks.set(&document.id, TaskState::Running);

        let chunks = match chunk_text(
            &document.id,
            &document.raw_content,
            collection.chunk_size,
            collection.chunk_overlap,
        ) {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(document_id = %document.id, error = %e, "Chunking failed");
                self.tasks.set(
                    &document.id,
                    TaskState::Failed {
                        message: e.to_string(),
                    },
                );
                return;
            }
        };

        let report = self.embed_chunks(chunks, collection, Persist::Insert).await;
        if report.chunks > 0 && report.failed_writes == report.chunks {
            error!(document_id = %document.id, "No chunks could be stored");
            self.tasks.set(
                &document.id,
                TaskState::Failed {
                    message: format!("all {} chunk writes failed", report.chunks),
                },
            );
            return;
        }

        info!(
            document_id = %document.id,
            chunks = report.chunks,
            embedded = report.embedded,
            failed = report.failed_embeddings,
            "Ingested document"
        );
        self.tasks
            .set(&document.id, TaskState::Completed { report });
    }

    /// Embed `chunks` in sequential batches of concurrent calls.
    async fn embed_chunks(
        &self,
        chunks: Vec<Chunk>,
        collection: &Collection,
        persist: Persist,
    ) -> IngestReport {
        let mut report = IngestReport {
            chunks: chunks.len(),
            ..Default::default()
        };

        for (batch_index, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
            debug!(batch = batch_index, size = batch.len(), "Embedding batch");
            let calls = batch
                .iter()
                .cloned()
                .map(|chunk| self.embed_one(chunk, collection, persist));
            for outcome in join_all(calls).await {
                match outcome {
                    ChunkOutcome::Embedded => report.embedded += 1,
                    ChunkOutcome::EmbedFailed => report.failed_embeddings += 1,
                    ChunkOutcome::WriteFailed => report.failed_writes += 1,
                }
            }
        }

        report
    }

    async fn embed_one(&self, mut chunk: Chunk, collection: &Collection, persist: Persist) -> ChunkOutcome {
        let embedding = match self
            .embedder
            .embed(
                &chunk.content,
                &collection.embedding_provider_id,
                &collection.embedding_model_id,
            )
            .await
        {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(chunk_id = %chunk.id, index = chunk.chunk_index, error = %e, "Chunk embedding failed");
                None
            }
        };
        let embedded = embedding.is_some();

        let written = match (persist, embedding) {
            (Persist::Insert, embedding) => {
                chunk.embedding = embedding;
                self.store.insert_chunk(&chunk).await
            }
            (Persist::UpdateEmbedding, Some(vector)) => {
                self.store.set_chunk_embedding(&chunk.id, &vector).await
            }
            (Persist::UpdateEmbedding, None) => Ok(()),
        };

        match written {
            Err(e) => {
                error!(chunk_id = %chunk.id, error = %e, "Failed to store chunk");
                ChunkOutcome::WriteFailed
            }
            Ok(()) if embedded => ChunkOutcome::Embedded,
            Ok(()) => ChunkOutcome::EmbedFailed,
        }
    }

    pub async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>> {
        self.get_collection(collection_id).await?;
        Ok(self.store.list_documents(collection_id).await?)
    }

    pub async fn get_document(&self, id: &str) -> Result<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| Error::not_found("Document", id))
    }

    pub async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.get_document(document_id).await?;
        Ok(self.store.list_chunks(document_id).await?)
    }

    /// Delete a document and its chunks.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        if !self.store.delete_document(id).await? {
            return Err(Error::not_found("Document", id));
        }
        self.tasks.forget(id);
        info!(document_id = id, "Deleted document");
        Ok(())
    }

    /// Drop a document's chunks and re-run chunking and embedding in the
    /// background, picking up the collection's current settings.
    ///
    /// Fails with [`Error::Validation`] while an earlier run for the
    /// document is still pending or running.
    pub async fn reindex_document(&self, id: &str) -> Result<()> {
        let document = self.get_document(id).await?;
        let collection = self.get_collection(&document.collection_id).await?;
        if !self.tasks.try_begin(id) {
            return Err(Error::Validation(format!(
                "document {} is still being processed",
                id
            )));
        }
        let removed = match self.store.delete_chunks(id).await {
            Ok(removed) => removed,
            Err(e) => {
                self.tasks.set(
                    id,
                    TaskState::Failed {
                        message: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };
        debug!(document_id = id, removed, "Cleared chunks for reindex");
        self.spawn_processing(document, collection);
        Ok(())
    }

    /// Retry embeddings for every chunk in the collection stored without
    /// one. Runs in the foreground with the same batching as ingestion.
    ///
    /// Chunks of documents with a background run still in flight are left
    /// to that run.
    pub async fn embed_pending(&self, collection_id: &str) -> Result<IngestReport> {
        let collection = self.get_collection(collection_id).await?;
        let mut pending = self.store.chunks_missing_embedding(collection_id).await?;
        let before = pending.len();
        pending.retain(|chunk| !self.tasks.is_active(&chunk.document_id));
        if pending.len() < before {
            debug!(
                skipped = before - pending.len(),
                "Skipping chunks of documents still being processed"
            );
        }
        if pending.is_empty() {
            return Ok(IngestReport::default());
        }
        info!(collection = %collection.name, pending = pending.len(), "Embedding pending chunks");
        Ok(self
            .embed_chunks(pending, &collection, Persist::UpdateEmbedding)
            .await)
    }

    pub fn ingest_status(&self, document_id: &str) -> Option<TaskState> {
        self.tasks.status(document_id)
    }

    /// Wait for a document's background run to finish.
    pub async fn wait(&self, document_id: &str) -> Option<TaskState> {
        self.tasks.wait(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractError, ParsedDocument};
    use async_trait::async_trait;
    use docrag_core::models::{Provider, ProviderConfig, TestResult};
    use docrag_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Parser that returns fixed text for any file.
    struct FixedParser(String);

    impl Parser for FixedParser {
        fn parse(&self, _path: &Path, file_type: FileType) -> std::result::Result<ParsedDocument, ExtractError> {
            if self.0 == "FAIL" {
                return Err(ExtractError::Pdf("corrupt".to_string()));
            }
            Ok(ParsedDocument {
                text: self.0.clone(),
                metadata: serde_json::json!({ "file_type": file_type.as_str() }),
            })
        }
    }

    /// Embeds every chunk as `[1, len]`, failing chunks containing "BAD".
    /// Each call takes `delay`; `peak` records the most calls in flight.
    #[derive(Default)]
    struct FakeEmbedder {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str, _provider_id: &str, _model_id: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if text.contains("BAD") {
                return Err(Error::Validation("refused".to_string()));
            }
            Ok(vec![1.0, text.len() as f32])
        }
    }

    async fn setup(text: &str) -> (IngestionPipeline, Arc<InMemoryStore>, Arc<FakeEmbedder>, Collection) {
        setup_with_delay(text, Duration::ZERO).await
    }

    async fn setup_with_delay(
        text: &str,
        delay: Duration,
    ) -> (IngestionPipeline, Arc<InMemoryStore>, Arc<FakeEmbedder>, Collection) {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_provider(&Provider {
                id: "p1".to_string(),
                name: "ollama".to_string(),
                credential: None,
                is_active: true,
                is_connected: false,
                last_test_result: TestResult::Unset,
                last_test_message: None,
                config: ProviderConfig::local("http://localhost:11434"),
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();
        let embedder = Arc::new(FakeEmbedder {
            delay,
            ..Default::default()
        });
        let pipeline = IngestionPipeline::new(
            store.clone(),
            embedder.clone(),
            Arc::new(FixedParser(text.to_string())),
            ChunkingConfig::default(),
        );
        let collection = pipeline
            .create_collection(NewCollection {
                name: "docs".to_string(),
                chunk_size: Some(10),
                chunk_overlap: Some(0),
                embedding_provider_id: "p1".to_string(),
                embedding_model_id: "nomic-embed-text".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (pipeline, store, embedder, collection)
    }

    fn temp_file(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"placeholder").unwrap();
        path
    }

    #[tokio::test]
    async fn test_collection_validation() {
        let (pipeline, _, _, _) = setup("x").await;
        let bad_overlap = pipeline
            .create_collection(NewCollection {
                name: "other".to_string(),
                chunk_size: Some(10),
                chunk_overlap: Some(10),
                embedding_provider_id: "p1".to_string(),
                embedding_model_id: "m".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(bad_overlap, Error::Validation(_)));

        let duplicate = pipeline
            .create_collection(NewCollection {
                name: "docs".to_string(),
                embedding_provider_id: "p1".to_string(),
                embedding_model_id: "m".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(duplicate, Error::Duplicate { .. }));

        let missing_provider = pipeline
            .create_collection(NewCollection {
                name: "third".to_string(),
                embedding_provider_id: "nope".to_string(),
                embedding_model_id: "m".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(missing_provider, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_chunk_without_embedding() {
        // Ten 10-char chunks; the fourth contains the failure marker.
        let text = "aaaaaaaaaabbbbbbbbbbccccccccccBAD-------ddddddddddeeeeeeeeeeffffffffffgggggggggghhhhhhhhhhiiiiiiiiii";
        let (pipeline, store, _, collection) = setup(text).await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "report.pdf"), None)
            .await
            .unwrap();

        match pipeline.wait(&doc.id).await.unwrap() {
            TaskState::Completed { report } => {
                assert_eq!(report.chunks, 10);
                assert_eq!(report.embedded, 9);
                assert_eq!(report.failed_embeddings, 1);
                assert_eq!(report.failed_writes, 0);
            }
            other => panic!("unexpected state: {:?}", other),
        }

        let chunks = store.list_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), 10);
        let failed: Vec<&Chunk> = chunks.iter().filter(|c| c.embedding.is_none()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].chunk_index, 3);
    }

    #[tokio::test]
    async fn test_batches_cover_all_chunks() {
        let text = "x".repeat(235);
        let (pipeline, store, embedder, collection) = setup(&text).await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "deck.pptx"), None)
            .await
            .unwrap();
        pipeline.wait(&doc.id).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 24);
        assert_eq!(store.list_chunks(&doc.id).await.unwrap().len(), 24);
    }

    #[tokio::test]
    async fn test_batches_run_concurrently_one_at_a_time() {
        let text = "x".repeat(235);
        let (pipeline, _, embedder, collection) =
            setup_with_delay(&text, Duration::from_millis(20)).await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "deck.pptx"), None)
            .await
            .unwrap();
        pipeline.wait(&doc.id).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 24);
        // A full batch is in flight at once, and never more than one batch.
        assert_eq!(embedder.peak.load(Ordering::SeqCst), EMBED_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_reindex_refused_while_run_in_flight() {
        let text = "abcdefghij".repeat(30);
        let (pipeline, store, _, collection) =
            setup_with_delay(&text, Duration::from_millis(20)).await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "a.pdf"), None)
            .await
            .unwrap();

        let err = pipeline.reindex_document(&doc.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        pipeline.wait(&doc.id).await.unwrap();

        pipeline.reindex_document(&doc.id).await.unwrap();
        assert!(matches!(
            pipeline.reindex_document(&doc.id).await.unwrap_err(),
            Error::Validation(_)
        ));
        match pipeline.wait(&doc.id).await.unwrap() {
            TaskState::Completed { report } => assert_eq!(report.chunks, 30),
            other => panic!("unexpected state: {:?}", other),
        }

        let chunks = store.list_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), 30);
        assert_eq!(chunks[0].start_offset, 0);
        for pair in chunks.windows(2) {
            assert!(pair[0].start_offset < pair[1].start_offset);
        }
    }

    #[tokio::test]
    async fn test_embed_pending_leaves_running_documents_alone() {
        let text = format!("{}BAD-------", "abcdefghij".repeat(29));
        let (pipeline, store, _, collection) =
            setup_with_delay(&text, Duration::from_millis(20)).await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "a.pdf"), None)
            .await
            .unwrap();

        let report = pipeline.embed_pending(&collection.id).await.unwrap();
        assert_eq!(report.chunks, 0);

        pipeline.wait(&doc.id).await.unwrap();
        let report = pipeline.embed_pending(&collection.id).await.unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(store.list_chunks(&doc.id).await.unwrap().len(), 30);
    }

    #[tokio::test]
    async fn test_upload_rejects_before_parsing() {
        let (pipeline, store, _, collection) = setup("text").await;
        let dir = tempfile::tempdir().unwrap();

        let err = pipeline
            .upload(&collection.id, &temp_file(&dir, "notes.txt"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));

        let err = pipeline
            .upload("missing", &temp_file(&dir, "a.pdf"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        assert!(store.list_documents(&collection.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_creates_no_document() {
        let (pipeline, store, _, collection) = setup("FAIL").await;
        let dir = tempfile::tempdir().unwrap();
        let err = pipeline
            .upload(&collection.id, &temp_file(&dir, "broken.docx"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(store.list_documents(&collection.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declared_filename_decides_type() {
        let (pipeline, _, _, collection) = setup("hello world").await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "upload.tmp"), Some("Quarterly.XLSX"))
            .await
            .unwrap();
        assert_eq!(doc.file_type, FileType::Xlsx);
        assert_eq!(doc.filename, "Quarterly.XLSX");
    }

    #[tokio::test]
    async fn test_embed_pending_fills_gaps() {
        let (pipeline, store, _, collection) = setup("okokokokokBADBADBAD").await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "a.pdf"), None)
            .await
            .unwrap();
        pipeline.wait(&doc.id).await.unwrap();
        assert_eq!(store.chunks_missing_embedding(&collection.id).await.unwrap().len(), 1);

        // Still failing: nothing changes, nothing is lost.
        let report = pipeline.embed_pending(&collection.id).await.unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.failed_embeddings, 1);
        assert_eq!(store.list_chunks(&doc.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_document_cascades() {
        let (pipeline, store, _, collection) = setup("some text here").await;
        let dir = tempfile::tempdir().unwrap();
        let doc = pipeline
            .upload(&collection.id, &temp_file(&dir, "a.pdf"), None)
            .await
            .unwrap();
        pipeline.wait(&doc.id).await.unwrap();
        pipeline.delete_document(&doc.id).await.unwrap();
        assert!(store.list_chunks(&doc.id).await.unwrap().is_empty());
        assert!(pipeline.ingest_status(&doc.id).is_none());
        assert!(matches!(
            pipeline.delete_document(&doc.id).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
