//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`crate::migrate`]. Multi-statement operations (catalog replacement,
//! cascading deletes) run inside a single transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docrag_core::embedding::{blob_to_vec, vec_to_blob};
use docrag_core::models::{Chunk, Collection, Document, Model, Provider, ProviderConfig};
use docrag_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::json!({}))
}

fn row_to_provider(row: &SqliteRow) -> Result<Provider> {
    let id: String = row.get("id");
    let config_json: String = row.get("config_json");
    let config: ProviderConfig = serde_json::from_str(&config_json)
        .with_context(|| format!("provider {} has an invalid stored config", id))?;
    let last_test_result: String = row.get("last_test_result");
    Ok(Provider {
        id,
        name: row.get("name"),
        credential: row.get("credential"),
        is_active: row.get("is_active"),
        is_connected: row.get("is_connected"),
        last_test_result: last_test_result.parse().map_err(anyhow::Error::msg)?,
        last_test_message: row.get("last_test_message"),
        config,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_model(row: &SqliteRow) -> Model {
    let metadata_json: String = row.get("metadata_json");
    Model {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        model_id: row.get("model_id"),
        display_name: row.get("display_name"),
        is_default: row.get("is_default"),
        is_available: row.get("is_available"),
        is_selected: row.get("is_selected"),
        description: row.get("description"),
        metadata: parse_json(&metadata_json),
    }
}

fn row_to_collection(row: &SqliteRow) -> Collection {
    let chunk_size: i64 = row.get("chunk_size");
    let chunk_overlap: i64 = row.get("chunk_overlap");
    Collection {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        chunk_size: chunk_size as usize,
        chunk_overlap: chunk_overlap as usize,
        embedding_provider_id: row.get("embedding_provider_id"),
        embedding_model_id: row.get("embedding_model_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let file_type: String = row.get("file_type");
    let file_size_bytes: i64 = row.get("file_size_bytes");
    let metadata_json: String = row.get("metadata_json");
    Ok(Document {
        id: row.get("id"),
        collection_id: row.get("collection_id"),
        filename: row.get("filename"),
        filepath: row.get("filepath"),
        file_type: file_type.parse().map_err(anyhow::Error::msg)?,
        file_size_bytes: file_size_bytes as u64,
        raw_content: row.get("raw_content"),
        metadata: parse_json(&metadata_json),
        created_at: row.get("created_at"),
    })
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let start_offset: i64 = row.get("start_offset");
    let end_offset: i64 = row.get("end_offset");
    let metadata_json: String = row.get("metadata_json");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        start_offset: start_offset as usize,
        end_offset: end_offset as usize,
        metadata: parse_json(&metadata_json),
    }
}

const CHUNK_COLUMNS: &str = "c.id, c.document_id, c.chunk_index, c.content, c.embedding, \
                             c.start_offset, c.end_offset, c.metadata_json";

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_provider(&self, provider: &Provider) -> Result<()> {
        let config_json = serde_json::to_string(&provider.config)?;
        sqlx::query(
            r#"
            INSERT INTO providers (id, name, kind, credential, is_active, is_connected,
                                   last_test_result, last_test_message, config_json,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                credential = excluded.credential,
                is_active = excluded.is_active,
                is_connected = excluded.is_connected,
                last_test_result = excluded.last_test_result,
                last_test_message = excluded.last_test_message,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&provider.id)
        .bind(&provider.name)
        .bind(provider.kind().as_str())
        .bind(&provider.credential)
        .bind(provider.is_active)
        .bind(provider.is_connected)
        .bind(provider.last_test_result.as_str())
        .bind(&provider.last_test_message)
        .bind(&config_json)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>> {
        let row = sqlx::query("SELECT * FROM providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_provider).transpose()
    }

    async fn find_provider_by_name(&self, name: &str) -> Result<Option<Provider>> {
        let row = sqlx::query("SELECT * FROM providers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_provider).transpose()
    }

    async fn list_providers(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query("SELECT * FROM providers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_provider).collect()
    }

    async fn delete_provider(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM models WHERE provider_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_models(&self, provider_id: &str, models: &[Model]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM models WHERE provider_id = ?")
            .bind(provider_id)
            .execute(&mut *tx)
            .await?;

        for model in models {
            if model.provider_id != provider_id {
                anyhow::bail!(
                    "replace_models: model {} does not belong to provider {}",
                    model.model_id,
                    provider_id
                );
            }
            upsert_model_query(model)?.execute(&mut *tx).await?;
        }

        // Dropping `tx` on an early return rolls back, leaving the old catalog.
        tx.commit().await?;
        Ok(())
    }

    async fn list_models(&self, provider_id: &str) -> Result<Vec<Model>> {
        let rows = sqlx::query("SELECT * FROM models WHERE provider_id = ? ORDER BY rowid ASC")
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_model).collect())
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (id, name, description, chunk_size, chunk_overlap,
                                     embedding_provider_id, embedding_model_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&collection.id)
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(collection.chunk_size as i64)
        .bind(collection.chunk_overlap as i64)
        .bind(&collection.embedding_provider_id)
        .bind(&collection.embedding_model_id)
        .bind(collection.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_collection))
    }

    async fn find_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
        let row = sqlx::query("SELECT * FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_collection))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let rows = sqlx::query("SELECT * FROM collections ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_collection).collect())
    }

    async fn delete_collection(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM chunks WHERE document_id IN (SELECT id FROM documents WHERE collection_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM documents WHERE collection_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, collection_id, filename, filepath, file_type,
                                   file_size_bytes, raw_content, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.collection_id)
        .bind(&document.filename)
        .bind(&document.filepath)
        .bind(document.file_type.as_str())
        .bind(document.file_size_bytes as i64)
        .bind(&document.raw_content)
        .bind(document.metadata.to_string())
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>> {
        let rows =
            sqlx::query("SELECT * FROM documents WHERE collection_id = ? ORDER BY rowid ASC")
                .bind(collection_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, content, embedding,
                                start_offset, end_offset, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                chunk_index = excluded.chunk_index,
                content = excluded.content,
                embedding = excluded.embedding,
                start_offset = excluded.start_offset,
                end_offset = excluded.end_offset,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(chunk.embedding.as_deref().map(vec_to_blob))
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(chunk.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        let result = sqlx::query("UPDATE chunks SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(embedding))
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("chunk {} not found", chunk_id);
        }
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {} FROM chunks c WHERE c.document_id = ? ORDER BY c.chunk_index ASC",
            CHUNK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn chunks_missing_embedding(&self, collection_id: &str) -> Result<Vec<Chunk>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.collection_id = ? AND c.embedding IS NULL
            ORDER BY d.rowid ASC, c.chunk_index ASC
            "#,
            CHUNK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn embedded_chunks(&self, collection_ids: &[String]) -> Result<Vec<Chunk>> {
        if collection_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; collection_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT {}
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.collection_id IN ({}) AND c.embedding IS NOT NULL
            ORDER BY d.rowid ASC, c.chunk_index ASC
            "#,
            CHUNK_COLUMNS, placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in collection_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }
}

fn upsert_model_query(
    model: &Model,
) -> Result<sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>>> {
    Ok(sqlx::query(
        r#"
        INSERT INTO models (id, provider_id, model_id, display_name, is_default,
                            is_available, is_selected, description, metadata_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(provider_id, model_id) DO UPDATE SET
            display_name = excluded.display_name,
            is_default = excluded.is_default,
            is_available = excluded.is_available,
            is_selected = excluded.is_selected,
            description = excluded.description,
            metadata_json = excluded.metadata_json
        "#,
    )
    .bind(&model.id)
    .bind(&model.provider_id)
    .bind(&model.model_id)
    .bind(&model.display_name)
    .bind(model.is_default)
    .bind(model.is_available)
    .bind(model.is_selected)
    .bind(&model.description)
    .bind(serde_json::to_string(&model.metadata)?))
}
