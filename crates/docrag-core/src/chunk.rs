//! Sliding-window text chunker.
//!
//! Splits a document's extracted text into overlapping [`Chunk`]s. Each
//! window is `chunk_size` characters wide and starts `chunk_size -
//! chunk_overlap` characters after the previous one, so consecutive chunks
//! share exactly `chunk_overlap` characters.
//!
//! Offsets are counted in `char`s, not bytes, so multi-byte text never
//! splits inside a code point.
//!
//! Each chunk carries a SHA-256 hash of its content under `metadata.hash`.
//!
//! # Guarantees
//!
//! - The first chunk starts at offset 0.
//! - Start offsets are strictly increasing and `start < end` for every chunk.
//! - The union of `[start, end)` ranges covers `[0, len)`.
//! - Empty text produces no chunks.
//!
//! # Example
//!
//! ```rust
//! use docrag_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-123", "abcdefghij", 4, 1).unwrap();
//! let spans: Vec<_> = chunks.iter().map(|c| (c.start_offset, c.end_offset)).collect();
//! assert_eq!(spans, vec![(0, 4), (3, 7), (6, 10)]);
//! ```

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Chunk;

/// Rejected chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkParamsError {
    #[error("chunk size must be greater than 0")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Check the `chunk_overlap < chunk_size` invariant.
pub fn validate_params(chunk_size: usize, chunk_overlap: usize) -> Result<(), ChunkParamsError> {
    if chunk_size == 0 {
        return Err(ChunkParamsError::ZeroSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ChunkParamsError::OverlapTooLarge {
            size: chunk_size,
            overlap: chunk_overlap,
        });
    }
    Ok(())
}

/// Split `text` into overlapping windows.
///
/// Returned chunks have contiguous `chunk_index` values starting at 0 and
/// no embedding.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ChunkParamsError> {
    validate_params(chunk_size, chunk_overlap)?;

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let step = chunk_size - chunk_overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < len {
        let end = (start + chunk_size).min(len);
        let content: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(document_id, chunks.len() as i64, content, start, end));
        if end == len {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// SHA-256 of a chunk's content, hex-encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(document_id: &str, index: i64, content: String, start: usize, end: usize) -> Chunk {
    let hash = content_hash(&content);
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        content,
        embedding: None,
        start_offset: start,
        end_offset: end,
        metadata: serde_json::json!({ "hash": hash }),
    }
}
