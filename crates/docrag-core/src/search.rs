//! Brute-force similarity ranking.
//!
//! The ranking step of retrieval operates on a candidate list the caller
//! has already loaded (chunks with embeddings) and a pre-computed query
//! vector. It has no store, provider, or configuration dependencies.
//!
//! # Algorithm
//!
//! 1. Score every candidate with cosine similarity against the query.
//! 2. Skip candidates whose score is undefined (all-zero or non-finite
//!    stored vector).
//! 3. Stable sort by score descending; ties keep candidate order.
//! 4. Truncate to `limit`.
//!
//! This is a linear scan. An approximate-nearest-neighbor index can
//! replace it without changing inputs or outputs.

use serde::Serialize;
use thiserror::Error;

use crate::embedding::{cosine_similarity, is_zero_vector, SimilarityError};
use crate::models::Chunk;

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankError {
    #[error("query embedding is empty or all-zero")]
    ZeroQuery,
    #[error("chunk {chunk_id} has {actual} dimensions but the query has {expected}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },
}

/// Score and rank `candidates` against `query_vec`, returning at most
/// `limit` hits.
///
/// Candidates without an embedding are ignored.
///
/// # Errors
///
/// [`RankError::ZeroQuery`] if the query vector is empty or all-zero, and
/// [`RankError::DimensionMismatch`] if any candidate vector has a different
/// length than the query (mixed embedding spaces).
pub fn rank_chunks(
    query_vec: &[f32],
    candidates: Vec<Chunk>,
    limit: usize,
) -> Result<Vec<SearchHit>, RankError> {
    if query_vec.is_empty() || is_zero_vector(query_vec) {
        return Err(RankError::ZeroQuery);
    }

    let mut hits = Vec::with_capacity(candidates.len());
    for chunk in candidates {
        let score = match chunk.embedding.as_deref() {
            None => continue,
            Some(vec) => match cosine_similarity(query_vec, vec) {
                Ok(score) if score.is_finite() => score,
                Ok(_) => continue,
                Err(SimilarityError::ZeroVector) => continue,
                Err(SimilarityError::LengthMismatch { left, right }) => {
                    return Err(RankError::DimensionMismatch {
                        chunk_id: chunk.id.clone(),
                        expected: left,
                        actual: right,
                    })
                }
            },
        };
        hits.push(SearchHit { chunk, score });
    }

    // `sort_by` is stable: equal scores keep retrieval order.
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "d1".to_string(),
            chunk_index: 0,
            content: id.to_string(),
            embedding,
            start_offset: 0,
            end_offset: 1,
            metadata: serde_json::json!({}),
        }
    }

    /// A unit vector at `score` cosine from `[1, 0]`.
    fn at(score: f32) -> Vec<f32> {
        vec![score, (1.0 - score * score).sqrt()]
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let candidates = vec![
            chunk("first", Some(at(0.9))),
            chunk("low", Some(at(0.4))),
            chunk("second", Some(at(0.9))),
        ];
        let hits = rank_chunks(&[1.0, 0.0], candidates, 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!((hits[0].score - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_descending_order_and_limit() {
        let candidates = vec![
            chunk("a", Some(at(0.1))),
            chunk("b", Some(at(0.7))),
            chunk("c", Some(at(0.5))),
            chunk("d", Some(at(0.99))),
        ];
        let hits = rank_chunks(&[1.0, 0.0], candidates, 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "c"]);
    }

    #[test]
    fn test_skips_missing_and_zero_embeddings() {
        let candidates = vec![
            chunk("none", None),
            chunk("zero", Some(vec![0.0, 0.0])),
            chunk("ok", Some(at(0.3))),
        ];
        let hits = rank_chunks(&[1.0, 0.0], candidates, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "ok");
    }

    #[test]
    fn test_non_finite_vectors_are_skipped() {
        let candidates: Vec<Chunk> = (0..12)
            .map(|i| {
                let id = format!("c{}", i);
                if i % 3 == 0 {
                    chunk(&id, Some(vec![f32::INFINITY, 1.0]))
                } else {
                    chunk(&id, Some(at(i as f32 / 12.0)))
                }
            })
            .collect();
        let hits = rank_chunks(&[1.0, 0.0], candidates, 5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c11", "c10", "c8", "c7", "c5"]);
        assert!(hits.iter().all(|h| h.score.is_finite()));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let candidates = vec![chunk("wide", Some(vec![1.0, 0.0, 0.0]))];
        let err = rank_chunks(&[1.0, 0.0], candidates, 5).unwrap_err();
        assert!(matches!(
            err,
            RankError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_query_is_rejected() {
        let candidates = vec![chunk("a", Some(at(0.5)))];
        assert_eq!(
            rank_chunks(&[0.0, 0.0], candidates, 5).unwrap_err(),
            RankError::ZeroQuery
        );
    }

    #[test]
    fn test_empty_candidates() {
        assert!(rank_chunks(&[1.0], Vec::new(), 5).unwrap().is_empty());
    }
}
