use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkKey};
use crate::search::bm25::LexicalIndex;
use crate::search::vector::VectorIndex;

/// RRF constant: a chunk at 1-based rank `r` contributes `1 / (RRF_K + r)`.
pub const RRF_K: f64 = 60.0;

/// One chunk of the fused ranking.
#[derive(Debug, Clone)]
pub struct FusedResult {
    pub chunk: Chunk,
    pub score: f64,
    /// 1-based rank in the lexical list, if present there.
    pub lexical_rank: Option<usize>,
    /// 1-based rank in the vector list, if present there.
    pub vector_rank: Option<usize>,
}

/// Which sources contributed to a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Hybrid,
    VectorOnly,
    LexicalOnly,
    /// Both sources failed; callers fall back to no-context generation.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub results: Vec<FusedResult>,
    pub mode: RetrievalMode,
    pub lexical_hits: usize,
    pub vector_hits: usize,
}

/// Reciprocal Rank Fusion of two ranked lists, deduplicated by `(doc_id, chunk_index)`.
///
/// Ordering: fused score descending, then vector rank (chunks absent from the
/// vector list after all vector-ranked ones), then lexical rank.
pub fn rrf_fuse(lexical: &[Chunk], vector: &[Chunk], k: usize) -> Vec<FusedResult> {
    let mut by_key: HashMap<ChunkKey, FusedResult> = HashMap::new();

    for (i, chunk) in lexical.iter().enumerate() {
        let entry = by_key.entry(chunk.key()).or_insert_with(|| FusedResult {
            chunk: chunk.clone(),
            score: 0.0,
            lexical_rank: None,
            vector_rank: None,
        });
        if entry.lexical_rank.is_none() {
            let rank = i + 1;
            entry.lexical_rank = Some(rank);
            entry.score += 1.0 / (RRF_K + rank as f64);
        }
    }

    for (i, chunk) in vector.iter().enumerate() {
        let entry = by_key.entry(chunk.key()).or_insert_with(|| FusedResult {
            chunk: chunk.clone(),
            score: 0.0,
            lexical_rank: None,
            vector_rank: None,
        });
        if entry.vector_rank.is_none() {
            let rank = i + 1;
            entry.vector_rank = Some(rank);
            entry.score += 1.0 / (RRF_K + rank as f64);
        }
    }

    let mut results: Vec<FusedResult> = by_key.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| rank_order(a.vector_rank, b.vector_rank))
            .then_with(|| rank_order(a.lexical_rank, b.lexical_rank))
    });
    results.truncate(k);
    results
}

fn rank_order(a: Option<usize>, b: Option<usize>) -> std::cmp::Ordering {
    a.unwrap_or(usize::MAX).cmp(&b.unwrap_or(usize::MAX))
}

/// Single-source ranking with the same scoring, used when fusion is bypassed.
fn single_source(chunks: Vec<Chunk>, k: usize, from_vector: bool) -> Vec<FusedResult> {
    chunks
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, chunk)| {
            let rank = i + 1;
            FusedResult {
                chunk,
                score: 1.0 / (RRF_K + rank as f64),
                lexical_rank: (!from_vector).then_some(rank),
                vector_rank: from_vector.then_some(rank),
            }
        })
        .collect()
}

/// Queries the lexical index and the vector service and fuses their rankings.
pub struct HybridRetriever {
    lexical: Arc<LexicalIndex>,
    vector: Arc<dyn VectorIndex>,
}

impl HybridRetriever {
    pub fn new(lexical: Arc<LexicalIndex>, vector: Arc<dyn VectorIndex>) -> Self {
        Self { lexical, vector }
    }

    /// Top `k` fused chunks. Each source is asked for `2k` candidates.
    ///
    /// A failing source is logged and skipped; when both fail the result is
    /// empty with [`RetrievalMode::Unavailable`].
    pub async fn fuse(&self, query: &str, k: usize, doc_filter: Option<&str>) -> Retrieval {
        let fetch = k.saturating_mul(2);
        let (lexical, vector) = tokio::join!(
            self.lexical_candidates(query, fetch, doc_filter),
            self.vector.similarity_search(query, fetch, doc_filter),
        );

        let lexical = lexical
            .map_err(|e| tracing::warn!("Lexical retrieval unavailable, continuing without it: {e}"))
            .ok();
        let vector = vector
            .map_err(|e| tracing::warn!("Vector retrieval unavailable, continuing without it: {e}"))
            .ok();

        let lexical_hits = lexical.as_ref().map_or(0, Vec::len);
        let vector_hits = vector.as_ref().map_or(0, Vec::len);

        let (results, mode) = match (lexical, vector) {
            (Some(lex), Some(vec)) => (rrf_fuse(&lex, &vec, k), RetrievalMode::Hybrid),
            (None, Some(vec)) => (single_source(vec, k, true), RetrievalMode::VectorOnly),
            (Some(lex), None) => (single_source(lex, k, false), RetrievalMode::LexicalOnly),
            (None, None) => (Vec::new(), RetrievalMode::Unavailable),
        };

        tracing::debug!(
            "Retrieved {} fused chunks ({mode:?}; lexical={lexical_hits}, vector={vector_hits})",
            results.len()
        );

        Retrieval {
            results,
            mode,
            lexical_hits,
            vector_hits,
        }
    }

    /// Pure vector ranking, bypassing the lexical index entirely.
    pub async fn vector_only(&self, query: &str, k: usize, doc_filter: Option<&str>) -> Result<Vec<FusedResult>> {
        let chunks = self.vector.similarity_search(query, k, doc_filter).await?;
        Ok(single_source(chunks, k, true))
    }

    async fn lexical_candidates(&self, query: &str, k: usize, doc_filter: Option<&str>) -> Result<Vec<Chunk>> {
        let index = self.lexical.clone();
        let query = query.to_string();
        let filter = doc_filter.map(str::to_string);
        let hits = tokio::task::spawn_blocking(move || index.query(&query, k, filter.as_deref()))
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("lexical query task failed: {e}")))??;
        Ok(hits.into_iter().map(|h| h.chunk).collect())
    }
}
