use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::llm::embeddings::Embedder;
use crate::models::Chunk;

/// Nearest-neighbour service keyed by chunk metadata.
///
/// Only the rank order of `similarity_search` is relied on; implementations
/// are free to score however they like. Filters are exact `doc_id` equality.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, chunks: &[Chunk]) -> Result<()>;

    async fn similarity_search(&self, query: &str, k: usize, doc_filter: Option<&str>) -> Result<Vec<Chunk>>;

    /// Remove every vector of `doc_id` immediately. Returns how many were removed.
    async fn delete_where(&self, doc_id: &str) -> Result<usize>;

    /// Swap every vector of `doc_id` for `chunks`. On error the index is left
    /// as it was. Returns how many old vectors were dropped.
    async fn replace_doc(&self, doc_id: &str, chunks: &[Chunk]) -> Result<usize>;
}

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// In-memory cosine-similarity store with optional disk persistence.
pub struct EmbeddingVectorStore {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: Option<PathBuf>,
}

impl EmbeddingVectorStore {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    pub fn open_or_create(vector_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)?;
            serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Vector store is unreadable, starting empty: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            embedder,
            entries: RwLock::new(entries),
            persist_path: Some(persist_path),
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    async fn embed_entries(&self, chunks: &[Chunk]) -> Result<Vec<VectorEntry>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::IndexUnavailable(format!(
                "embedding service returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        Ok(chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry {
                chunk: chunk.clone(),
                embedding,
            })
            .collect())
    }

    fn persist(&self, entries: &[VectorEntry]) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = serde_json::to_string(entries)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for EmbeddingVectorStore {
    async fn add(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let new_entries = self.embed_entries(chunks).await?;
        let mut entries = self.entries.write();
        entries.extend(new_entries);
        self.persist(&entries)
    }

    async fn similarity_search(&self, query: &str, k: usize, doc_filter: Option<&str>) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::IndexUnavailable("no embedding returned for query".to_string()))?;

        let entries = self.entries.read();
        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|e| doc_filter.map_or(true, |id| e.chunk.doc_id == id))
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .collect();

        // Stable sort: equal similarity keeps insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, e)| e.chunk.clone()).collect())
    }

    async fn delete_where(&self, doc_id: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.chunk.doc_id != doc_id);
        let removed = before - entries.len();
        self.persist(&entries)?;
        Ok(removed)
    }

    async fn replace_doc(&self, doc_id: &str, chunks: &[Chunk]) -> Result<usize> {
        // Embed before touching the entries so a failed call changes nothing.
        let new_entries = self.embed_entries(chunks).await?;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.chunk.doc_id != doc_id);
        let removed = before - entries.len();
        entries.extend(new_entries);
        self.persist(&entries)?;
        Ok(removed)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
