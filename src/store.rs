use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{Chunk, DocumentInfo};

/// Process-local registry of every ingested chunk, in ingestion order.
///
/// The lexical index is rebuilt from [`ChunkStore::snapshot`]; summarization
/// and comparison read a document's chunks back in `chunk_index` order.
pub struct ChunkStore {
    chunks: RwLock<Vec<Chunk>>,
    persist_path: Option<PathBuf>,
}

impl ChunkStore {
    /// Store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    /// Open a store persisted as JSON at `path`, creating it if missing.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let chunks = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Chunk store at {} is unreadable, starting empty: {e}", path.display());
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            chunks: RwLock::new(chunks),
            persist_path: Some(path.to_path_buf()),
        })
    }

    /// Append chunks. Existing chunks of the same document are left alone.
    pub fn add(&self, new_chunks: &[Chunk]) -> Result<()> {
        let mut chunks = self.chunks.write();
        chunks.extend_from_slice(new_chunks);
        self.persist(&chunks)
    }

    /// Remove every chunk of `doc_id`, returning how many were removed.
    pub fn delete_doc(&self, doc_id: &str) -> Result<usize> {
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|c| c.doc_id != doc_id);
        let removed = before - chunks.len();
        if removed > 0 {
            self.persist(&chunks)?;
        }
        Ok(removed)
    }

    /// Drop every chunk of `doc_id` and append `new_chunks` in one step.
    /// Returns how many old chunks were dropped.
    pub fn replace_doc(&self, doc_id: &str, new_chunks: &[Chunk]) -> Result<usize> {
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|c| c.doc_id != doc_id);
        let removed = before - chunks.len();
        chunks.extend_from_slice(new_chunks);
        self.persist(&chunks)?;
        Ok(removed)
    }

    /// All chunks of one document ordered by `chunk_index`.
    pub fn doc_chunks(&self, doc_id: &str) -> Vec<Chunk> {
        let chunks = self.chunks.read();
        let mut out: Vec<Chunk> = chunks.iter().filter(|c| c.doc_id == doc_id).cloned().collect();
        // Stable sort keeps appended re-ingestions after the originals.
        out.sort_by_key(|c| c.chunk_index);
        out
    }

    pub fn contains_doc(&self, doc_id: &str) -> bool {
        self.chunks.read().iter().any(|c| c.doc_id == doc_id)
    }

    /// Copy of the whole corpus in ingestion order.
    pub fn snapshot(&self) -> Vec<Chunk> {
        self.chunks.read().clone()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Documents with their chunk counts, sorted by `doc_id`.
    pub fn documents(&self) -> Vec<DocumentInfo> {
        let chunks = self.chunks.read();
        let mut by_doc: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for c in chunks.iter() {
            let entry = by_doc.entry(c.doc_id.as_str()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += c.char_len();
        }
        by_doc
            .into_iter()
            .map(|(doc_id, (chunk_count, total_chars))| DocumentInfo {
                doc_id: doc_id.to_string(),
                chunk_count,
                total_chars,
            })
            .collect()
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, chunks: &[Chunk]) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = serde_json::to_string(chunks)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
