use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

use crate::chunking::{chunk_document, DocumentFormat};
use crate::config::ReingestPolicy;
use crate::error::{RagError, Result};
use crate::models::{DocumentSection, IngestReport};
use crate::search::vector::VectorIndex;
use crate::store::ChunkStore;

/// Turns loaded documents into stored, vector-indexed chunks.
///
/// The lexical index is deliberately untouched: it sees new or deleted
/// chunks only after an explicit rebuild.
pub struct Ingestor {
    store: Arc<ChunkStore>,
    vectors: Arc<dyn VectorIndex>,
    policy: ReingestPolicy,
}

impl Ingestor {
    pub fn new(store: Arc<ChunkStore>, vectors: Arc<dyn VectorIndex>, policy: ReingestPolicy) -> Self {
        Self { store, vectors, policy }
    }

    pub async fn ingest(
        &self,
        file_name: &str,
        doc_id: Option<&str>,
        sections: &[DocumentSection],
    ) -> Result<IngestReport> {
        let format = DocumentFormat::from_file_name(file_name)?;
        let doc_id = resolve_doc_id(file_name, doc_id)?;

        let (plan, chunks) = chunk_document(&doc_id, sections);
        let report = IngestReport {
            doc_id: doc_id.clone(),
            chunks_created: chunks.len(),
            chunk_size: plan.chunk_size,
            chunk_overlap: plan.overlap,
            ingested_at: Utc::now(),
        };
        if chunks.is_empty() {
            tracing::info!("Ingested {doc_id} ({format:?}): no text, 0 chunks");
            return Ok(report);
        }

        // Vectors first: if embedding fails the store is left unchanged.
        let existing = self.store.contains_doc(&doc_id);
        match self.policy {
            ReingestPolicy::Replace if existing => {
                self.vectors.replace_doc(&doc_id, &chunks).await?;
                let removed = self.store.replace_doc(&doc_id, &chunks)?;
                tracing::info!("Re-ingesting {doc_id}: replaced {removed} old chunks");
            }
            _ => {
                if existing {
                    tracing::warn!("Re-ingesting {doc_id}: appending next to existing chunks");
                }
                self.vectors.add(&chunks).await?;
                self.store.add(&chunks)?;
            }
        }

        tracing::info!(
            "Ingested {doc_id} ({format:?}): {} chunks (size {}, overlap {})",
            chunks.len(),
            plan.chunk_size,
            plan.overlap
        );
        Ok(report)
    }

    /// Remove a document from the store and the vector index. The lexical
    /// index keeps serving the old chunks until it is rebuilt.
    pub async fn delete(&self, doc_id: &str) -> Result<usize> {
        let from_vectors = self.vectors.delete_where(doc_id).await?;
        let from_store = self.store.delete_doc(doc_id)?;
        if from_store == 0 && from_vectors == 0 {
            return Err(RagError::DocumentNotFound(doc_id.to_string()));
        }
        tracing::info!("Deleted {doc_id}: {from_store} chunks, {from_vectors} vectors");
        Ok(from_store)
    }
}

/// Caller-supplied id, else the file name without its directory.
fn resolve_doc_id(file_name: &str, doc_id: Option<&str>) -> Result<String> {
    if let Some(id) = doc_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RagError::InvalidRequest(format!("cannot derive a document id from {file_name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::embeddings::Embedder;
    use crate::search::vector::EmbeddingVectorStore;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::upstream_status(503, "embedding model loading"))
        }
    }

    /// Works until switched off, then fails like a downed model server.
    struct SwitchableEmbedder {
        failing: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Embedder for SwitchableEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RagError::upstream_status(503, "embedding model loading"));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn sections(text: &str) -> Vec<DocumentSection> {
        vec![DocumentSection {
            text: text.to_string(),
            locator: "page 1".to_string(),
        }]
    }

    fn ingestor(policy: ReingestPolicy) -> (Ingestor, Arc<ChunkStore>, Arc<EmbeddingVectorStore>) {
        let store = Arc::new(ChunkStore::in_memory());
        let vectors = Arc::new(EmbeddingVectorStore::in_memory(Arc::new(LengthEmbedder)));
        (Ingestor::new(store.clone(), vectors.clone(), policy), store, vectors)
    }

    #[tokio::test]
    async fn test_doc_id_derived_from_file_name() {
        let (ingestor, store, vectors) = ingestor(ReingestPolicy::Append);
        let report = ingestor
            .ingest("papers/attention.pdf", None, &sections("Attention is all you need."))
            .await
            .unwrap();
        assert_eq!(report.doc_id, "attention.pdf");
        assert_eq!(report.chunks_created, 1);
        assert_eq!((report.chunk_size, report.chunk_overlap), (1000, 200));
        assert!(store.contains_doc("attention.pdf"));
        assert_eq!(vectors.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected() {
        let (ingestor, store, _) = ingestor(ReingestPolicy::Append);
        let err = ingestor.ingest("slides.pptx", None, &sections("x")).await.unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(ref ext) if ext.contains("pptx")));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_document_yields_no_chunks() {
        let (ingestor, store, _) = ingestor(ReingestPolicy::Append);
        let report = ingestor.ingest("blank.txt", Some("blank"), &sections("   \n")).await.unwrap();
        assert_eq!(report.chunks_created, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reingest_policies() {
        let (append, store, _) = ingestor(ReingestPolicy::Append);
        append.ingest("a.md", Some("A"), &sections("first version")).await.unwrap();
        append.ingest("a.md", Some("A"), &sections("second version")).await.unwrap();
        assert_eq!(store.doc_chunks("A").len(), 2);

        let (replace, store, vectors) = ingestor(ReingestPolicy::Replace);
        replace.ingest("a.md", Some("A"), &sections("first version")).await.unwrap();
        replace.ingest("a.md", Some("A"), &sections("second version")).await.unwrap();
        let chunks = store.doc_chunks("A");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "second version");
        assert_eq!(vectors.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_store_untouched() {
        let store = Arc::new(ChunkStore::in_memory());
        let vectors = Arc::new(EmbeddingVectorStore::in_memory(Arc::new(FailingEmbedder)));
        let ingestor = Ingestor::new(store.clone(), vectors, ReingestPolicy::Append);
        let err = ingestor.ingest("a.md", None, &sections("text")).await.unwrap_err();
        assert!(matches!(err, RagError::Upstream { status: Some(503), .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_version() {
        let embedder = Arc::new(SwitchableEmbedder {
            failing: std::sync::atomic::AtomicBool::new(false),
        });
        let store = Arc::new(ChunkStore::in_memory());
        let vectors = Arc::new(EmbeddingVectorStore::in_memory(embedder.clone()));
        let ingestor = Ingestor::new(store.clone(), vectors.clone(), ReingestPolicy::Replace);

        ingestor.ingest("a.md", Some("A"), &sections("first version")).await.unwrap();
        embedder.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = ingestor.ingest("a.md", Some("A"), &sections("second version")).await.unwrap_err();
        assert!(matches!(err, RagError::Upstream { status: Some(503), .. }));

        let chunks = store.doc_chunks("A");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "first version");
        assert_eq!(vectors.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_store_and_vectors() {
        let (ingestor, store, vectors) = ingestor(ReingestPolicy::Append);
        ingestor.ingest("a.md", Some("A"), &sections("alpha")).await.unwrap();
        ingestor.ingest("b.md", Some("B"), &sections("beta")).await.unwrap();

        assert_eq!(ingestor.delete("A").await.unwrap(), 1);
        assert!(!store.contains_doc("A"));
        assert!(vectors.similarity_search("alpha", 5, Some("A")).await.unwrap().is_empty());
        assert_eq!(vectors.entry_count(), 1);

        assert!(matches!(ingestor.delete("A").await, Err(RagError::DocumentNotFound(_))));
    }
}
