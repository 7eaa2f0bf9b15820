use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a chunk across indexes: `(doc_id, chunk_index)`.
pub type ChunkKey = (String, usize);

/// A single indexed unit of document text. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    /// Zero-based, contiguous within a document; defines document order.
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    /// Opaque reference to the originating file / section.
    pub source_locator: String,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        (self.doc_id.clone(), self.chunk_index)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One `(text, locator)` pair handed over by a file-format loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSection {
    pub text: String,
    pub locator: String,
}

/// Source reference attached to an answer stream before any text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based marker used in the prompt (`[index]`).
    pub index: usize,
    pub doc_id: String,
    pub chunk_index: usize,
    pub preview: String,
    pub source_locator: String,
}

/// A single chat turn (user, assistant or system)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Summary of an ingestion call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub chunks_created: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Per-document listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub doc_id: String,
    pub chunk_count: usize,
    pub total_chars: usize,
}

/// Ingest request: sections from a loader plus the originating file name.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub file_name: String,
    pub doc_id: Option<String>,
    pub sections: Vec<DocumentSection>,
}

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub doc_id: Option<String>,
    /// Skip the lexical index and rank by vector similarity alone.
    #[serde(default)]
    pub vector_only: bool,
}

fn default_limit() -> usize {
    8
}

/// One fused result as returned by the search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub chunk_index: usize,
    pub source_locator: String,
    pub text: String,
    pub score: f64,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub lexical_hits: usize,
    pub vector_hits: usize,
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Option<Vec<ChatMessage>>,
    /// Restrict retrieval to a single document.
    pub doc_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Brief,
    #[default]
    Detailed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRequest {
    pub doc_id: String,
    #[serde(default, rename = "type")]
    pub kind: SummaryKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonRequest {
    pub doc_ids: Vec<String>,
    pub aspects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingInstruction {
    Polish,
    Expand,
    Continue,
    FixGrammar,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WritingRequest {
    pub text: String,
    pub instruction: WritingInstruction,
    pub context: Option<String>,
}

/// Lexical index status
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub lexical_built: bool,
    pub lexical_indexed_chunks: usize,
    pub lexical_built_at: Option<DateTime<Utc>>,
}
