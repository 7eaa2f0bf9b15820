//! # doc-rag
//!
//! Question answering and long-document synthesis over an ingested document
//! library. Retrieval fuses BM25 full-text search with vector semantic search;
//! every generated answer is streamed to the client as it arrives.
//!
//! ## Architecture
//!
//! ```text
//!   loader sections (text, locator)
//!                │
//!                ▼
//!      ┌───────────────────┐
//!      │     Chunker       │  size band by document length
//!      │ 2000/400 >100k    │  heading → paragraph → line →
//!      │ 1500/300 >50k     │  sentence → space → char
//!      │ 1000/200 else     │
//!      └─────────┬─────────┘
//!                │ chunks (doc_id, chunk_index, total_chunks, locator)
//!        ┌───────┴────────┐
//!        ▼                ▼
//!  ┌────────────┐   ┌──────────────┐
//!  │ ChunkStore │   │ Vector index │  (updated immediately)
//!  └─────┬──────┘   └──────┬───────┘
//!        │ explicit rebuild │
//!        ▼                  │
//!  ┌────────────┐           │
//!  │ BM25 index │ (stale    │
//!  │ jieba +    │  until    │
//!  │ tantivy    │  rebuilt) │
//!  └─────┬──────┘           │
//!        │  2k candidates   │ 2k candidates
//!        └────────┬─────────┘
//!                 ▼
//!      ┌───────────────────┐
//!      │ RRF fusion (k=60) │  dedup by (doc_id, chunk_index)
//!      └─────────┬─────────┘
//!                ▼
//!      ┌───────────────────┐
//!      │ Context assembler │  [1]..[N] + citations
//!      └─────────┬─────────┘
//!                ▼
//!      ┌───────────────────┐
//!      │   Synthesizer     │  answer │ direct / map-reduce summary
//!      │                   │  comparison table + analysis │ writing
//!      └─────────┬─────────┘
//!                ▼
//!   structured event? → text deltas → Error? → [DONE]
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration (server, LLM, timeouts, retrieval, re-ingest policy)
//! - [`error`] - `RagError` taxonomy shared by every stage
//! - [`models`] - Chunks, citations, chat turns and request/response types
//! - [`chunking`] - Format gate, size bands and the boundary-aware splitter
//! - [`store`] - Chunk registry with JSON persistence
//! - [`search::tokenizer`] - jieba segmentation registered as a tantivy tokenizer
//! - [`search::bm25`] - Lazily built, explicitly rebuilt BM25 index
//! - [`search::vector`] - Vector index boundary plus an in-memory cosine implementation
//! - [`search::hybrid`] - Reciprocal Rank Fusion and single-source fallbacks
//! - [`llm::embeddings`] - Batch embeddings via Ollama or OpenAI-compatible APIs
//! - [`llm::chat_stream`] - Streaming and one-shot chat completion
//! - [`synthesis`] - Event streams for answers, summaries, comparisons and writing help
//! - [`ingest`] - Ingestion, re-ingestion and deletion
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
pub mod store;
pub mod synthesis;
