//! Retrieval: BM25 over tantivy, vector similarity, and rank fusion.

pub mod bm25;
pub mod hybrid;
pub mod tokenizer;
pub mod vector;
