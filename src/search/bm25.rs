use chrono::{DateTime, Utc};
use jieba_rs::Jieba;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::{RagError, Result};
use crate::models::Chunk;
use crate::search::tokenizer::{tokenize, JiebaTokenizer, TOKENIZER_NAME};
use crate::store::ChunkStore;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 index over the whole chunk corpus, built on an in-RAM tantivy index.
///
/// The index is a snapshot: it is built lazily on the first query and only
/// refreshed by an explicit [`LexicalIndex::rebuild`]. Ingestions and deletes
/// in the [`ChunkStore`] are not visible until then.
pub struct LexicalIndex {
    store: Arc<ChunkStore>,
    jieba: Arc<Jieba>,
    built: RwLock<Option<Arc<BuiltIndex>>>,
    /// Serializes builds; queries never take it once an index exists.
    build_lock: Mutex<()>,
}

struct BuiltIndex {
    reader: IndexReader,
    f_text: Field,
    f_position: Field,
    /// Corpus in build order; `position` indexes into it.
    chunks: Vec<Chunk>,
    built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk: Chunk,
    pub score: f32,
}

impl LexicalIndex {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self::with_jieba(store, Arc::new(Jieba::new()))
    }

    /// Share an already-loaded dictionary (loading one is not free).
    pub fn with_jieba(store: Arc<ChunkStore>, jieba: Arc<Jieba>) -> Self {
        Self {
            store,
            jieba,
            built: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn is_built(&self) -> bool {
        self.built.read().is_some()
    }

    /// Number of chunks in the current snapshot (0 when unbuilt).
    pub fn indexed_len(&self) -> usize {
        self.built.read().as_ref().map_or(0, |b| b.chunks.len())
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built.read().as_ref().map(|b| b.built_at)
    }

    /// Rebuild from the full chunk store. Returns the number of chunks indexed.
    ///
    /// An empty corpus leaves the index unbuilt and reports `IndexUnavailable`.
    pub fn rebuild(&self) -> Result<usize> {
        let _guard = self.build_lock.lock();
        match self.build_snapshot() {
            Ok(built) => {
                let n = built.chunks.len();
                *self.built.write() = Some(Arc::new(built));
                Ok(n)
            }
            Err(e) => {
                *self.built.write() = None;
                Err(e)
            }
        }
    }

    /// Up to `k` chunks by BM25 score, descending; ties keep corpus order.
    pub fn query(&self, query: &str, k: usize, doc_filter: Option<&str>) -> Result<Vec<LexicalHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let built = self.ensure_built()?;

        let terms = tokenize(&self.jieba, query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| {
                let term = Term::from_field_text(built.f_text, t);
                let q: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, q)
            })
            .collect();
        let bm25_query = BooleanQuery::new(clauses);

        let searcher = built.reader.searcher();
        // A filter is applied after scoring, so score the whole corpus then.
        let fetch = if doc_filter.is_some() {
            built.chunks.len()
        } else {
            k.min(built.chunks.len())
        };
        if fetch == 0 {
            return Ok(Vec::new());
        }
        let top_docs = searcher.search(&bm25_query, &TopDocs::with_limit(fetch))?;

        let mut scored: Vec<(f32, usize)> = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let Some(position) = doc.get_first(built.f_position).and_then(|v| v.as_u64()) else {
                continue;
            };
            let position = position as usize;
            let Some(chunk) = built.chunks.get(position) else {
                continue;
            };
            if let Some(doc_id) = doc_filter {
                if chunk.doc_id != doc_id {
                    continue;
                }
            }
            scored.push((score, position));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, position)| LexicalHit {
                chunk: built.chunks[position].clone(),
                score,
            })
            .collect())
    }

    fn ensure_built(&self) -> Result<Arc<BuiltIndex>> {
        if let Some(built) = self.built.read().clone() {
            return Ok(built);
        }

        let _guard = self.build_lock.lock();
        // Another caller may have finished a build while we waited.
        if let Some(built) = self.built.read().clone() {
            return Ok(built);
        }
        let built = Arc::new(self.build_snapshot()?);
        *self.built.write() = Some(built.clone());
        Ok(built)
    }

    /// Caller must hold `build_lock`.
    fn build_snapshot(&self) -> Result<BuiltIndex> {
        let started = Instant::now();
        let chunks = self.store.snapshot();
        if chunks.is_empty() {
            return Err(RagError::IndexUnavailable("chunk corpus is empty".to_string()));
        }

        let mut schema_builder = Schema::builder();
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let f_text =
            schema_builder.add_text_field("text", TextOptions::default().set_indexing_options(indexing));
        let f_position = schema_builder.add_u64_field("position", STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index.tokenizers().register(
            TOKENIZER_NAME,
            TextAnalyzer::from(JiebaTokenizer::new(self.jieba.clone())),
        );

        // One writer thread keeps doc ids in corpus order.
        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        for (position, chunk) in chunks.iter().enumerate() {
            writer.add_document(doc!(
                f_text => chunk.text.clone(),
                f_position => position as u64,
            ))?;
        }
        writer.commit()?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        tracing::info!(
            "Lexical index built: {} chunks in {:?}",
            chunks.len(),
            started.elapsed()
        );

        Ok(BuiltIndex {
            reader,
            f_text,
            f_position,
            chunks,
            built_at: Utc::now(),
        })
    }
}
