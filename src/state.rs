use std::sync::Arc;

use crate::config::Config;
use crate::ingest::Ingestor;
use crate::llm::chat_stream::{ChatClient, Generator};
use crate::llm::embeddings::HttpEmbedder;
use crate::search::bm25::LexicalIndex;
use crate::search::hybrid::HybridRetriever;
use crate::search::vector::{EmbeddingVectorStore, VectorIndex};
use crate::store::ChunkStore;
use crate::synthesis::Synthesizer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<ChunkStore>,
    pub lexical: Arc<LexicalIndex>,
    pub retriever: Arc<HybridRetriever>,
    pub ingestor: Arc<Ingestor>,
    pub synthesizer: Synthesizer,
    pub stream_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    /// Open the on-disk stores and connect the HTTP-backed services.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let http_client = config.llm.http_client()?;
        let embedder = Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let store = Arc::new(ChunkStore::open_or_create(&config.chunk_store_path())?);
        let vectors = Arc::new(EmbeddingVectorStore::open_or_create(&config.vector_dir(), embedder)?);
        let generator = Arc::new(ChatClient::new(http_client, config.llm.clone()));

        tracing::info!(
            "Loaded {} chunks ({} vectors) from {}",
            store.len(),
            vectors.entry_count(),
            config.data_dir.display()
        );

        Ok(Self::with_services(config, store, vectors, generator))
    }

    /// Wire state around already-built services.
    pub fn with_services(
        config: Config,
        store: Arc<ChunkStore>,
        vectors: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let lexical = Arc::new(LexicalIndex::new(store.clone()));
        let retriever = Arc::new(HybridRetriever::new(lexical.clone(), vectors.clone()));
        let ingestor = Arc::new(Ingestor::new(store.clone(), vectors, config.reingest));
        let synthesizer = Synthesizer::new(generator, store.clone(), retriever.clone(), config.retrieval_k);
        let stream_semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_streams));

        Self {
            config,
            store,
            lexical,
            retriever,
            ingestor,
            synthesizer,
            stream_semaphore,
        }
    }
}
