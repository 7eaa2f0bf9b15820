use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use doc_rag::api;
use doc_rag::config::Config;
use doc_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "LLM provider: {} ({}), chat model {}, embedding model {}",
        config.llm.provider,
        config.llm.base_url,
        config.llm.chat_model,
        config.llm.embedding_model
    );
    tracing::info!(
        "Retrieval k={}, re-ingest policy {:?}, {} concurrent streams",
        config.retrieval_k,
        config.reingest,
        config.max_concurrent_streams
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/documents", get(api::documents::list_documents))
        .route("/api/documents", post(api::documents::ingest))
        .route("/api/documents/{doc_id}", delete(api::documents::delete_document))
        .route("/api/index/rebuild", post(api::index::rebuild))
        .route("/api/index/stats", get(api::index::stats))
        .route("/api/search", post(api::search::search))
        .route("/api/chat", post(api::chat::chat))
        .route("/api/analyze/summary", post(api::analysis::summary))
        .route("/api/analyze/comparison", post(api::analysis::comparison))
        .route("/api/write", post(api::writing::write))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
