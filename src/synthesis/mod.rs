//! Answer, summary, comparison and writing pipelines.
//!
//! Every pipeline runs in its own task and reports through a bounded channel
//! as a finite sequence of [`StreamEvent`]s. Dropping the returned stream
//! (client disconnect) stops the task at its next step and drops the upstream
//! response body with it.

pub mod compare;
pub mod context;
pub mod events;
pub mod summary;
pub mod writing;

use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{RagError, Result};
use crate::llm::chat_stream::{Generator, TokenStream};
use crate::models::{ChatMessage, ChatRequest, SummaryKind, WritingRequest};
use crate::search::hybrid::{HybridRetriever, RetrievalMode};
use crate::store::ChunkStore;

use compare::{analysis_prompt, parse_table, resolve_aspects, table_prompt, ComparedDocument};
use context::{build_messages, build_prompt, sanitize_history};
use events::StreamEvent;
use summary::{
    direct_prompt, group_sections, join_chunks, labeled_summary, reduce_prompt, section_placeholder,
    section_prompt, select_strategy, total_chars, Section, SummaryStrategy, SECTION_BUDGET,
};

pub type EventStream = ReceiverStream<StreamEvent>;

const EVENT_BUFFER: usize = 64;

/// Why a pipeline stopped early.
enum Halt {
    /// The receiver is gone; nothing more can be delivered.
    Cancelled,
    Failed(RagError),
}

impl From<RagError> for Halt {
    fn from(e: RagError) -> Self {
        Halt::Failed(e)
    }
}

#[derive(Clone)]
struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
}

impl Emitter {
    async fn emit(&self, event: StreamEvent) -> Result<(), Halt> {
        self.tx.send(event).await.map_err(|_| Halt::Cancelled)
    }

    /// Await `fut` unless the receiver goes away first.
    async fn guard<T>(&self, fut: impl Future<Output = T>) -> Result<T, Halt> {
        tokio::select! {
            _ = self.tx.closed() => Err(Halt::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Pass upstream tokens through as text events, unbuffered.
    async fn forward(&self, mut tokens: TokenStream) -> Result<(), Halt> {
        while let Some(token) = self.guard(tokens.next()).await? {
            self.emit(StreamEvent::Text(token?)).await?;
        }
        Ok(())
    }
}

/// Run `pipeline` in a task and close its stream with `Error` (if it failed)
/// and `Done`.
fn spawn_stream<F, Fut>(label: &'static str, pipeline: F) -> EventStream
where
    F: FnOnce(Emitter) -> Fut,
    Fut: Future<Output = Result<(), Halt>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let out = Emitter { tx };
    let run = pipeline(out.clone());

    tokio::spawn(async move {
        let closing = match run.await {
            Ok(()) => None,
            Err(Halt::Cancelled) => {
                tracing::info!("{label} stream cancelled by client");
                return;
            }
            Err(Halt::Failed(e)) if !e.is_terminal() => Some(StreamEvent::Warning(e.to_string())),
            Err(Halt::Failed(e)) => {
                tracing::warn!("{label} stream failed: {e}");
                Some(StreamEvent::Error(e.to_string()))
            }
        };
        if let Some(event) = closing {
            if out.emit(event).await.is_err() {
                return;
            }
        }
        let _ = out.emit(StreamEvent::Done).await;
    });

    ReceiverStream::new(rx)
}

/// Orchestrates retrieval and generation into event streams.
#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn Generator>,
    store: Arc<ChunkStore>,
    retriever: Arc<HybridRetriever>,
    retrieval_k: usize,
}

impl Synthesizer {
    pub fn new(
        generator: Arc<dyn Generator>,
        store: Arc<ChunkStore>,
        retriever: Arc<HybridRetriever>,
        retrieval_k: usize,
    ) -> Self {
        Self {
            generator,
            store,
            retriever,
            retrieval_k,
        }
    }

    /// Retrieval-augmented answer: citations first, then the streamed reply.
    pub fn answer(&self, req: ChatRequest) -> Result<EventStream> {
        let message = req.message.trim().to_string();
        if message.is_empty() {
            return Err(RagError::InvalidRequest("message is required".to_string()));
        }
        let history = sanitize_history(req.history);
        let doc_filter = req.doc_id;
        let this = self.clone();

        Ok(spawn_stream("answer", move |out| async move {
            let retrieval = out
                .guard(this.retriever.fuse(&message, this.retrieval_k, doc_filter.as_deref()))
                .await?;
            if retrieval.mode == RetrievalMode::Unavailable {
                out.emit(StreamEvent::Warning(
                    "document retrieval is unavailable; answering without document context".to_string(),
                ))
                .await?;
            }

            let context = build_prompt(&message, &retrieval.results);
            if let Some(ctx) = &context {
                out.emit(StreamEvent::Citations(ctx.citations.clone())).await?;
            }
            let messages = build_messages(context.as_ref(), &history, &message);

            let tokens = out.guard(this.generator.stream(messages)).await??;
            out.forward(tokens).await
        }))
    }

    /// Summary of one stored document, direct or map-reduce by size.
    pub fn summarize(&self, doc_id: &str, kind: SummaryKind) -> Result<EventStream> {
        let chunks = self.store.doc_chunks(doc_id);
        if chunks.is_empty() {
            return Err(RagError::DocumentNotFound(doc_id.to_string()));
        }
        let total = total_chars(&chunks);
        let strategy = select_strategy(total);
        tracing::info!(
            "Summarizing {doc_id}: {} chunks, {total} chars, strategy {strategy:?}",
            chunks.len()
        );
        let generator = self.generator.clone();

        Ok(spawn_stream("summary", move |out| async move {
            let prompt = match strategy {
                SummaryStrategy::Direct => direct_prompt(kind, &join_chunks(&chunks)),
                SummaryStrategy::MapReduce => {
                    let sections = group_sections(&chunks, SECTION_BUDGET);
                    let summaries = map_sections(generator.as_ref(), &sections, &out).await?;
                    reduce_prompt(kind, &summaries)
                }
            };
            let tokens = out
                .guard(generator.stream(vec![ChatMessage::user(prompt)]))
                .await??;
            out.forward(tokens).await
        }))
    }

    /// Comparison table event, then a streamed comparative analysis.
    pub fn compare(&self, doc_ids: Vec<String>, aspects: Option<Vec<String>>) -> Result<EventStream> {
        let mut ids: Vec<String> = Vec::with_capacity(doc_ids.len());
        for id in doc_ids {
            let id = id.trim().to_string();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.len() < 2 {
            return Err(RagError::InvalidRequest(
                "comparison needs at least two distinct documents".to_string(),
            ));
        }

        let mut docs = Vec::with_capacity(ids.len());
        for id in &ids {
            let chunks = self.store.doc_chunks(id);
            if chunks.is_empty() {
                return Err(RagError::DocumentNotFound(id.clone()));
            }
            docs.push(ComparedDocument::new(id.clone(), &join_chunks(&chunks)));
        }
        let aspects = resolve_aspects(aspects);
        let generator = self.generator.clone();

        Ok(spawn_stream("comparison", move |out| async move {
            let reply = out
                .guard(generator.complete(vec![ChatMessage::user(table_prompt(&docs, &aspects))]))
                .await?;
            match reply.and_then(|r| parse_table(&r, &ids, &aspects)) {
                Ok(table) => out.emit(StreamEvent::ComparisonTable(table)).await?,
                Err(e) => {
                    tracing::warn!("Comparison table unavailable, continuing with analysis: {e}");
                    out.emit(StreamEvent::Warning(format!("comparison table unavailable: {e}")))
                        .await?;
                }
            }

            let tokens = out
                .guard(generator.stream(vec![ChatMessage::user(analysis_prompt(&docs, &aspects))]))
                .await??;
            out.forward(tokens).await
        }))
    }

    /// Rewrite or continue a text.
    pub fn write(&self, req: WritingRequest) -> Result<EventStream> {
        if req.text.trim().is_empty() {
            return Err(RagError::InvalidRequest("text is required".to_string()));
        }
        let messages = writing::build_messages(&req);
        let generator = self.generator.clone();

        Ok(spawn_stream("writing", move |out| async move {
            let tokens = out.guard(generator.stream(messages)).await??;
            out.forward(tokens).await
        }))
    }
}

/// Map step: one non-streaming summary per section. A failed section becomes
/// a placeholder and a warning; progress is reported after every section.
async fn map_sections(generator: &dyn Generator, sections: &[Section], out: &Emitter) -> Result<Vec<String>, Halt> {
    let total = sections.len();
    let mut summaries = Vec::with_capacity(total);

    for section in sections {
        let prompt = section_prompt(section, total);
        match out.guard(generator.complete(vec![ChatMessage::user(prompt)])).await? {
            Ok(summary) => summaries.push(labeled_summary(section.number, &summary)),
            Err(e) => {
                tracing::warn!("Section {}/{total} summary failed, using placeholder: {e}", section.number);
                out.emit(StreamEvent::Warning(format!(
                    "section {} could not be summarized: {e}",
                    section.number
                )))
                .await?;
                summaries.push(section_placeholder(section.number, &e.to_string()));
            }
        }
        out.emit(StreamEvent::Progress {
            section: section.number,
            total,
        })
        .await?;
    }

    Ok(summaries)
}
