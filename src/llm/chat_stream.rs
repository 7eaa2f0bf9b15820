use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::models::ChatMessage;

/// Incremental content deltas from a streaming completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Text-completion service: streaming and one-shot variants.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start a streaming completion. Errors before the first token (connect,
    /// non-2xx) are returned here; later ones arrive in the stream.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;

    /// Run a completion to the end and return the whole message.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;
}

/// Chat completions from Ollama or an OpenAI-compatible endpoint.
///
/// The `reqwest::Client` is expected to carry the connect / read timeouts
/// (see [`LlmConfig::http_client`]).
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> Result<String> {
        match self.config.provider.as_str() {
            "ollama" => Ok(format!("{}/api/chat", self.config.base_url)),
            "openai" => Ok(format!("{}/v1/chat/completions", self.config.base_url)),
            other => Err(RagError::InvalidRequest(format!(
                "unsupported LLM provider for chat: {other}"
            ))),
        }
    }

    async fn send(&self, messages: Vec<ChatMessage>, stream: bool) -> Result<reqwest::Response> {
        let url = self.endpoint()?;
        let req = ChatRequestBody {
            model: self.config.chat_model.clone(),
            messages: messages
                .into_iter()
                .map(|m| StreamMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            stream,
        };

        let mut builder = self.client.post(&url).json(&req);
        if self.config.provider == "openai" {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.as_deref().unwrap_or("")),
            );
        }

        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::upstream_status(status, body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let resp = self.send(messages, true).await?;
        let parse: fn(&str) -> Option<Result<Line>> = if self.config.provider == "ollama" {
            parse_ollama_line
        } else {
            parse_openai_line
        };

        let stream = stream_lines(resp.bytes_stream())
            .filter_map(move |line_result| async move {
                match line_result {
                    Ok(line) => parse(&line),
                    Err(e) => Some(Err(e)),
                }
            })
            // The explicit end marker closes the stream even if the body stays open.
            .take_while(|item| futures_util::future::ready(!matches!(item, Ok(Line::Done))))
            .map(|item| {
                item.map(|line| match line {
                    Line::Delta(content) => content,
                    Line::Done => String::new(),
                })
            });

        Ok(Box::pin(stream))
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let resp = self.send(messages, false).await?;
        let content = if self.config.provider == "ollama" {
            let body: OllamaChatResponse = resp.json().await?;
            body.message.content
        } else {
            let body: OpenAiChatResponse = resp.json().await?;
            body.choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .unwrap_or_default()
        };
        Ok(content)
    }
}

#[derive(Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

/// One parsed upstream line.
#[derive(Debug, PartialEq)]
enum Line {
    Delta(String),
    Done,
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Deserialize)]
struct OllamaStreamChunk {
    message: StreamMessage,
    done: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: StreamMessage,
}

/// Parse a single Ollama streaming line. `None` means skip (blank line or
/// empty delta).
fn parse_ollama_line(line: &str) -> Option<Result<Line>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => {
            if chunk.done {
                return Some(Ok(Line::Done));
            }
            let content = chunk.message.content;
            if content.is_empty() {
                return None;
            }
            Some(Ok(Line::Delta(content)))
        }
        Err(e) => Some(Err(RagError::Upstream {
            status: None,
            message: format!("malformed Ollama stream chunk: {e}"),
        })),
    }
}

// ─── OpenAI ──────────────────────────────────────────────

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: StreamMessage,
}

/// Parse a single OpenAI SSE line. `None` means skip (blank, non-data,
/// role-only chunks).
fn parse_openai_line(line: &str) -> Option<Result<Line>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return Some(Ok(Line::Done));
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(Line::Delta(content)))
        }
        Err(e) => Some(Err(RagError::Upstream {
            status: None,
            message: format!("malformed OpenAI stream chunk: {e}"),
        })),
    }
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
///
/// Bytes are buffered until a newline so multi-byte characters split across
/// network reads are decoded intact.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let rest = buffer.split_off(newline_pos + 1);
                    let line = String::from_utf8_lossy(&buffer[..newline_pos]).into_owned();
                    buffer = rest;
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((Err(RagError::from(e)), (stream, buffer)));
                    }
                    None => {
                        if !buffer.iter().all(u8::is_ascii_whitespace) {
                            let remaining = String::from_utf8_lossy(&std::mem::take(&mut buffer)).into_owned();
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
