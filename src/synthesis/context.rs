use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::models::{ChatMessage, Citation};
use crate::search::hybrid::FusedResult;

/// Characters of chunk text shown in a citation preview.
pub const PREVIEW_CHARS: usize = 150;
pub const MAX_HISTORY_TURNS: usize = 10;
const MAX_MESSAGE_CHARS: usize = 4_000;

/// Control tokens that would let document or user text forge chat turns.
const SPECIAL_TOKENS: [&str; 5] = [
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|system|>",
    "<|assistant|>",
];

/// Bracketed reference markers already present in document text: `[4]`,
/// `[3, 7]`, `[12-15]`.
static REFERENCE_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(\d+(?:\s*[,\-–]\s*\d+)*)\]").ok());

const NO_CONTEXT_SYSTEM_PROMPT: &str = "You are a research assistant for the user's document library.\n\
     No document passages were retrieved for this question. Answer from general knowledge, \
     say clearly that no supporting material was found in the library, and do not use citation markers.";

/// Numbered context for one answer.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub system_prompt: String,
    pub question: String,
    pub citations: Vec<Citation>,
}

/// Render fused results as blocks `[1]`..`[N]` in fusion order, plus the
/// matching citation list. `None` when there is nothing to cite.
pub fn build_prompt(query: &str, results: &[FusedResult]) -> Option<PromptContext> {
    if results.is_empty() {
        return None;
    }
    let n = results.len();

    let mut prompt = String::from(
        "You are a research assistant answering questions about the user's documents.\n\
         Numbered passages retrieved from the library follow.\n\n",
    );
    let mut citations = Vec::with_capacity(n);

    for (i, result) in results.iter().enumerate() {
        let index = i + 1;
        let chunk = &result.chunk;
        // Writing to a String cannot fail.
        let _ = write!(
            prompt,
            "[{index}] (document: {}, part {}/{})\n{}\n\n",
            chunk.doc_id,
            chunk.chunk_index + 1,
            chunk.total_chunks,
            neutralize_reference_markers(&sanitize_for_prompt(&chunk.text))
        );
        citations.push(Citation {
            index,
            doc_id: chunk.doc_id.clone(),
            chunk_index: chunk.chunk_index,
            preview: preview(&chunk.text),
            source_locator: chunk.source_locator.clone(),
        });
    }

    let _ = write!(
        prompt,
        "Rules:\n\
         - Cite a passage with its marker only when it genuinely supports your statement.\n\
         - Valid markers are 1 through {n}. Never invent a marker outside that range.\n\
         - If none of the passages is relevant, say so plainly instead of forcing a citation.\n\
         - Answer in the language of the question."
    );

    Some(PromptContext {
        system_prompt: prompt,
        question: sanitize_for_prompt(&truncate_chars(query.trim(), MAX_MESSAGE_CHARS)),
        citations,
    })
}

/// System prompt, history, then the question.
pub fn build_messages(context: Option<&PromptContext>, history: &[ChatMessage], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    match context {
        Some(ctx) => {
            messages.push(ChatMessage::system(ctx.system_prompt.clone()));
            messages.extend(history.iter().cloned());
            messages.push(ChatMessage::user(ctx.question.clone()));
        }
        None => {
            messages.push(ChatMessage::system(NO_CONTEXT_SYSTEM_PROMPT));
            messages.extend(history.iter().cloned());
            messages.push(ChatMessage::user(sanitize_for_prompt(&truncate_chars(
                query.trim(),
                MAX_MESSAGE_CHARS,
            ))));
        }
    }
    messages
}

/// Keep the last [`MAX_HISTORY_TURNS`] user/assistant turns, sanitized.
pub fn sanitize_history(history: Option<Vec<ChatMessage>>) -> Vec<ChatMessage> {
    let turns: Vec<ChatMessage> = history
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| ChatMessage {
            role: m.role,
            content: sanitize_for_prompt(&truncate_chars(&m.content, MAX_MESSAGE_CHARS)),
        })
        .collect();
    let skip = turns.len().saturating_sub(MAX_HISTORY_TURNS);
    turns.into_iter().skip(skip).collect()
}

pub fn sanitize_for_prompt(text: &str) -> String {
    SPECIAL_TOKENS
        .iter()
        .fold(text.to_string(), |acc, token| acc.replace(token, ""))
}

/// Rewrite bracketed numbers in passage text to `(n)` so the only `[n]`
/// markers a prompt contains are its own passage numbers.
pub fn neutralize_reference_markers(text: &str) -> String {
    match REFERENCE_MARKER.as_ref() {
        Some(re) => re.replace_all(text, "($1)").into_owned(),
        None => text.to_string(),
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

fn preview(text: &str) -> String {
    let cut = truncate_chars(text, PREVIEW_CHARS);
    if cut.len() < text.len() {
        format!("{cut}…")
    } else {
        cut
    }
}
