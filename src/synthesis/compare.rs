use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::error::{RagError, Result};
use crate::synthesis::context::truncate_chars;

/// Characters of each document given to the comparison prompts.
pub const COMPARISON_DOC_LIMIT: usize = 15_000;

pub const DEFAULT_ASPECTS: [&str; 5] = [
    "Research question",
    "Methodology",
    "Data",
    "Key findings",
    "Limitations",
];

/// Dimensions × documents, one short cell per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub dimensions: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub doc_id: String,
    pub values: Vec<String>,
}

/// A document's text as handed to the comparison prompts.
#[derive(Debug, Clone)]
pub struct ComparedDocument {
    pub doc_id: String,
    pub text: String,
}

impl ComparedDocument {
    pub fn new(doc_id: impl Into<String>, full_text: &str) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: truncate_chars(full_text, COMPARISON_DOC_LIMIT),
        }
    }
}

/// Caller aspects with blanks removed, or the defaults.
pub fn resolve_aspects(aspects: Option<Vec<String>>) -> Vec<String> {
    let cleaned: Vec<String> = aspects
        .unwrap_or_default()
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if cleaned.is_empty() {
        DEFAULT_ASPECTS.iter().map(|a| a.to_string()).collect()
    } else {
        cleaned
    }
}

fn documents_block(docs: &[ComparedDocument]) -> String {
    let mut block = String::new();
    for doc in docs {
        let _ = write!(block, "=== Document \"{}\" ===\n{}\n\n", doc.doc_id, doc.text);
    }
    block
}

pub fn table_prompt(docs: &[ComparedDocument], aspects: &[String]) -> String {
    let dims = serde_json::to_string(aspects).unwrap_or_else(|_| "[]".to_string());
    let example_row = docs
        .first()
        .map(|d| d.doc_id.as_str())
        .unwrap_or("doc");
    format!(
        "Compare the documents below along these dimensions: {dims}.\n\
         Reply with ONLY a JSON object of this exact shape and nothing else:\n\
         {{\"dimensions\": {dims}, \"rows\": [{{\"doc_id\": \"{example_row}\", \"values\": [\"one short value per dimension\"]}}]}}\n\
         Give one row per document, in the order the documents appear, using each document's id. \
         Keep every value under 20 words; write \"not stated\" when a document says nothing on a dimension.\n\n{}",
        documents_block(docs)
    )
}

pub fn analysis_prompt(docs: &[ComparedDocument], aspects: &[String]) -> String {
    format!(
        "Write a comparative analysis of the documents below, focusing on: {}.\n\
         Discuss where they agree, where they differ, and the strengths and weaknesses of each. \
         Refer to documents by their ids and finish with a short overall assessment.\n\n{}",
        aspects.join(", "),
        documents_block(docs)
    )
}

/// The first balanced `{ … }` block in `text`. Braces inside JSON strings
/// (with escapes) are ignored.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the table reply. Rows are matched to the requested documents and
/// padded / cut to the dimension count.
pub fn parse_table(response: &str, doc_ids: &[String], aspects: &[String]) -> Result<ComparisonTable> {
    let block = extract_json_block(response)
        .ok_or_else(|| RagError::ParseFailure("no JSON object in comparison reply".to_string()))?;
    let mut table: ComparisonTable = serde_json::from_str(block)
        .map_err(|e| RagError::ParseFailure(format!("comparison table is not valid: {e}")))?;

    if table.dimensions.is_empty() {
        table.dimensions = aspects.to_vec();
    }
    table.rows.retain(|row| doc_ids.contains(&row.doc_id));
    if table.rows.is_empty() {
        return Err(RagError::ParseFailure(
            "comparison table has no rows for the requested documents".to_string(),
        ));
    }

    let width = table.dimensions.len();
    for row in &mut table.rows {
        row.values.resize(width, String::new());
    }
    Ok(table)
}
