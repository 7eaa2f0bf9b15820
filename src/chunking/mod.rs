//! Document chunking: format gate, size bands, boundary-aware splitting and
//! chunk stamping.

pub mod splitter;

use std::path::Path;

use crate::error::{RagError, Result};
use crate::models::{Chunk, DocumentSection};
use splitter::TextSplitter;

/// Joins loader sections into the document's linear text.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Document types the loaders can hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Markdown,
    PlainText,
    Word,
}

impl DocumentFormat {
    /// Detect the format from a file name's extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "md" | "markdown" => Ok(DocumentFormat::Markdown),
            "txt" | "text" => Ok(DocumentFormat::PlainText),
            "doc" | "docx" => Ok(DocumentFormat::Word),
            "" => Err(RagError::UnsupportedFormat(format!(
                "{name} (no extension; supported: pdf, md, txt, doc, docx)"
            ))),
            other => Err(RagError::UnsupportedFormat(format!(
                ".{other} (supported: pdf, md, txt, doc, docx)"
            ))),
        }
    }
}

/// Chunk size / overlap chosen from the total input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkPlan {
    /// Very large documents get bigger chunks to bound index size; small ones
    /// keep fine retrieval granularity.
    pub fn for_total_chars(total_chars: usize) -> Self {
        if total_chars > 100_000 {
            Self {
                chunk_size: 2000,
                overlap: 400,
            }
        } else if total_chars > 50_000 {
            Self {
                chunk_size: 1500,
                overlap: 300,
            }
        } else {
            Self {
                chunk_size: 1000,
                overlap: 200,
            }
        }
    }

    pub fn splitter(&self) -> TextSplitter {
        TextSplitter::new(self.chunk_size, self.overlap)
    }
}

/// Split one document's sections into stamped chunks.
///
/// Blank sections are skipped; the rest are joined with [`SECTION_SEPARATOR`]
/// and split as one linear text. Each chunk's locator is the section its first
/// character falls in.
pub fn chunk_document(doc_id: &str, sections: &[DocumentSection]) -> (ChunkPlan, Vec<Chunk>) {
    let sections: Vec<&DocumentSection> = sections
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    let total_chars: usize = sections.iter().map(|s| s.text.chars().count()).sum();
    let plan = ChunkPlan::for_total_chars(total_chars);
    if sections.is_empty() {
        return (plan, Vec::new());
    }

    let sep_chars = SECTION_SEPARATOR.chars().count();
    let mut linear = String::new();
    let mut section_starts = Vec::with_capacity(sections.len());
    let mut cursor = 0usize;
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            linear.push_str(SECTION_SEPARATOR);
            cursor += sep_chars;
        }
        section_starts.push(cursor);
        linear.push_str(&section.text);
        cursor += section.text.chars().count();
    }

    let splitter = plan.splitter();
    let ranges = splitter.split_ranges(&linear);
    let texts = splitter.split(&linear);
    let total_chunks = texts.len();

    let chunks = ranges
        .into_iter()
        .zip(texts)
        .enumerate()
        .map(|(chunk_index, (range, text))| {
            let section = section_starts
                .partition_point(|&start| start <= range.start)
                .saturating_sub(1);
            Chunk {
                doc_id: doc_id.to_string(),
                chunk_index,
                total_chunks,
                text,
                source_locator: sections[section].locator.clone(),
            }
        })
        .collect();

    (plan, chunks)
}
