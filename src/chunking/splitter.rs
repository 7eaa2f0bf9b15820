//! Recursive boundary-aware splitter with a fixed character overlap.
//!
//! Tiered strategy, highest priority first:
//! 1. Markdown headings (`## `, `### `, `# `), split before the marker
//! 2. Paragraph breaks, then line breaks
//! 3. Sentence terminators (`。`, `.`)
//! 4. Spaces
//! 5. Last resort: cut at the size bound
//!
//! Chunk `i + 1` always starts exactly `overlap` characters before chunk `i`
//! ends, so dropping the first `overlap` characters of every chunk but the
//! first and concatenating gives back the input.

use std::ops::Range;

#[derive(Debug, Clone, Copy)]
enum Boundary {
    /// Split before the separator; it opens the next chunk.
    Before(&'static str),
    /// Split after the separator; it closes the current chunk.
    After(&'static str),
}

const BOUNDARIES: &[Boundary] = &[
    Boundary::Before("\n## "),
    Boundary::Before("\n### "),
    Boundary::Before("\n# "),
    Boundary::After("\n\n"),
    Boundary::After("\n"),
    Boundary::After("。"),
    Boundary::After("."),
    Boundary::After(" "),
];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// `overlap` is clamped below `chunk_size` so every step makes progress.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into character ranges.
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let offsets = char_offsets(text);
        let n = offsets.len() - 1;
        if n == 0 {
            return Vec::new();
        }

        let mut ranges = Vec::new();
        let mut start = 0usize;
        loop {
            let limit = start + self.chunk_size;
            if limit >= n {
                ranges.push(start..n);
                break;
            }
            let end = self.find_split(text, &offsets, start, limit);
            ranges.push(start..end);
            start = end - self.overlap;
        }
        ranges
    }

    /// Split `text` into owned chunk strings.
    pub fn split(&self, text: &str) -> Vec<String> {
        let offsets = char_offsets(text);
        self.split_ranges(text)
            .into_iter()
            .map(|r| text[offsets[r.start]..offsets[r.end]].to_string())
            .collect()
    }

    /// Smallest advance a boundary split must make past the overlap. A
    /// boundary closer than this is skipped in favour of a lower-priority one.
    fn min_step(&self) -> usize {
        ((self.chunk_size - self.overlap) / 4).max(1)
    }

    /// Best end position in `[start + overlap + min_step, limit]`.
    fn find_split(&self, text: &str, offsets: &[usize], start: usize, limit: usize) -> usize {
        let window_start = offsets[start];
        let window = &text[window_start..offsets[limit]];
        let min_end = start + self.overlap + self.min_step();

        for boundary in BOUNDARIES {
            let (sep, before) = match boundary {
                Boundary::Before(s) => (*s, true),
                Boundary::After(s) => (*s, false),
            };
            // Last occurrence gives the largest chunk; earlier ones are smaller still.
            let Some((pos, matched)) = window.rmatch_indices(sep).next() else {
                continue;
            };
            let byte_end = if before { pos } else { pos + matched.len() };
            let end = char_index(offsets, window_start + byte_end);
            if end >= min_end {
                return end;
            }
        }

        limit
    }
}

/// Byte offset of every char plus a trailing `text.len()`.
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

fn char_index(offsets: &[usize], byte: usize) -> usize {
    match offsets.binary_search(&byte) {
        Ok(i) => i,
        Err(i) => i,
    }
}
