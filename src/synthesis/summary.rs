use crate::models::{Chunk, SummaryKind};
use crate::synthesis::context::truncate_chars;

/// Documents up to this many characters are summarized in one call.
pub const DIRECT_SUMMARY_LIMIT: usize = 30_000;
/// Character budget of one map-reduce section.
pub const SECTION_BUDGET: usize = 20_000;
/// Characters of a section actually sent to the map call.
pub const SECTION_PROMPT_LIMIT: usize = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStrategy {
    Direct,
    MapReduce,
}

/// Strategy for a document of `total_chars` characters (sum over its chunks).
pub fn select_strategy(total_chars: usize) -> SummaryStrategy {
    if total_chars <= DIRECT_SUMMARY_LIMIT {
        SummaryStrategy::Direct
    } else {
        SummaryStrategy::MapReduce
    }
}

pub fn total_chars(chunks: &[Chunk]) -> usize {
    chunks.iter().map(Chunk::char_len).sum()
}

/// Contiguous run of whole chunks.
#[derive(Debug, Clone)]
pub struct Section {
    /// 1-based.
    pub number: usize,
    pub chunks: Vec<Chunk>,
    pub char_len: usize,
}

impl Section {
    pub fn text(&self) -> String {
        join_chunks(&self.chunks)
    }
}

/// Greedily pack ordered chunks into sections of at most `budget` characters.
/// A chunk is never split; one larger than the budget gets a section of its own.
pub fn group_sections(chunks: &[Chunk], budget: usize) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Vec<Chunk> = Vec::new();
    let mut current_len = 0usize;

    for chunk in chunks {
        let len = chunk.char_len();
        if !current.is_empty() && current_len + len > budget {
            sections.push(Section {
                number: sections.len() + 1,
                chunks: std::mem::take(&mut current),
                char_len: current_len,
            });
            current_len = 0;
        }
        current.push(chunk.clone());
        current_len += len;
    }
    if !current.is_empty() {
        sections.push(Section {
            number: sections.len() + 1,
            chunks: current,
            char_len: current_len,
        });
    }
    sections
}

pub fn join_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn kind_instruction(kind: SummaryKind) -> &'static str {
    match kind {
        SummaryKind::Brief => {
            "Write a brief summary of three to five sentences covering the central topic and the main conclusion."
        }
        SummaryKind::Detailed => {
            "Write a detailed, well-structured summary: the central topic, the main arguments or methods, \
             the key findings or data, and the conclusions. Use short headings where they help."
        }
    }
}

pub fn direct_prompt(kind: SummaryKind, text: &str) -> String {
    format!(
        "{}\n\nDocument:\n{text}\n\nSummary:",
        kind_instruction(kind)
    )
}

/// Map-step prompt, labeled with its section number and capped at
/// [`SECTION_PROMPT_LIMIT`] characters of section text.
pub fn section_prompt(section: &Section, total_sections: usize) -> String {
    let text = truncate_chars(&section.text(), SECTION_PROMPT_LIMIT);
    format!(
        "This is section {} of {total_sections} of a longer document.\n\
         Summarize the key points of this section only, concisely and faithfully.\n\n\
         Section {} text:\n{text}\n\nSection {} summary:",
        section.number, section.number, section.number
    )
}

pub fn section_label(number: usize) -> String {
    format!("【Section {number}】")
}

/// Stand-in for a section whose map call failed.
pub fn section_placeholder(number: usize, error: &str) -> String {
    format!("{}\n(summary unavailable for this section: {error})", section_label(number))
}

pub fn labeled_summary(number: usize, summary: &str) -> String {
    format!("{}\n{}", section_label(number), summary.trim())
}

pub fn reduce_prompt(kind: SummaryKind, section_summaries: &[String]) -> String {
    format!(
        "The following are summaries of consecutive sections of one document.\n\
         Merge them into a single coherent summary of the whole document. \
         Do not repeat points, do not refer to section numbers, and keep the document's order of ideas.\n\
         {}\n\n{}\n\nFinal summary:",
        kind_instruction(kind),
        section_summaries.join("\n\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks_of(lengths: &[usize]) -> Vec<Chunk> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| Chunk {
                doc_id: "A".into(),
                chunk_index: i,
                total_chunks: lengths.len(),
                text: "x".repeat(len),
                source_locator: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(select_strategy(DIRECT_SUMMARY_LIMIT), SummaryStrategy::Direct);
        assert_eq!(select_strategy(DIRECT_SUMMARY_LIMIT + 1), SummaryStrategy::MapReduce);
        assert_eq!(select_strategy(0), SummaryStrategy::Direct);
    }

    #[test]
    fn test_total_chars_counts_scalars() {
        let mut chunks = chunks_of(&[3]);
        chunks[0].text = "检索增".into();
        assert_eq!(total_chars(&chunks), 3);
    }

    #[test]
    fn test_sections_respect_budget_and_order() {
        let chunks = chunks_of(&[2000; 23]);
        let sections = group_sections(&chunks, SECTION_BUDGET);
        assert_eq!(sections.len(), 3);
        assert!(sections.iter().all(|s| s.char_len <= SECTION_BUDGET));
        assert_eq!(sections[0].chunks.len(), 10);
        assert_eq!(sections[2].chunks.len(), 3);

        let flattened: Vec<usize> = sections
            .iter()
            .flat_map(|s| s.chunks.iter().map(|c| c.chunk_index))
            .collect();
        assert_eq!(flattened, (0..23).collect::<Vec<_>>());
        let numbers: Vec<usize> = sections.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_chunk_never_split_across_sections() {
        let chunks = chunks_of(&[15, 10, 30, 5]);
        let sections = group_sections(&chunks, 25);
        let sizes: Vec<Vec<usize>> = sections
            .iter()
            .map(|s| s.chunks.iter().map(|c| c.text.len()).collect())
            .collect();
        assert_eq!(sizes, vec![vec![15, 10], vec![30], vec![5]]);
    }

    #[test]
    fn test_section_prompt_is_capped_and_labeled() {
        let chunks = chunks_of(&[SECTION_BUDGET]);
        let section = &group_sections(&chunks, SECTION_BUDGET)[0];
        let prompt = section_prompt(section, 3);
        assert!(prompt.contains("section 1 of 3"));
        assert!(prompt.contains(&"x".repeat(SECTION_PROMPT_LIMIT)));
        assert!(!prompt.contains(&"x".repeat(SECTION_PROMPT_LIMIT + 1)));
    }

    #[test]
    fn test_reduce_prompt_carries_labels() {
        let summaries = vec![labeled_summary(1, "first"), section_placeholder(2, "timed out")];
        let prompt = reduce_prompt(SummaryKind::Brief, &summaries);
        assert!(prompt.contains("【Section 1】\nfirst"));
        assert!(prompt.contains("【Section 2】"));
        assert!(prompt.contains("timed out"));
        assert!(prompt.contains("brief summary"));
    }
}
