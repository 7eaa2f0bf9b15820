use serde::{Deserialize, Serialize};

use crate::models::Citation;
use crate::synthesis::compare::ComparisonTable;

/// Terminal token closing every stream.
pub const DONE_MARKER: &str = "[DONE]";
/// Prefix of the terminal error line.
pub const ERROR_PREFIX: &str = "Error: ";
/// Leads a text payload that would otherwise read as a marker or a
/// structured event. Literal backslashes are doubled, so text cannot start
/// with it.
pub const LITERAL_TEXT_PREFIX: &str = "\\=";

/// One unit of a synthesis stream.
///
/// Streams are finite and non-restartable: zero or more structured events,
/// then text, then at most one `Error`, then exactly one `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Citations(Vec<Citation>),
    ComparisonTable(ComparisonTable),
    /// A map-reduce section finished (1-based).
    Progress { section: usize, total: usize },
    /// Non-fatal degradation; the stream goes on.
    Warning(String),
    Text(String),
    Error(String),
    Done,
}

/// Wire shape of structured events, tagged by `"type"`.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Structured {
    Citations { citations: Vec<Citation> },
    ComparisonTable { table: ComparisonTable },
    Progress { section: usize, total: usize },
    Warning { message: String },
}

impl StreamEvent {
    fn structured(&self) -> Option<Structured> {
        match self {
            StreamEvent::Citations(citations) => Some(Structured::Citations {
                citations: citations.clone(),
            }),
            StreamEvent::ComparisonTable(table) => Some(Structured::ComparisonTable { table: table.clone() }),
            StreamEvent::Progress { section, total } => Some(Structured::Progress {
                section: *section,
                total: *total,
            }),
            StreamEvent::Warning(message) => Some(Structured::Warning {
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Single-line payload for an event (what follows `data: `).
pub fn frame_payload(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Text(text) => {
            let payload = escape_text(text);
            if is_reserved(&payload) {
                format!("{LITERAL_TEXT_PREFIX}{payload}")
            } else {
                payload
            }
        }
        StreamEvent::Error(message) => format!("{ERROR_PREFIX}{}", escape_text(message)),
        StreamEvent::Done => DONE_MARKER.to_string(),
        other => match other.structured() {
            // serde_json never emits raw newlines in compact form.
            Some(s) => serde_json::to_string(&s).unwrap_or_else(|e| {
                format!("{ERROR_PREFIX}failed to encode event: {}", escape_text(&e.to_string()))
            }),
            None => String::new(),
        },
    }
}

/// Full line-delimited frame: `data: <payload>\n\n`.
pub fn encode_line(event: &StreamEvent) -> String {
    format!("data: {}\n\n", frame_payload(event))
}

/// Inverse of [`encode_line`]. Structured JSON is tried first; anything that
/// isn't a known structured event is literal text.
pub fn decode_line(line: &str) -> StreamEvent {
    let line = line.trim_end_matches(['\n', '\r']);
    let payload = line.strip_prefix("data: ").unwrap_or(line);

    if let Some(text) = payload.strip_prefix(LITERAL_TEXT_PREFIX) {
        return StreamEvent::Text(unescape_text(text));
    }
    if payload == DONE_MARKER {
        return StreamEvent::Done;
    }
    if let Some(message) = payload.strip_prefix(ERROR_PREFIX) {
        return StreamEvent::Error(unescape_text(message));
    }
    if payload.starts_with('{') {
        if let Ok(s) = serde_json::from_str::<Structured>(payload) {
            return match s {
                Structured::Citations { citations } => StreamEvent::Citations(citations),
                Structured::ComparisonTable { table } => StreamEvent::ComparisonTable(table),
                Structured::Progress { section, total } => StreamEvent::Progress { section, total },
                Structured::Warning { message } => StreamEvent::Warning(message),
            };
        }
    }
    StreamEvent::Text(unescape_text(payload))
}

/// Would `decode_line` read this text payload as something other than text?
fn is_reserved(payload: &str) -> bool {
    payload == DONE_MARKER
        || payload.starts_with(ERROR_PREFIX)
        || (payload.starts_with('{') && serde_json::from_str::<Structured>(payload).is_ok())
}

/// Escape `\`, `\n` and `\r` so text never breaks line framing.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::compare::ComparisonRow;

    #[test]
    fn test_text_newlines_are_escaped() {
        let line = encode_line(&StreamEvent::Text("line one\nline two\r\n".into()));
        assert_eq!(line, "data: line one\\nline two\\r\\n\n\n");
        // Only the frame terminator contains raw newlines.
        assert_eq!(line.trim_end_matches('\n').matches('\n').count(), 0);
    }

    #[test]
    fn test_text_survives_framing() {
        let text = "a\\nb\nc\\";
        assert_eq!(decode_line(&encode_line(&StreamEvent::Text(text.into()))), StreamEvent::Text(text.into()));
    }

    #[test]
    fn test_done_and_error_markers() {
        assert_eq!(frame_payload(&StreamEvent::Done), "[DONE]");
        assert_eq!(
            frame_payload(&StreamEvent::Error("timed out\nretry later".into())),
            "Error: timed out\\nretry later"
        );
        assert_eq!(decode_line("data: [DONE]\n\n"), StreamEvent::Done);
        assert_eq!(
            decode_line("data: Error: boom"),
            StreamEvent::Error("boom".into())
        );
    }

    #[test]
    fn test_text_that_looks_like_a_marker_stays_text() {
        for text in [
            "Error: the authors misreport n",
            "[DONE]",
            r#"{"type":"warning","message":"x"}"#,
        ] {
            let event = StreamEvent::Text(text.into());
            assert!(frame_payload(&event).starts_with(LITERAL_TEXT_PREFIX));
            assert_eq!(decode_line(&encode_line(&event)), event);
        }
        // Ordinary text is framed untouched.
        assert_eq!(frame_payload(&StreamEvent::Text("{ plain".into())), "{ plain");
        let slash = StreamEvent::Text("\\=literal".into());
        assert_eq!(decode_line(&encode_line(&slash)), slash);
    }

    #[test]
    fn test_citations_event_is_tagged_json() {
        let event = StreamEvent::Citations(vec![Citation {
            index: 1,
            doc_id: "A".into(),
            chunk_index: 2,
            preview: "preview".into(),
            source_locator: "a.md".into(),
        }]);
        let payload = frame_payload(&event);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "citations");
        assert_eq!(value["citations"][0]["chunk_index"], 2);
        assert_eq!(decode_line(&encode_line(&event)), event);
    }

    #[test]
    fn test_table_and_progress_decode() {
        let table = StreamEvent::ComparisonTable(ComparisonTable {
            dimensions: vec!["Method".into()],
            rows: vec![ComparisonRow {
                doc_id: "A".into(),
                values: vec!["survey".into()],
            }],
        });
        assert_eq!(decode_line(&encode_line(&table)), table);

        let progress = StreamEvent::Progress { section: 2, total: 3 };
        assert_eq!(frame_payload(&progress), r#"{"type":"progress","section":2,"total":3}"#);
        assert_eq!(decode_line(&frame_payload(&progress)), progress);
    }

    #[test]
    fn test_unknown_json_is_literal_text() {
        let payload = r#"{"type":"mystery","x":1}"#;
        assert_eq!(decode_line(payload), StreamEvent::Text(payload.into()));
        assert_eq!(decode_line("{not json"), StreamEvent::Text("{not json".into()));
    }
}
