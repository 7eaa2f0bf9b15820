use crate::models::{ChatMessage, WritingInstruction, WritingRequest};
use crate::synthesis::context::{sanitize_for_prompt, truncate_chars};

const MAX_TEXT_CHARS: usize = 20_000;
const MAX_CONTEXT_CHARS: usize = 5_000;

const WRITING_SYSTEM_PROMPT: &str = "You are an academic writing assistant. \
     Return only the rewritten or continued text, without commentary or quotation marks.";

fn instruction_text(instruction: WritingInstruction) -> &'static str {
    match instruction {
        WritingInstruction::Polish => {
            "Polish the text: improve clarity, flow and word choice while keeping its meaning and register."
        }
        WritingInstruction::Expand => {
            "Expand the text with supporting detail, explanation and examples, keeping its argument and style."
        }
        WritingInstruction::Continue => {
            "Continue writing from where the text ends, matching its tone, terminology and structure."
        }
        WritingInstruction::FixGrammar => {
            "Correct grammar, spelling and punctuation only. Do not change wording that is already correct."
        }
    }
}

/// Chat messages for one writing request.
pub fn build_messages(req: &WritingRequest) -> Vec<ChatMessage> {
    let mut prompt = String::from(instruction_text(req.instruction));
    if let Some(context) = req.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\nSurrounding context (do not rewrite it):\n");
        prompt.push_str(&sanitize_for_prompt(&truncate_chars(context, MAX_CONTEXT_CHARS)));
    }
    prompt.push_str("\n\nText:\n");
    prompt.push_str(&sanitize_for_prompt(&truncate_chars(&req.text, MAX_TEXT_CHARS)));

    vec![ChatMessage::system(WRITING_SYSTEM_PROMPT), ChatMessage::user(prompt)]
}
