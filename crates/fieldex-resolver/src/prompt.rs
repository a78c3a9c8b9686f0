//! Prompt construction for batched resolution.

use std::borrow::Cow;

use crate::types::ResolveRequest;

/// Default cap on document characters sent to the model.
pub const DEFAULT_MAX_DOC_CHARS: usize = 2000;

/// Appended to the document text when it was cut.
pub const TRUNCATION_MARKER: &str = "\n[...truncated]";

const SYSTEM_PROMPT: &str = "Extract data from document. Return JSON only. Use null if not found.";

/// A rendered prompt ready for a completion backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System instructions.
    pub system: String,
    /// User message with fields and document.
    pub user: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_document(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER)),
        None => Cow::Borrowed(text),
    }
}

/// Render the batched prompt for `request`.
pub fn build_prompt(request: &ResolveRequest, max_doc_chars: usize, max_output_tokens: u32) -> Prompt {
    let doc = truncate_document(&request.doc_text, max_doc_chars);

    let fields_list = request
        .fields
        .iter()
        .map(|field| {
            let mut entry = format!("\"{}\": {}", field.name, field.description);
            if let Some(hint) = &field.hint {
                entry.push_str(&format!(" [{}]", hint));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join(", ");

    let first = request.fields.first().map(|f| f.name.as_str()).unwrap_or("field");

    let user = format!(
        "Fields: {fields_list}\n\n\
         Doc:\n{doc}\n\n\
         JSON format:\n\
         {{\"fields\": {{\"{first}\": \"value|null\", ...}}, \
         \"metadata\": {{\"{first}\": {{\"anchors\": [\"label\"], \"enums\": [\"val\"], \"region\": \"top_left|null\"}}, ...}}}}\n\n\
         metadata is optional, only if found in doc."
    );

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        max_output_tokens,
    }
}
