//! Text preprocessing applied before chunking.
//!
//! Two pure stages run in order: a named [`PreprocessPreset`] and then a
//! free-text custom instruction. The custom stage only recognizes a few
//! literal directives (`lowercase`, `uppercase`, `trim lines`); anything
//! else leaves the text untouched.

use crate::chunk::normalize_text;
use crate::models::PreprocessPreset;

/// Sentences kept by the `summarize` preset.
pub const SUMMARY_SENTENCE_LIMIT: usize = 8;

/// Run the preset stage, then the custom instruction stage.
pub fn preprocess_text(text: &str, preset: PreprocessPreset, custom: &str) -> String {
    let preset_applied = apply_preset(text, preset);
    apply_custom(&preset_applied, custom)
}

/// Apply a preset to normalized text. Empty input stays empty.
pub fn apply_preset(text: &str, preset: PreprocessPreset) -> String {
    let source = normalize_text(text);
    if source.is_empty() {
        return String::new();
    }

    match preset {
        PreprocessPreset::Summarize => first_sentences(&source, SUMMARY_SENTENCE_LIMIT),
        PreprocessPreset::Bullets => source
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let body = line
                    .strip_prefix('-')
                    .or_else(|| line.strip_prefix('*'))
                    .map(str::trim_start)
                    .unwrap_or(line);
                format!("- {}", body)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        PreprocessPreset::QaClean => source
            .split('\n')
            .map(|line| strip_qa_label(line).trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        PreprocessPreset::None => source,
    }
}

/// Strip a leading `Q:` or `A:` label (case-insensitive, spaces allowed
/// around the colon).
fn strip_qa_label(line: &str) -> &str {
    let Some(first) = line.chars().next() else {
        return line;
    };
    if !matches!(first, 'q' | 'Q' | 'a' | 'A') {
        return line;
    }
    let rest = line[first.len_utf8()..].trim_start();
    match rest.strip_prefix(':') {
        Some(after) => after.trim_start(),
        None => line,
    }
}

/// Apply a custom instruction. Only literal directives are recognized.
pub fn apply_custom(text: &str, custom: &str) -> String {
    let instruction = custom.trim().to_lowercase();
    if instruction.is_empty() {
        return text.to_string();
    }
    if instruction.contains("lowercase") {
        return text.to_lowercase();
    }
    if instruction.contains("uppercase") {
        return text.to_uppercase();
    }
    if instruction.contains("trim lines") {
        return text.split('\n').map(str::trim).collect::<Vec<_>>().join("\n");
    }
    text.to_string()
}

/// Split text into sentences at whitespace that follows `.`, `!` or `?`.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            let piece = &text[start..index];
            if !piece.is_empty() {
                sentences.push(piece);
            }
            let mut end = index + c.len_utf8();
            while let Some(&(next_index, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = next_index + next.len_utf8();
                chars.next();
            }
            start = end;
            prev = None;
            continue;
        }
        prev = Some(c);
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// The first `limit` sentences joined by single spaces.
pub fn first_sentences(text: &str, limit: usize) -> String {
    split_sentences(text)
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}
