//! Token budget allocation for assembled context.
//!
//! Ranked candidates are packed into a single text block under
//! `token_budget - reserve` tokens. Each document gets the richest form
//! that fits its per-document ceiling: the full text, a character-truncated
//! prefix, or a two-sentence summary. A section that does not fit what is
//! left of the budget is skipped whole.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::preprocess::first_sentences;
use crate::rank::Candidate;

/// Reserve never drops below this.
pub const MIN_RESERVE_TOKENS: usize = 300;
/// Usable tokens never drop below this, whatever the budget.
pub const MIN_USABLE_TOKENS: usize = 200;
/// A section needs at least this many body tokens beyond its header.
pub const MIN_SECTION_TOKENS: usize = 24;
/// Smallest per-document ceiling.
pub const MIN_DOC_CEILING: usize = 40;
pub const SECTION_DELIMITER: &str = "\n\n---\n\n";

const TOKENS_PER_WORD: f64 = 1.3;
const CHARS_PER_TOKEN: usize = 4;
const SUMMARY_SENTENCES: usize = 2;

/// Rough token count: 1.3 tokens per whitespace-delimited word.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD).round() as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InclusionMethod {
    Full,
    Truncated,
    Summary,
}

impl fmt::Display for InclusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InclusionMethod::Full => "full",
            InclusionMethod::Truncated => "truncated",
            InclusionMethod::Summary => "summary",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocUsage {
    pub id: String,
    pub name: String,
    pub method: InclusionMethod,
    pub used_tokens: usize,
    pub pinned: bool,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsage {
    pub budget_tokens: usize,
    pub reserve_tokens: usize,
    pub used_tokens: usize,
    pub remaining_tokens: usize,
    pub docs: Vec<DocUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBundle {
    pub text: String,
    pub usage: ContextUsage,
}

/// Pack ranked candidates into one text block.
pub fn allocate(candidates: &[Candidate], token_budget: usize, reserve_tokens: usize) -> ContextBundle {
    let reserve = reserve_tokens.max(MIN_RESERVE_TOKENS);
    let usable = token_budget.saturating_sub(reserve).max(MIN_USABLE_TOKENS);

    let mut sections: Vec<String> = Vec::new();
    let mut docs: Vec<DocUsage> = Vec::new();
    let mut used = 0;

    for candidate in candidates {
        let source = candidate.source_text.trim();
        if source.is_empty() {
            continue;
        }

        let header = format!("Document: {}", candidate.document.name);
        let header_tokens = estimate_tokens(&header);
        let remaining = usable - used;
        if remaining < header_tokens + MIN_SECTION_TOKENS {
            debug!(remaining, "context budget exhausted");
            break;
        }

        let ceiling = doc_ceiling(usable, remaining, header_tokens);
        let (method, body) = fit_body(source, ceiling);
        let section = format!("{}\n{}", header, body);
        let section_tokens = estimate_tokens(&section);
        if section_tokens > remaining {
            debug!(
                doc_id = %candidate.document.id,
                section_tokens,
                remaining,
                "section does not fit, skipping"
            );
            continue;
        }

        used += section_tokens;
        sections.push(section);
        docs.push(DocUsage {
            id: candidate.document.id.clone(),
            name: candidate.document.name.clone(),
            method,
            used_tokens: section_tokens,
            pinned: candidate.pinned,
            score: candidate.score,
        });
    }

    ContextBundle {
        text: sections.join(SECTION_DELIMITER),
        usage: ContextUsage {
            budget_tokens: token_budget,
            reserve_tokens: reserve,
            used_tokens: used,
            remaining_tokens: usable - used,
            docs,
        },
    }
}

fn doc_ceiling(usable: usize, remaining: usize, header_tokens: usize) -> usize {
    let share = usable * 45 / 100;
    let room = remaining.saturating_sub(header_tokens) * 9 / 10;
    share.min(room).max(MIN_DOC_CEILING)
}

/// Full text, else a truncated prefix, else a summary, each only if it
/// stays within `ceiling` tokens. The summary is word-trimmed as a last
/// resort.
fn fit_body(text: &str, ceiling: usize) -> (InclusionMethod, String) {
    if estimate_tokens(text) <= ceiling {
        return (InclusionMethod::Full, text.to_string());
    }

    let prefix: String = text.chars().take(ceiling * CHARS_PER_TOKEN).collect();
    let truncated = format!("{}...", prefix.trim_end());
    if estimate_tokens(&truncated) <= ceiling {
        return (InclusionMethod::Truncated, truncated);
    }

    let summary = first_sentences(text, SUMMARY_SENTENCES);
    if estimate_tokens(&summary) <= ceiling {
        return (InclusionMethod::Summary, summary);
    }
    let max_words = (ceiling as f64 / TOKENS_PER_WORD).floor() as usize;
    let trimmed = summary
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ");
    (InclusionMethod::Summary, trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn candidate(name: &str, text: &str) -> Candidate {
        let document = Document {
            id: format!("doc-{}", name),
            name: name.to_string(),
            ..Default::default()
        };
        Candidate::new(document, false, text)
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("word{}", i % 97))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn estimate_rounds_word_count() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("  \n "), 0);
        assert_eq!(estimate_tokens("one"), 1);
        assert_eq!(estimate_tokens("one two three"), 4);
        assert_eq!(estimate_tokens("a b c d e f g h i j"), 13);
    }

    #[test]
    fn empty_candidates_use_nothing() {
        let bundle = allocate(&[], 4096, 300);
        assert_eq!(bundle.text, "");
        assert_eq!(bundle.usage.used_tokens, 0);
        assert!(bundle.usage.docs.is_empty());
        assert_eq!(bundle.usage.remaining_tokens, 3796);
    }

    #[test]
    fn small_documents_are_included_in_full() {
        let bundle = allocate(
            &[candidate("a.md", "Alpha body."), candidate("b.md", "Beta body.")],
            4096,
            0,
        );
        assert_eq!(
            bundle.text,
            "Document: a.md\nAlpha body.\n\n---\n\nDocument: b.md\nBeta body."
        );
        assert_eq!(bundle.usage.reserve_tokens, 300);
        assert_eq!(bundle.usage.docs.len(), 2);
        assert!(bundle
            .usage
            .docs
            .iter()
            .all(|d| d.method == InclusionMethod::Full));
        // "Document: a.md Alpha body." is four words.
        assert_eq!(bundle.usage.used_tokens, 10);
        assert_eq!(bundle.usage.remaining_tokens, 3796 - 10);
    }

    #[test]
    fn large_document_is_never_full_at_4096() {
        let text = "lorem ipsum dolor sit amet ".repeat(2000);
        assert!(text.len() >= 50_000);
        let bundle = allocate(&[candidate("big.txt", &text)], 4096, 300);
        let doc = &bundle.usage.docs[0];
        assert_ne!(doc.method, InclusionMethod::Full);
        assert_eq!(doc.method, InclusionMethod::Truncated);
        assert!(bundle.text.ends_with("..."));
        assert!(doc.used_tokens <= 3796 * 45 / 100 + 2);
    }

    #[test]
    fn dense_text_falls_back_to_summary() {
        let text = format!("First sentence here. Second one here. {}", "ab ".repeat(2000));
        let bundle = allocate(&[candidate("x", &text)], 100, 300);
        let doc = &bundle.usage.docs[0];
        assert_eq!(doc.method, InclusionMethod::Summary);
        assert_eq!(bundle.text, "Document: x\nFirst sentence here. Second one here.");
    }

    #[test]
    fn unpunctuated_summary_is_word_trimmed() {
        let bundle = allocate(&[candidate("x", &"ab ".repeat(2000))], 100, 300);
        let doc = &bundle.usage.docs[0];
        assert_eq!(doc.method, InclusionMethod::Summary);
        // Ceiling is 90 tokens, so the body keeps floor(90 / 1.3) = 69 words.
        let body = bundle.text.strip_prefix("Document: x\n").unwrap();
        assert_eq!(body.split_whitespace().count(), 69);
        assert!(bundle.usage.used_tokens <= 200);
    }

    #[test]
    fn used_tokens_stay_within_budget() {
        let candidates: Vec<Candidate> = (0..15)
            .map(|i| candidate(&format!("doc{}", i), &words(50 + i * 120)))
            .collect();
        for budget in [500, 800, 1024, 2048, 4096, 8192, 16384] {
            let bundle = allocate(&candidates, budget, 300);
            let usable = budget - 300;
            assert!(
                bundle.usage.used_tokens <= usable,
                "budget {} used {}",
                budget,
                bundle.usage.used_tokens
            );
            assert_eq!(bundle.usage.remaining_tokens, usable - bundle.usage.used_tokens);
            let summed: usize = bundle.usage.docs.iter().map(|d| d.used_tokens).sum();
            assert_eq!(summed, bundle.usage.used_tokens);
        }
    }

    #[test]
    fn empty_sources_are_skipped() {
        let bundle = allocate(
            &[candidate("empty", "   "), candidate("real", "Some text.")],
            4096,
            300,
        );
        assert_eq!(bundle.usage.docs.len(), 1);
        assert_eq!(bundle.usage.docs[0].name, "real");
    }

    #[test]
    fn method_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&InclusionMethod::Truncated).unwrap(),
            "\"truncated\""
        );
    }
}
