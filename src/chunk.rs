//! Strategy-driven text chunker.
//!
//! Splits a version's normalized text into ordered, non-empty chunks using
//! one of four strategies:
//!
//! | Strategy | Unit |
//! |----------|------|
//! | `paragraph` | blank-line separated paragraphs |
//! | `token` | fixed windows of whitespace-delimited words |
//! | `section` | heading-delimited sections (falls back to `paragraph`) |
//! | `whole` | the entire text |
//!
//! Chunking is a pure function of `(text, strategy, token_size)`, so a
//! version's chunk set can always be reproduced from its snapshot. Each
//! chunk carries a deterministic id derived from its version and order,
//! plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkStrategy, DEFAULT_TOKEN_SIZE};

/// Smallest window the token strategy will use.
pub const MIN_TOKEN_SIZE: usize = 20;

/// Remove carriage returns and surrounding whitespace.
pub fn normalize_text(text: &str) -> String {
    text.replace('\r', "").trim().to_string()
}

/// Resolve a requested window size: 0 means the default, anything else is
/// clamped to [`MIN_TOKEN_SIZE`].
pub fn effective_token_size(token_size: usize) -> usize {
    if token_size == 0 {
        DEFAULT_TOKEN_SIZE
    } else {
        token_size.max(MIN_TOKEN_SIZE)
    }
}

/// Split text into chunk strings using the given strategy.
pub fn build_chunks(text: &str, strategy: ChunkStrategy, token_size: usize) -> Vec<String> {
    match strategy {
        ChunkStrategy::Paragraph => chunk_by_paragraph(text),
        ChunkStrategy::Token => chunk_by_token_count(text, token_size),
        ChunkStrategy::Section => chunk_by_section(text),
        ChunkStrategy::Whole => chunk_whole(text),
    }
}

fn chunk_by_paragraph(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        if line.trim().is_empty() {
            flush_lines(&mut current, &mut chunks);
        } else {
            current.push(line);
        }
    }
    flush_lines(&mut current, &mut chunks);

    chunks
}

fn flush_lines(current: &mut Vec<&str>, chunks: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let joined = current.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

fn chunk_by_token_count(text: &str, token_size: usize) -> Vec<String> {
    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let size = effective_token_size(token_size);
    words.chunks(size).map(|window| window.join(" ")).collect()
}

/// A heading is a Markdown `#`..`######` line or a short ALL-CAPS `LABEL:` line.
pub fn is_heading_line(line: &str) -> bool {
    let text = line.trim();
    if text.is_empty() {
        return false;
    }

    let hashes = text.chars().take_while(|c| *c == '#').count();
    if hashes > 0 {
        return hashes <= 6
            && text[hashes..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace);
    }

    let Some(label) = text.strip_suffix(':') else {
        return false;
    };
    let mut chars = label.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    let rest: Vec<char> = chars.collect();
    first_ok
        && rest.len() >= 2
        && rest
            .iter()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
}

fn chunk_by_section(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut heading_detected = false;

    for line in normalized.split('\n') {
        if is_heading_line(line) {
            heading_detected = true;
            flush_section(&current, &mut chunks);
            current = vec![line.trim()];
        } else {
            current.push(line);
        }
    }
    flush_section(&current, &mut chunks);

    if heading_detected {
        chunks
    } else {
        chunk_by_paragraph(text)
    }
}

fn flush_section(current: &[&str], chunks: &mut Vec<String>) {
    let joined = current.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn chunk_whole(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        Vec::new()
    } else {
        vec![normalized]
    }
}

/// Turn chunk strings into [`Chunk`] records for a version.
/// Orders are contiguous and start at 0.
pub fn make_chunks(doc_id: &str, version_id: &str, pieces: &[String]) -> Vec<Chunk> {
    pieces
        .iter()
        .enumerate()
        .map(|(index, text)| make_chunk(doc_id, version_id, index as i64, text))
        .collect()
}

fn make_chunk(doc_id: &str, version_id: &str, order: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("chunk-{}-{}", version_id, order),
        doc_id: doc_id.to_string(),
        version_id: version_id.to_string(),
        order,
        text: text.to_string(),
        hash,
    }
}

/// Whitespace-compacted, length-limited snippet for listings.
pub fn preview_snippet(text: &str, max_chars: usize) -> String {
    let compact = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= max_chars {
        return compact;
    }
    let cut: String = compact.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_no_chunks() {
        for strategy in [
            ChunkStrategy::Paragraph,
            ChunkStrategy::Token,
            ChunkStrategy::Section,
            ChunkStrategy::Whole,
        ] {
            assert!(build_chunks("  \r\n ", strategy, 120).is_empty());
        }
    }

    #[test]
    fn test_paragraph_split_on_blank_lines() {
        let text = "First line\nstill first.\r\n\r\n  \nSecond paragraph.\n\n\nThird.";
        let chunks = build_chunks(text, ChunkStrategy::Paragraph, 0);
        assert_eq!(
            chunks,
            vec!["First line\nstill first.", "Second paragraph.", "Third."]
        );
    }

    #[test]
    fn test_token_windows() {
        let text = (0..50)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" \n ");
        let chunks = build_chunks(&text, ChunkStrategy::Token, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split(' ').count(), 20);
        assert_eq!(chunks[2].split(' ').count(), 10);
        assert!(chunks[1].starts_with("w20 "));
    }

    #[test]
    fn test_token_window_minimum() {
        let text = (0..45).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        // Requested 5 is clamped up to 20.
        assert_eq!(build_chunks(&text, ChunkStrategy::Token, 5).len(), 3);
        // 0 means default (120): everything fits in one window.
        assert_eq!(build_chunks(&text, ChunkStrategy::Token, 0).len(), 1);
    }

    #[test]
    fn test_section_split_includes_heading_and_preamble() {
        let text = "Preamble text.\n# Intro\nHello there.\n\nMore intro.\nRULES:\nNo running.\n## Outro\nBye.";
        let chunks = build_chunks(text, ChunkStrategy::Section, 0);
        assert_eq!(
            chunks,
            vec![
                "Preamble text.",
                "# Intro\nHello there.\n\nMore intro.",
                "RULES:\nNo running.",
                "## Outro\nBye.",
            ]
        );
    }

    #[test]
    fn test_section_without_headings_degrades_to_paragraph() {
        let text = "Alpha one.\n\nBeta two.";
        assert_eq!(
            build_chunks(text, ChunkStrategy::Section, 0),
            build_chunks(text, ChunkStrategy::Paragraph, 0)
        );
    }

    #[test]
    fn test_heading_detection() {
        assert!(is_heading_line("# Title"));
        assert!(is_heading_line("  ###### Deep"));
        assert!(!is_heading_line("####### Too deep"));
        assert!(!is_heading_line("#hashtag"));
        assert!(is_heading_line("NPC LIST:"));
        assert!(is_heading_line("STAGE-2:"));
        assert!(!is_heading_line("AB:"));
        assert!(!is_heading_line("Notes:"));
        assert!(!is_heading_line("NOTES: extra"));
    }

    #[test]
    fn test_whole_document() {
        let chunks = build_chunks("\n  one\n\ntwo  \n", ChunkStrategy::Whole, 0);
        assert_eq!(chunks, vec!["one\n\ntwo"]);
    }

    #[test]
    fn test_make_chunks_contiguous_and_deterministic() {
        let text = (0..30)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let first = make_chunks(
            "doc1",
            "ver1",
            &build_chunks(&text, ChunkStrategy::Paragraph, 0),
        );
        let second = make_chunks(
            "doc1",
            "ver1",
            &build_chunks(&text, ChunkStrategy::Paragraph, 0),
        );
        assert_eq!(first, second);
        for (i, c) in first.iter().enumerate() {
            assert_eq!(c.order, i as i64);
            assert_eq!(c.id, format!("chunk-ver1-{}", i));
        }
    }

    #[test]
    fn test_preview_snippet() {
        assert_eq!(preview_snippet("a\n\n b   c", 10), "a b c");
        assert_eq!(preview_snippet("abcdefghij", 4), "abcd…");
        assert_eq!(preview_snippet("abc defgh", 4), "abc…");
    }
}
