//! Text extraction for uploaded documents (plain text, Markdown, PDF, DOCX).
//!
//! Extraction never panics and never aborts a batch: every file yields a
//! [`ParseOutcome`] whose status is `parsed`, `degraded` (usable, with a
//! warning), or `error` (no usable text, with a human-readable reason).

use std::io::Read;

use thiserror::Error;

use crate::chunk::normalize_text;
use crate::models::{DocType, ParseStatus};

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file type. Use .txt, .md, .pdf, or .docx.")]
    UnsupportedType,
    #[error("PDF parse failed: {0}")]
    Pdf(String),
    #[error("DOCX parse failed: {0}")]
    Docx(String),
}

/// Result of parsing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub doc_type: DocType,
    pub text: String,
    pub status: ParseStatus,
    /// Failure reason for `error`, warning for `degraded`, empty otherwise.
    pub message: String,
}

/// Best-effort MIME type for a document type.
pub fn mime_for(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Txt => MIME_TEXT,
        DocType::Md => MIME_MARKDOWN,
        DocType::Pdf => MIME_PDF,
        DocType::Docx => MIME_DOCX,
        DocType::Unknown => "application/octet-stream",
    }
}

/// Parse a file by its name's extension.
pub fn parse_document(name: &str, bytes: &[u8]) -> ParseOutcome {
    let doc_type = DocType::from_file_name(name);
    let result = match doc_type {
        DocType::Txt | DocType::Md => Ok(decode_text(bytes)),
        DocType::Pdf => extract_pdf(bytes).map(|text| (text, None)),
        DocType::Docx => extract_docx(bytes).map(|text| (text, None)),
        DocType::Unknown => Err(ExtractError::UnsupportedType),
    };

    match result {
        Ok((raw, warning)) => {
            let text = normalize_text(&raw);
            let warning = match warning {
                Some(w) => Some(w),
                None if text.is_empty() && matches!(doc_type, DocType::Pdf | DocType::Docx) => {
                    Some(format!("{} contains no extractable text", doc_type))
                }
                None => None,
            };
            match warning {
                Some(message) => ParseOutcome {
                    doc_type,
                    text,
                    status: ParseStatus::Degraded,
                    message,
                },
                None => ParseOutcome {
                    doc_type,
                    text,
                    status: ParseStatus::Parsed,
                    message: String::new(),
                },
            }
        }
        Err(e) => ParseOutcome {
            doc_type,
            text: String::new(),
            status: ParseStatus::Error,
            message: e.to_string(),
        },
    }
}

/// Decode UTF-8, replacing invalid sequences and reporting it as a warning.
fn decode_text(bytes: &[u8]) -> (String, Option<String>) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), None),
        Err(_) => (
            String::from_utf8_lossy(bytes).into_owned(),
            Some("invalid UTF-8 sequences were replaced".to_string()),
        ),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract can panic on malformed input; keep that inside the outcome.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("malformed document".to_string())),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraph_text(&doc_xml)
}

/// Collect `<w:t>` runs, ending each `<w:p>` paragraph with a blank line.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => match e.local_name().as_ref() {
                b"br" => out.push('\n'),
                b"tab" => out.push('\t'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn plain_text_is_normalized() {
        let outcome = parse_document("notes.txt", b"\r\n hello\r\nworld \n");
        assert_eq!(outcome.status, ParseStatus::Parsed);
        assert_eq!(outcome.doc_type, DocType::Txt);
        assert_eq!(outcome.text, "hello\nworld");
        assert!(outcome.message.is_empty());
    }

    #[test]
    fn invalid_utf8_is_degraded_not_failed() {
        let outcome = parse_document("lore.md", b"caf\xff ok");
        assert_eq!(outcome.status, ParseStatus::Degraded);
        assert!(outcome.text.ends_with(" ok"));
        assert!(outcome.message.contains("UTF-8"));
    }

    #[test]
    fn unsupported_extension_is_error() {
        let outcome = parse_document("image.png", b"\x89PNG");
        assert_eq!(outcome.status, ParseStatus::Error);
        assert!(outcome.text.is_empty());
        assert!(outcome.message.starts_with("Unsupported file type"));
    }

    #[test]
    fn invalid_pdf_is_error() {
        let outcome = parse_document("report.pdf", b"not a pdf");
        assert_eq!(outcome.status, ParseStatus::Error);
        assert!(outcome.text.is_empty());
        assert!(outcome.message.starts_with("PDF parse failed"));
    }

    #[test]
    fn invalid_zip_is_docx_error() {
        let outcome = parse_document("memo.docx", b"not a zip");
        assert_eq!(outcome.status, ParseStatus::Error);
        assert!(outcome.message.starts_with("DOCX parse failed"));
    }

    #[test]
    fn docx_paragraphs_become_blank_line_separated() {
        let bytes = docx_with_paragraphs(&["First paragraph.", "Second &amp; last."]);
        let outcome = parse_document("memo.docx", &bytes);
        assert_eq!(outcome.status, ParseStatus::Parsed);
        assert_eq!(outcome.text, "First paragraph.\n\nSecond & last.");
    }

    #[test]
    fn empty_docx_is_degraded() {
        let bytes = docx_with_paragraphs(&[]);
        let outcome = parse_document("blank.docx", &bytes);
        assert_eq!(outcome.status, ParseStatus::Degraded);
        assert!(outcome.message.contains("no extractable text"));
    }
}
