//! Core data models used throughout Persona Context.
//!
//! These types represent the documents, versions, chunks, and character
//! assignments that flow through the library and the context assembly
//! pipeline. Field names serialize in camelCase so snapshots stay
//! compatible with the workspace export format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default chunk window (in words) for the token strategy.
pub const DEFAULT_TOKEN_SIZE: usize = 120;

/// How a version's text is segmented into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChunkStrategy {
    #[default]
    Paragraph,
    Token,
    Section,
    Whole,
}

impl ChunkStrategy {
    /// Parse a strategy name. Unknown names fall back to `paragraph`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" => ChunkStrategy::Token,
            "section" => ChunkStrategy::Section,
            "whole" => ChunkStrategy::Whole,
            _ => ChunkStrategy::Paragraph,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Paragraph => "paragraph",
            ChunkStrategy::Token => "token",
            ChunkStrategy::Section => "section",
            ChunkStrategy::Whole => "whole",
        }
    }
}

impl From<String> for ChunkStrategy {
    fn from(value: String) -> Self {
        ChunkStrategy::parse(&value)
    }
}

impl From<ChunkStrategy> for String {
    fn from(value: ChunkStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named preset applied before chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PreprocessPreset {
    #[default]
    None,
    Summarize,
    Bullets,
    QaClean,
}

impl PreprocessPreset {
    /// Parse a preset name. Unknown names mean "no preset".
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "summarize" => PreprocessPreset::Summarize,
            "bullets" => PreprocessPreset::Bullets,
            "qa-clean" => PreprocessPreset::QaClean,
            _ => PreprocessPreset::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessPreset::None => "none",
            PreprocessPreset::Summarize => "summarize",
            PreprocessPreset::Bullets => "bullets",
            PreprocessPreset::QaClean => "qa-clean",
        }
    }
}

impl From<String> for PreprocessPreset {
    fn from(value: String) -> Self {
        PreprocessPreset::parse(&value)
    }
}

impl From<PreprocessPreset> for String {
    fn from(value: PreprocessPreset) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for PreprocessPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source format of a document, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    Txt,
    Md,
    Pdf,
    Docx,
    #[default]
    Unknown,
}

impl DocType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "txt" => DocType::Txt,
            "md" => DocType::Md,
            "pdf" => DocType::Pdf,
            "docx" => DocType::Docx,
            _ => DocType::Unknown,
        }
    }

    /// Detect the type from a file name's extension.
    pub fn from_file_name(name: &str) -> Self {
        match name.rfind('.') {
            Some(index) => DocType::parse(&name[index + 1..]),
            None => DocType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Txt => "txt",
            DocType::Md => "md",
            DocType::Pdf => "pdf",
            DocType::Docx => "docx",
            DocType::Unknown => "unknown",
        }
    }
}

impl From<String> for DocType {
    fn from(value: String) -> Self {
        DocType::parse(&value)
    }
}

impl From<DocType> for String {
    fn from(value: DocType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of turning a file's bytes into text.
///
/// `Degraded` documents parsed with a warning (stored in `parse_error`)
/// and remain usable; `Error` documents have no text and are skipped by
/// every downstream text operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParseStatus {
    #[default]
    Parsed,
    Degraded,
    Error,
}

impl ParseStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "parsed" | "" => ParseStatus::Parsed,
            "degraded" => ParseStatus::Degraded,
            _ => ParseStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Parsed => "parsed",
            ParseStatus::Degraded => "degraded",
            ParseStatus::Error => "error",
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, ParseStatus::Error)
    }
}

impl From<String> for ParseStatus {
    fn from(value: String) -> Self {
        ParseStatus::parse(&value)
    }
}

impl From<ParseStatus> for String {
    fn from(value: ParseStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-supplied file and its derived text and metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub doc_type: DocType,
    pub extracted_text: String,
    pub processed_text: String,
    pub preprocess_preset: PreprocessPreset,
    pub preprocess_custom: String,
    pub tags: Vec<String>,
    pub folder: String,
    pub active_version_id: Option<String>,
    pub last_chunk_strategy: ChunkStrategy,
    pub last_token_size: usize,
    pub parse_status: ParseStatus,
    pub parse_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Recency stamp used as the secondary ranking key.
    pub fn recency(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }
}

/// Immutable (preprocessing, chunking) → text snapshot of a document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentVersion {
    pub id: String,
    pub doc_id: String,
    pub strategy: ChunkStrategy,
    pub token_size: usize,
    pub preset: PreprocessPreset,
    pub custom_instructions: String,
    pub text_snapshot: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// One ordered text segment produced from a version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub version_id: String,
    pub order: i64,
    pub text: String,
    pub hash: String,
}

/// A character-to-document link, optionally pinning a version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Assignment {
    pub id: String,
    pub character_id: String,
    pub doc_id: String,
    pub pinned_version_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_pinned(&self) -> bool {
        self.pinned_version_id.is_some()
    }
}

/// Trim, lowercase, de-duplicate and sort a tag list.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.as_ref().trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Split a comma-separated tag string and normalize it.
pub fn parse_tag_list(value: &str) -> Vec<String> {
    normalize_tags(value.split(','))
}

/// Normalize a folder path: trimmed segments joined by `/`, no empty segments.
pub fn normalize_folder(value: &str) -> String {
    value
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Treat empty or whitespace-only ids as absent.
pub fn non_empty_id(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
