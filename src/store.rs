//! SQLite-backed document library.
//!
//! [`DocumentStore`] owns the `documents`, `versions` and `chunks` tables.
//! Every mutation is a single transaction: a version is never visible
//! without its chunks, and a document never points at a version that was
//! not written in the same commit.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`add_documents`](DocumentStore::add_documents) | Parse and insert files; per-file outcomes |
//! | [`update_document`](DocumentStore::update_document) | Validated metadata edit |
//! | [`bulk_update`](DocumentStore::bulk_update) | Same edit over many documents |
//! | [`delete_document`](DocumentStore::delete_document) | Cascade to versions, chunks, assignments |
//! | [`reprocess`](DocumentStore::reprocess) | Preprocess + chunk into a new active version |
//! | [`upload_version`](DocumentStore::upload_version) | New version from a replacement file |
//! | [`set_active_version`](DocumentStore::set_active_version) | Switch the active version |

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{build_chunks, make_chunks};
use crate::extract::{mime_for, parse_document};
use crate::models::{
    normalize_folder, normalize_tags, Chunk, ChunkStrategy, DocType, Document, DocumentVersion,
    ParseStatus, PreprocessPreset, DEFAULT_TOKEN_SIZE,
};
use crate::preprocess::preprocess_text;

const DOCUMENT_COLUMNS: &str = "id, name, size, mime_type, doc_type, extracted_text, \
     processed_text, preprocess_preset, preprocess_custom, tags_json, folder, \
     active_version_id, last_chunk_strategy, last_token_size, parse_status, parse_error, \
     created_at, updated_at";

const VERSION_COLUMNS: &str = "id, doc_id, strategy, token_size, preset, custom_instructions, \
     text_snapshot, chunk_count, created_at";

/// A file handed to the library: its name, raw bytes, and optional metadata.
#[derive(Debug, Clone, Default)]
pub struct IncomingFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub tags: Vec<String>,
    pub folder: String,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            ..Default::default()
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    pub fn with_folder(mut self, folder: &str) -> Self {
        self.folder = normalize_folder(folder);
        self
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags = normalize_tags(tags);
        self
    }
}

/// Per-file result of [`DocumentStore::add_documents`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub id: String,
    pub name: String,
    pub status: ParseStatus,
    pub message: String,
}

/// Preprocessing and chunking settings for a new version.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprocessOptions {
    pub strategy: ChunkStrategy,
    pub token_size: usize,
    pub preset: PreprocessPreset,
    pub custom: String,
}

impl Default for ReprocessOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Paragraph,
            token_size: DEFAULT_TOKEN_SIZE,
            preset: PreprocessPreset::None,
            custom: String::new(),
        }
    }
}

impl ReprocessOptions {
    /// The settings a document was last processed with.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            strategy: doc.last_chunk_strategy,
            token_size: doc.last_token_size,
            preset: doc.preprocess_preset,
            custom: doc.preprocess_custom.clone(),
        }
    }
}

/// Identifies the version created by a reprocess or upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResult {
    pub version_id: String,
    pub chunk_count: usize,
}

/// How an update changes a document's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEdit {
    Set(Vec<String>),
    Add(Vec<String>),
    Remove(Vec<String>),
}

impl TagEdit {
    fn apply(&self, current: &[String]) -> Vec<String> {
        match self {
            TagEdit::Set(tags) => normalize_tags(tags),
            TagEdit::Add(tags) => normalize_tags(current.iter().chain(tags.iter())),
            TagEdit::Remove(tags) => {
                let removed = normalize_tags(tags);
                current
                    .iter()
                    .filter(|tag| !removed.contains(tag))
                    .cloned()
                    .collect()
            }
        }
    }
}

/// Partial document update. Only the fields that are `Some` change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    pub name: Option<String>,
    pub tags: Option<TagEdit>,
    pub folder: Option<String>,
    pub preprocess_preset: Option<PreprocessPreset>,
    pub preprocess_custom: Option<String>,
}

impl DocumentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tags(mut self, edit: TagEdit) -> Self {
        self.tags = Some(edit);
        self
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn preprocess_preset(mut self, preset: PreprocessPreset) -> Self {
        self.preprocess_preset = Some(preset);
        self
    }

    pub fn preprocess_custom(mut self, custom: impl Into<String>) -> Self {
        self.preprocess_custom = Some(custom.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tags.is_none()
            && self.folder.is_none()
            && self.preprocess_preset.is_none()
            && self.preprocess_custom.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                bail!("document name must not be empty");
            }
        }
        Ok(())
    }

    fn apply(&self, doc: &mut Document) {
        if let Some(name) = &self.name {
            doc.name = name.trim().to_string();
        }
        if let Some(edit) = &self.tags {
            doc.tags = edit.apply(&doc.tags);
        }
        if let Some(folder) = &self.folder {
            doc.folder = normalize_folder(folder);
        }
        if let Some(preset) = self.preprocess_preset {
            doc.preprocess_preset = preset;
        }
        if let Some(custom) = &self.preprocess_custom {
            doc.preprocess_custom = custom.trim().to_string();
        }
    }
}

/// Versioned document repository over a SQLite pool.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Parse and insert one file.
    pub async fn add_document(&self, file: &IncomingFile) -> Result<AddOutcome> {
        let mut outcomes = self.add_documents(std::slice::from_ref(file)).await?;
        outcomes
            .pop()
            .ok_or_else(|| anyhow!("no outcome for {}", file.name))
    }

    /// Parse and insert files in one transaction. A file that fails to
    /// parse is still stored (with `parse_status = error`) and reported in
    /// its own outcome; it never aborts the batch.
    pub async fn add_documents(&self, files: &[IncomingFile]) -> Result<Vec<AddOutcome>> {
        let now = Utc::now();
        let mut docs = Vec::with_capacity(files.len());
        for file in files {
            let parsed = parse_document(&file.name, &file.bytes);
            if parsed.status == ParseStatus::Error {
                warn!(name = %file.name, error = %parsed.message, "document failed to parse");
            }
            docs.push(Document {
                id: make_doc_id(&file.name),
                name: file.name.clone(),
                size: file.bytes.len() as i64,
                mime_type: file
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| mime_for(parsed.doc_type).to_string()),
                doc_type: parsed.doc_type,
                extracted_text: parsed.text.clone(),
                processed_text: parsed.text,
                preprocess_preset: PreprocessPreset::None,
                preprocess_custom: String::new(),
                tags: normalize_tags(&file.tags),
                folder: normalize_folder(&file.folder),
                active_version_id: None,
                last_chunk_strategy: ChunkStrategy::Paragraph,
                last_token_size: DEFAULT_TOKEN_SIZE,
                parse_status: parsed.status,
                parse_error: parsed.message,
                created_at: now,
                updated_at: now,
            });
        }

        let mut tx = self.pool.begin().await?;
        for doc in &docs {
            put_document(&mut tx, doc).await?;
        }
        tx.commit().await?;

        info!(count = docs.len(), "documents added");
        Ok(docs
            .into_iter()
            .map(|doc| AddOutcome {
                id: doc.id,
                name: doc.name,
                status: doc.parse_status,
                message: doc.parse_error,
            })
            .collect())
    }

    /// All documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, name ASC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    /// Apply a validated partial update. Returns `None` if the document
    /// does not exist.
    pub async fn update_document(
        &self,
        id: &str,
        update: &DocumentUpdate,
    ) -> Result<Option<Document>> {
        update.validate()?;
        let mut tx = self.pool.begin().await?;
        let updated = update_in_tx(&mut tx, id, update).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Apply the same update to many documents in one transaction.
    /// Returns the number of documents that existed and were updated.
    pub async fn bulk_update(&self, ids: &[String], update: &DocumentUpdate) -> Result<usize> {
        update.validate()?;
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for id in ids {
            if update_in_tx(&mut tx, id, update).await?.is_some() {
                updated += 1;
            }
        }
        tx.commit().await?;
        debug!(requested = ids.len(), updated, "bulk update applied");
        Ok(updated)
    }

    /// Delete a document with its versions, chunks and assignments.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM associations WHERE doc_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM versions WHERE doc_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        if deleted > 0 {
            info!(doc_id = %id, "document deleted");
        }
        Ok(deleted > 0)
    }

    /// Preprocess the extracted text, chunk it, and commit the result as a
    /// new active version.
    pub async fn reprocess(&self, doc_id: &str, options: &ReprocessOptions) -> Result<VersionResult> {
        let doc = self
            .get_document(doc_id)
            .await?
            .ok_or_else(|| anyhow!("document not found: {}", doc_id))?;
        if !doc.parse_status.is_usable() {
            bail!(
                "cannot reprocess {}: parsing failed for this document",
                doc.name
            );
        }

        let token_size = if options.token_size == 0 {
            DEFAULT_TOKEN_SIZE
        } else {
            options.token_size
        };
        let processed = preprocess_text(&doc.extracted_text, options.preset, &options.custom);

        let mut updated = doc;
        updated.preprocess_preset = options.preset;
        updated.preprocess_custom = options.custom.clone();
        updated.last_chunk_strategy = options.strategy;
        updated.last_token_size = token_size;

        let result = self.commit_new_version(updated, processed).await?;
        info!(
            doc_id = %doc_id,
            version_id = %result.version_id,
            chunks = result.chunk_count,
            strategy = %options.strategy,
            "document reprocessed"
        );
        Ok(result)
    }

    /// Parse a replacement file and commit it as a new active version,
    /// using the document's current preprocessing and chunking settings.
    /// Nothing is written when the file fails to parse.
    pub async fn upload_version(&self, doc_id: &str, file: &IncomingFile) -> Result<VersionResult> {
        let doc = self
            .get_document(doc_id)
            .await?
            .ok_or_else(|| anyhow!("document not found: {}", doc_id))?;

        let parsed = parse_document(&file.name, &file.bytes);
        if parsed.status == ParseStatus::Error {
            bail!("{}", parsed.message);
        }

        let processed = preprocess_text(&parsed.text, doc.preprocess_preset, &doc.preprocess_custom);

        let mut updated = doc;
        updated.size = file.bytes.len() as i64;
        updated.mime_type = file
            .mime_type
            .clone()
            .unwrap_or_else(|| mime_for(parsed.doc_type).to_string());
        updated.doc_type = parsed.doc_type;
        updated.extracted_text = parsed.text;
        updated.parse_status = parsed.status;
        updated.parse_error = parsed.message;

        let result = self.commit_new_version(updated, processed).await?;
        info!(
            doc_id = %doc_id,
            version_id = %result.version_id,
            chunks = result.chunk_count,
            "version uploaded"
        );
        Ok(result)
    }

    async fn commit_new_version(
        &self,
        mut doc: Document,
        processed: String,
    ) -> Result<VersionResult> {
        let now = Utc::now();
        let pieces = build_chunks(&processed, doc.last_chunk_strategy, doc.last_token_size);
        let version = DocumentVersion {
            id: make_version_id(&doc.id),
            doc_id: doc.id.clone(),
            strategy: doc.last_chunk_strategy,
            token_size: doc.last_token_size,
            preset: doc.preprocess_preset,
            custom_instructions: doc.preprocess_custom.clone(),
            text_snapshot: processed.clone(),
            chunk_count: pieces.len(),
            created_at: now,
        };
        let chunks = make_chunks(&doc.id, &version.id, &pieces);

        doc.processed_text = processed;
        doc.active_version_id = Some(version.id.clone());
        doc.updated_at = now;

        let mut tx = self.pool.begin().await?;
        put_version(&mut tx, &version).await?;
        put_chunks(&mut tx, &chunks).await?;
        put_document(&mut tx, &doc).await?;
        tx.commit().await?;

        Ok(VersionResult {
            version_id: version.id,
            chunk_count: version.chunk_count,
        })
    }

    /// Make `version_id` the document's active version and copy its
    /// settings onto the document. Returns `None` (and changes nothing) if
    /// either record is missing or the version belongs to another document.
    pub async fn set_active_version(
        &self,
        doc_id: &str,
        version_id: &str,
    ) -> Result<Option<DocumentVersion>> {
        let mut tx = self.pool.begin().await?;
        let doc = fetch_document(&mut tx, doc_id).await?;
        let version = fetch_version(&mut tx, version_id).await?;

        let (mut doc, version) = match (doc, version) {
            (Some(doc), Some(version)) if version.doc_id == doc.id => (doc, version),
            (Some(_), Some(_)) => {
                warn!(doc_id = %doc_id, version_id = %version_id, "version belongs to another document");
                return Ok(None);
            }
            _ => return Ok(None),
        };

        doc.active_version_id = Some(version.id.clone());
        doc.processed_text = version.text_snapshot.clone();
        doc.last_chunk_strategy = version.strategy;
        doc.last_token_size = version.token_size;
        doc.preprocess_preset = version.preset;
        doc.preprocess_custom = version.custom_instructions.clone();
        doc.updated_at = Utc::now();
        put_document(&mut tx, &doc).await?;
        tx.commit().await?;

        info!(doc_id = %doc_id, version_id = %version_id, "active version switched");
        Ok(Some(version))
    }

    /// Versions of a document, newest first.
    pub async fn list_versions(&self, doc_id: &str) -> Result<Vec<DocumentVersion>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM versions WHERE doc_id = ? ORDER BY created_at DESC, rowid DESC",
            VERSION_COLUMNS
        ))
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(version_from_row).collect()
    }

    pub async fn get_version(&self, version_id: &str) -> Result<Option<DocumentVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM versions WHERE id = ?",
            VERSION_COLUMNS
        ))
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(version_from_row).transpose()
    }

    /// Chunks of a version in order.
    pub async fn list_chunks(&self, version_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, doc_id, version_id, chunk_order, text, hash FROM chunks \
             WHERE version_id = ? ORDER BY chunk_order ASC",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    /// Text used for ranking and assembly: the pinned version's snapshot,
    /// else the active version's, else the processed text, else the
    /// extracted text. Documents that failed to parse resolve to "".
    pub async fn resolve_source_text(
        &self,
        doc: &Document,
        pinned_version_id: Option<&str>,
    ) -> Result<String> {
        if !doc.parse_status.is_usable() {
            return Ok(String::new());
        }
        if let Some(version_id) = pinned_version_id.or(doc.active_version_id.as_deref()) {
            if let Some(version) = self.get_version(version_id).await? {
                if version.doc_id == doc.id && !version.text_snapshot.is_empty() {
                    return Ok(version.text_snapshot);
                }
            }
        }
        Ok(fallback_text(doc).to_string())
    }
}

/// Unversioned text of a document: processed, else extracted.
pub fn fallback_text(doc: &Document) -> &str {
    if doc.processed_text.is_empty() {
        &doc.extracted_text
    } else {
        &doc.processed_text
    }
}

async fn update_in_tx(
    conn: &mut SqliteConnection,
    id: &str,
    update: &DocumentUpdate,
) -> Result<Option<Document>> {
    let Some(mut doc) = fetch_document(conn, id).await? else {
        return Ok(None);
    };
    update.apply(&mut doc);
    doc.updated_at = Utc::now();
    put_document(conn, &doc).await?;
    Ok(Some(doc))
}

async fn fetch_document(conn: &mut SqliteConnection, id: &str) -> Result<Option<Document>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(document_from_row).transpose()
}

async fn fetch_version(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<DocumentVersion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM versions WHERE id = ?",
        VERSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(version_from_row).transpose()
}

/// Insert or fully overwrite a document row.
pub(crate) async fn put_document(conn: &mut SqliteConnection, doc: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, name, size, mime_type, doc_type, extracted_text,
                               processed_text, preprocess_preset, preprocess_custom, tags_json,
                               folder, active_version_id, last_chunk_strategy, last_token_size,
                               parse_status, parse_error, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            size = excluded.size,
            mime_type = excluded.mime_type,
            doc_type = excluded.doc_type,
            extracted_text = excluded.extracted_text,
            processed_text = excluded.processed_text,
            preprocess_preset = excluded.preprocess_preset,
            preprocess_custom = excluded.preprocess_custom,
            tags_json = excluded.tags_json,
            folder = excluded.folder,
            active_version_id = excluded.active_version_id,
            last_chunk_strategy = excluded.last_chunk_strategy,
            last_token_size = excluded.last_token_size,
            parse_status = excluded.parse_status,
            parse_error = excluded.parse_error,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.name)
    .bind(doc.size)
    .bind(&doc.mime_type)
    .bind(doc.doc_type.as_str())
    .bind(&doc.extracted_text)
    .bind(&doc.processed_text)
    .bind(doc.preprocess_preset.as_str())
    .bind(&doc.preprocess_custom)
    .bind(serde_json::to_string(&doc.tags)?)
    .bind(&doc.folder)
    .bind(&doc.active_version_id)
    .bind(doc.last_chunk_strategy.as_str())
    .bind(doc.last_token_size as i64)
    .bind(doc.parse_status.as_str())
    .bind(&doc.parse_error)
    .bind(doc.created_at.timestamp_millis())
    .bind(doc.updated_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn put_version(
    conn: &mut SqliteConnection,
    version: &DocumentVersion,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO versions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        VERSION_COLUMNS
    ))
    .bind(&version.id)
    .bind(&version.doc_id)
    .bind(version.strategy.as_str())
    .bind(version.token_size as i64)
    .bind(version.preset.as_str())
    .bind(&version.custom_instructions)
    .bind(&version.text_snapshot)
    .bind(version.chunk_count as i64)
    .bind(version.created_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn put_chunks(conn: &mut SqliteConnection, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, doc_id, version_id, chunk_order, text, hash) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.doc_id)
        .bind(&chunk.version_id)
        .bind(chunk.order)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(crate) fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let tags_json: String = row.try_get("tags_json")?;
    let last_token_size: i64 = row.try_get("last_token_size")?;
    Ok(Document {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        size: row.try_get("size")?,
        mime_type: row.try_get("mime_type")?,
        doc_type: DocType::parse(row.try_get("doc_type")?),
        extracted_text: row.try_get("extracted_text")?,
        processed_text: row.try_get("processed_text")?,
        preprocess_preset: PreprocessPreset::parse(row.try_get("preprocess_preset")?),
        preprocess_custom: row.try_get("preprocess_custom")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        folder: row.try_get("folder")?,
        active_version_id: row.try_get("active_version_id")?,
        last_chunk_strategy: ChunkStrategy::parse(row.try_get("last_chunk_strategy")?),
        last_token_size: last_token_size.max(0) as usize,
        parse_status: ParseStatus::parse(row.try_get("parse_status")?),
        parse_error: row.try_get("parse_error")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

pub(crate) fn version_from_row(row: &SqliteRow) -> Result<DocumentVersion> {
    let token_size: i64 = row.try_get("token_size")?;
    let chunk_count: i64 = row.try_get("chunk_count")?;
    Ok(DocumentVersion {
        id: row.try_get("id")?,
        doc_id: row.try_get("doc_id")?,
        strategy: ChunkStrategy::parse(row.try_get("strategy")?),
        token_size: token_size.max(0) as usize,
        preset: PreprocessPreset::parse(row.try_get("preset")?),
        custom_instructions: row.try_get("custom_instructions")?,
        text_snapshot: row.try_get("text_snapshot")?,
        chunk_count: chunk_count.max(0) as usize,
        created_at: from_millis(row.try_get("created_at")?),
    })
}

pub(crate) fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    Ok(Chunk {
        id: row.try_get("id")?,
        doc_id: row.try_get("doc_id")?,
        version_id: row.try_get("version_id")?,
        order: row.try_get("chunk_order")?,
        text: row.try_get("text")?,
        hash: row.try_get("hash")?,
    })
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn random_token(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_string()
}

/// `doc-<slug>-<token>`, where the slug is the lowercase file name with
/// non-alphanumeric runs collapsed to `-`.
pub fn make_doc_id(name: &str) -> String {
    let mut slug = String::new();
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "file" } else { slug };
    format!("doc-{}-{}", slug, random_token(6))
}

pub fn make_version_id(doc_id: &str) -> String {
    format!(
        "ver-{}-{}-{}",
        doc_id,
        Utc::now().timestamp_millis(),
        random_token(5)
    )
}
