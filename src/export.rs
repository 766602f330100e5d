//! Whole-library snapshots as JSON.
//!
//! A snapshot holds every document, version, chunk and assignment, using
//! the same camelCase record shapes as the library API. Importing clears
//! the four tables and inserts the snapshot's records in one transaction.
//! A bare JSON array is accepted as a list of documents.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::assign::{put_assignment, AssignmentRegistry};
use crate::config::Config;
use crate::db;
use crate::models::{
    non_empty_id, normalize_folder, normalize_tags, Assignment, Chunk, Document, DocumentVersion,
};
use crate::store::{chunk_from_row, put_chunks, put_document, put_version, version_from_row, DocumentStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub docs: Vec<Document>,
    pub versions: Vec<DocumentVersion>,
    pub chunks: Vec<Chunk>,
    pub associations: Vec<Assignment>,
}

/// Counts of records written by an import. `skipped` counts records
/// dropped for missing ids, duplicates, unreadable shapes, or dangling
/// references; `repaired` counts cleared version pointers and corrected
/// chunk counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub docs: usize,
    pub versions: usize,
    pub chunks: usize,
    pub associations: usize,
    pub skipped: usize,
    pub repaired: usize,
}

pub async fn export_snapshot(pool: &SqlitePool) -> Result<Snapshot> {
    let docs = DocumentStore::new(pool.clone()).list_documents().await?;

    let version_rows = sqlx::query(
        "SELECT id, doc_id, strategy, token_size, preset, custom_instructions, text_snapshot, \
         chunk_count, created_at FROM versions ORDER BY doc_id, created_at, rowid",
    )
    .fetch_all(pool)
    .await?;
    let chunk_rows = sqlx::query(
        "SELECT id, doc_id, version_id, chunk_order, text, hash FROM chunks \
         ORDER BY version_id, chunk_order",
    )
    .fetch_all(pool)
    .await?;
    let associations = AssignmentRegistry::new(pool.clone()).list_all().await?;

    Ok(Snapshot {
        docs,
        versions: version_rows
            .iter()
            .map(version_from_row)
            .collect::<Result<_>>()?,
        chunks: chunk_rows.iter().map(chunk_from_row).collect::<Result<_>>()?,
        associations,
    })
}

/// Parse snapshot JSON. Records without an id, and records that do not
/// deserialize, are dropped and counted in the returned skip total.
pub fn parse_snapshot(json: &str) -> Result<(Snapshot, usize)> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Failed to parse snapshot JSON")?;
    let mut skipped = 0;

    let snapshot = match value {
        serde_json::Value::Array(docs) => Snapshot {
            docs: records(docs, "docs", &mut skipped),
            ..Default::default()
        },
        serde_json::Value::Object(mut map) => {
            let mut take = |key: &str| match map.remove(key) {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let docs = take("docs");
            let versions = take("versions");
            let chunks = take("chunks");
            let associations = take("associations");
            Snapshot {
                docs: records(docs, "docs", &mut skipped),
                versions: records(versions, "versions", &mut skipped),
                chunks: records(chunks, "chunks", &mut skipped),
                associations: records(associations, "associations", &mut skipped),
            }
        }
        _ => bail!("snapshot must be a JSON object or an array of documents"),
    };
    Ok((snapshot, skipped))
}

fn records<T: DeserializeOwned>(
    items: Vec<serde_json::Value>,
    kind: &str,
    skipped: &mut usize,
) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let has_id = item
            .get("id")
            .and_then(|id| id.as_str())
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            *skipped += 1;
            continue;
        }
        match serde_json::from_value(item) {
            Ok(record) => out.push(record),
            Err(e) => {
                warn!(kind, error = %e, "skipping unreadable record");
                *skipped += 1;
            }
        }
    }
    out
}

/// Replace the whole library with `snapshot` in one transaction.
///
/// Records are checked against each other before anything is written.
/// Versions need a known document, and chunks need a known version of
/// the same document. Active and pinned version pointers that do not name
/// a version of their own document are cleared. A version's chunk count
/// is set to the number of chunks actually imported for it.
pub async fn import_snapshot(pool: &SqlitePool, snapshot: &Snapshot) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    let mut doc_ids = HashSet::new();
    let mut docs = Vec::with_capacity(snapshot.docs.len());
    for doc in &snapshot.docs {
        if doc.id.trim().is_empty() || !doc_ids.insert(doc.id.clone()) {
            report.skipped += 1;
            continue;
        }
        let mut doc = doc.clone();
        doc.tags = normalize_tags(&doc.tags);
        doc.folder = normalize_folder(&doc.folder);
        docs.push(doc);
    }

    let mut version_owner: HashMap<String, String> = HashMap::new();
    let mut versions = Vec::with_capacity(snapshot.versions.len());
    for version in &snapshot.versions {
        if version.id.trim().is_empty()
            || !doc_ids.contains(&version.doc_id)
            || version_owner.contains_key(&version.id)
        {
            report.skipped += 1;
            continue;
        }
        version_owner.insert(version.id.clone(), version.doc_id.clone());
        versions.push(version.clone());
    }
    let owned_by = |version_id: Option<&str>, doc_id: &str| -> Option<String> {
        let version_id = non_empty_id(version_id)?;
        (version_owner.get(&version_id).map(String::as_str) == Some(doc_id)).then_some(version_id)
    };

    let mut chunk_ids = HashSet::new();
    let mut chunk_slots = HashSet::new();
    let mut chunks_per_version: HashMap<&str, usize> = HashMap::new();
    let mut chunks = Vec::with_capacity(snapshot.chunks.len());
    for chunk in &snapshot.chunks {
        let owner = version_owner.get(&chunk.version_id);
        if chunk.id.trim().is_empty()
            || owner != Some(&chunk.doc_id)
            || !chunk_slots.insert((chunk.version_id.clone(), chunk.order))
            || !chunk_ids.insert(chunk.id.clone())
        {
            report.skipped += 1;
            continue;
        }
        *chunks_per_version.entry(chunk.version_id.as_str()).or_default() += 1;
        chunks.push(chunk);
    }

    for doc in &mut docs {
        let active = owned_by(doc.active_version_id.as_deref(), &doc.id);
        if active.is_none() && non_empty_id(doc.active_version_id.as_deref()).is_some() {
            warn!(doc_id = %doc.id, version_id = ?doc.active_version_id, "clearing foreign or missing active version");
            report.repaired += 1;
        }
        doc.active_version_id = active;
    }
    for version in &mut versions {
        let actual = chunks_per_version.get(version.id.as_str()).copied().unwrap_or(0);
        if version.chunk_count != actual {
            version.chunk_count = actual;
            report.repaired += 1;
        }
    }

    let mut pairs = HashSet::new();
    let mut assignment_ids = HashSet::new();
    let mut assignments = Vec::with_capacity(snapshot.associations.len());
    for assignment in &snapshot.associations {
        if assignment.id.trim().is_empty()
            || !doc_ids.contains(&assignment.doc_id)
            || !pairs.insert((assignment.character_id.clone(), assignment.doc_id.clone()))
            || !assignment_ids.insert(assignment.id.clone())
        {
            report.skipped += 1;
            continue;
        }
        let mut assignment = assignment.clone();
        let pinned = owned_by(assignment.pinned_version_id.as_deref(), &assignment.doc_id);
        if pinned.is_none() && non_empty_id(assignment.pinned_version_id.as_deref()).is_some() {
            warn!(id = %assignment.id, version_id = ?assignment.pinned_version_id, "clearing foreign or missing pin");
            report.repaired += 1;
        }
        assignment.pinned_version_id = pinned;
        assignments.push(assignment);
    }

    let mut tx = pool.begin().await?;
    for table in ["chunks", "associations", "versions", "documents"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }
    for doc in &docs {
        put_document(&mut tx, doc).await?;
    }
    for version in &versions {
        put_version(&mut tx, version).await?;
    }
    for chunk in &chunks {
        put_chunks(&mut tx, std::slice::from_ref(*chunk)).await?;
    }
    for assignment in &assignments {
        put_assignment(&mut tx, assignment).await?;
    }
    tx.commit().await?;

    report.docs = docs.len();
    report.versions = versions.len();
    report.chunks = chunks.len();
    report.associations = assignments.len();
    if report.skipped > 0 || report.repaired > 0 {
        warn!(
            skipped = report.skipped,
            repaired = report.repaired,
            "some snapshot records were dropped or corrected"
        );
    }
    Ok(report)
}

/// Export the library as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    let snapshot = export_snapshot(&pool).await?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} documents, {} versions, {} chunks, {} assignments to {}",
                snapshot.docs.len(),
                snapshot.versions.len(),
                snapshot.chunks.len(),
                snapshot.associations.len(),
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    pool.close().await;
    Ok(())
}

/// Replace the library with the snapshot at `path`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let (snapshot, parse_skipped) = parse_snapshot(&json)?;

    let pool = db::connect(config).await?;
    let mut report = import_snapshot(&pool, &snapshot).await?;
    report.skipped += parse_skipped;
    pool.close().await;

    info!(
        docs = report.docs,
        versions = report.versions,
        chunks = report.chunks,
        associations = report.associations,
        "snapshot imported"
    );
    println!(
        "Imported {} documents, {} versions, {} chunks, {} assignments ({} skipped, {} repaired)",
        report.docs,
        report.versions,
        report.chunks,
        report.associations,
        report.skipped,
        report.repaired
    );
    Ok(())
}
