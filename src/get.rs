//! Document listing and detail views (`pctx list`, `pctx show`).

use anyhow::{bail, Result};
use serde::Serialize;

use crate::assign::{badge_text, AssignmentRegistry};
use crate::chunk::preview_snippet;
use crate::config::Config;
use crate::db;
use crate::models::{Chunk, Document, DocumentVersion};
use crate::store::DocumentStore;

const PREVIEW_CHARS: usize = 160;
const PREVIEW_CHUNKS: usize = 5;

/// Case-insensitive match against name, folder, or any tag. An empty
/// filter keeps everything. Input order (newest first) is preserved.
pub fn filter_documents<'a>(docs: &'a [Document], filter: &str) -> Vec<&'a Document> {
    let term = filter.trim().to_lowercase();
    docs.iter()
        .filter(|doc| {
            term.is_empty()
                || doc.name.to_lowercase().contains(&term)
                || doc.folder.to_lowercase().contains(&term)
                || doc.tags.iter().any(|tag| tag.contains(&term))
        })
        .collect()
}

pub async fn run_list(config: &Config, filter: Option<&str>, character: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let registry = AssignmentRegistry::new(pool.clone());

    let docs = store.list_documents().await?;
    let counts = registry.usage_counts().await?;
    let assigned: Vec<String> = match character {
        Some(character) => registry
            .list_for_character(character)
            .await?
            .into_iter()
            .map(|a| a.doc_id)
            .collect(),
        None => Vec::new(),
    };

    let shown = filter_documents(&docs, filter.unwrap_or(""));
    if shown.is_empty() {
        println!("No documents.");
    }
    for doc in shown {
        let uses = counts.get(&doc.id).copied().unwrap_or(0);
        let badges = badge_text(assigned.contains(&doc.id), uses);
        let folder = if doc.folder.is_empty() {
            String::new()
        } else {
            format!("  [{}]", doc.folder)
        };
        println!("{}  {}{}  ({})", doc.id, doc.name, folder, badges);
        if !doc.tags.is_empty() {
            println!("    tags: {}", doc.tags.join(", "));
        }
        if !doc.parse_status.is_usable() {
            println!("    parse error: {}", doc.parse_error);
        }
    }

    pool.close().await;
    Ok(())
}

/// Document detail returned by [`get_document_detail`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    pub document: Document,
    pub versions: Vec<DocumentVersion>,
    pub active_chunks: Vec<Chunk>,
}

pub async fn get_document_detail(store: &DocumentStore, id: &str) -> Result<DocumentDetail> {
    let Some(document) = store.get_document(id).await? else {
        bail!("document not found: {}", id);
    };
    let versions = store.list_versions(id).await?;
    let active_chunks = match &document.active_version_id {
        Some(version_id) => store.list_chunks(version_id).await?,
        None => Vec::new(),
    };
    Ok(DocumentDetail {
        document,
        versions,
        active_chunks,
    })
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let detail = get_document_detail(&store, id).await;
    pool.close().await;
    let DocumentDetail {
        document: doc,
        versions,
        active_chunks,
    } = detail?;

    println!("--- Document ---");
    println!("id:             {}", doc.id);
    println!("name:           {}", doc.name);
    println!("type:           {} ({})", doc.doc_type, doc.mime_type);
    println!("size:           {} bytes", doc.size);
    println!("folder:         {}", if doc.folder.is_empty() { "-" } else { &doc.folder });
    println!("tags:           {}", doc.tags.join(", "));
    println!("parse status:   {}", doc.parse_status);
    if !doc.parse_error.is_empty() {
        println!("parse message:  {}", doc.parse_error);
    }
    println!("preset:         {}", doc.preprocess_preset);
    if !doc.preprocess_custom.is_empty() {
        println!("custom:         {}", doc.preprocess_custom);
    }
    println!(
        "chunking:       {} / {}",
        doc.last_chunk_strategy, doc.last_token_size
    );
    println!(
        "active version: {}",
        doc.active_version_id.as_deref().unwrap_or("-")
    );
    println!("created_at:     {}", doc.created_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!("updated_at:     {}", doc.updated_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!();

    println!("--- Versions ({}) ---", versions.len());
    for version in &versions {
        println!(
            "{}  {} / {}  preset={}  chunks={}",
            version.id, version.strategy, version.token_size, version.preset, version.chunk_count
        );
    }
    println!();

    println!("--- Chunks ({}) ---", active_chunks.len());
    for chunk in active_chunks.iter().take(PREVIEW_CHUNKS) {
        println!("[chunk {}] {}", chunk.order, preview_snippet(&chunk.text, PREVIEW_CHARS));
    }
    if active_chunks.len() > PREVIEW_CHUNKS {
        println!("... {} more", active_chunks.len() - PREVIEW_CHUNKS);
    }
    if active_chunks.is_empty() {
        println!("--- Text preview ---");
        println!("{}", preview_snippet(crate::store::fallback_text(&doc), PREVIEW_CHARS * 2));
    }

    Ok(())
}
