//! Version commands: `reprocess`, `upload-version`, `versions`, `chunks`,
//! `activate`.

use anyhow::{anyhow, bail, Result};
use std::path::Path;

use crate::chunk::preview_snippet;
use crate::config::Config;
use crate::db;
use crate::models::{ChunkStrategy, PreprocessPreset};
use crate::store::{DocumentStore, IncomingFile, ReprocessOptions};

/// Overrides given on the command line; anything unset falls back to the
/// document's last settings, then to `[chunking]`.
#[derive(Debug, Clone, Default)]
pub struct ReprocessArgs {
    pub strategy: Option<String>,
    pub token_size: Option<usize>,
    pub preset: Option<String>,
    pub custom: Option<String>,
}

pub async fn run_reprocess(config: &Config, id: &str, args: &ReprocessArgs) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());

    let doc = store
        .get_document(id)
        .await?
        .ok_or_else(|| anyhow!("document not found: {}", id))?;

    let mut options = if doc.active_version_id.is_some() {
        ReprocessOptions::from_document(&doc)
    } else {
        ReprocessOptions {
            strategy: config.chunking.strategy,
            token_size: config.chunking.token_size,
            preset: doc.preprocess_preset,
            custom: doc.preprocess_custom.clone(),
        }
    };
    if let Some(strategy) = &args.strategy {
        options.strategy = ChunkStrategy::parse(strategy);
    }
    if let Some(token_size) = args.token_size {
        options.token_size = token_size;
    }
    if let Some(preset) = &args.preset {
        options.preset = PreprocessPreset::parse(preset);
    }
    if let Some(custom) = &args.custom {
        options.custom = custom.trim().to_string();
    }

    let result = store.reprocess(id, &options).await;
    pool.close().await;
    let result = result?;

    println!("reprocess {}", id);
    println!("  version: {}", result.version_id);
    println!("  strategy: {} / {}", options.strategy, options.token_size);
    println!("  preset: {}", options.preset);
    println!("  chunks: {}", result.chunk_count);
    println!("ok");
    Ok(())
}

pub async fn run_upload_version(config: &Config, id: &str, path: &Path) -> Result<()> {
    let file = IncomingFile::from_path(path)?;
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let result = store.upload_version(id, &file).await;
    pool.close().await;
    let result = result?;

    println!("upload-version {}", id);
    println!("  file: {}", path.display());
    println!("  version: {}", result.version_id);
    println!("  chunks: {}", result.chunk_count);
    println!("ok");
    Ok(())
}

pub async fn run_versions(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let doc = store.get_document(id).await?;
    let versions = store.list_versions(id).await?;
    pool.close().await;

    let Some(doc) = doc else {
        bail!("document not found: {}", id);
    };
    if versions.is_empty() {
        println!("No versions for {}.", doc.name);
        return Ok(());
    }
    for version in versions {
        let marker = if doc.active_version_id.as_deref() == Some(version.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {}  {}  {} / {}  preset={}  chunks={}",
            marker,
            version.id,
            version.created_at.format("%Y-%m-%d %H:%M:%S"),
            version.strategy,
            version.token_size,
            version.preset,
            version.chunk_count
        );
    }
    Ok(())
}

pub async fn run_chunks(config: &Config, version_id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let version = store.get_version(version_id).await?;
    let chunks = store.list_chunks(version_id).await?;
    pool.close().await;

    if version.is_none() {
        bail!("version not found: {}", version_id);
    }
    println!("--- Chunks ({}) ---", chunks.len());
    for chunk in &chunks {
        println!("[chunk {}] {}", chunk.order, chunk.hash);
        println!("{}", preview_snippet(&chunk.text, 400));
        println!();
    }
    Ok(())
}

pub async fn run_activate(config: &Config, id: &str, version_id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let activated = store.set_active_version(id, version_id).await;
    pool.close().await;

    match activated? {
        Some(version) => {
            println!("activate {}", id);
            println!("  version: {}", version.id);
            println!("  chunks: {}", version.chunk_count);
            println!("ok");
            Ok(())
        }
        None => bail!("version {} is not a version of document {}", version_id, id),
    }
}
