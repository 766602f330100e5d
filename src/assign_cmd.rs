//! Assignment commands: `assign`, `unassign`, `pin`, `docs`.

use anyhow::{anyhow, bail, Result};

use crate::assign::AssignmentRegistry;
use crate::config::Config;
use crate::context::ContextEngine;
use crate::db;
use crate::store::DocumentStore;

pub async fn run_assign(config: &Config, character: &str, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = AssignmentRegistry::new(pool.clone());
    let assigned = registry.assign(character, id).await;
    pool.close().await;

    if !assigned? {
        bail!("document not found: {}", id);
    }
    println!("assigned {} to {}", id, character);
    Ok(())
}

pub async fn run_unassign(config: &Config, character: &str, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = AssignmentRegistry::new(pool.clone());
    let removed = registry.unassign(character, id).await;
    pool.close().await;

    if removed? {
        println!("unassigned {} from {}", id, character);
    } else {
        println!("{} was not assigned to {}", id, character);
    }
    Ok(())
}

/// Pin `version` (or the document's active version when omitted). An
/// explicit empty string clears the pin.
pub async fn run_pin(
    config: &Config,
    character: &str,
    id: &str,
    version: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = pin(&pool, character, id, version).await;
    pool.close().await;
    let pinned = result?;

    match pinned {
        Some(version_id) => println!("pinned {} for {} at {}", id, character, version_id),
        None => println!("cleared pin on {} for {}", id, character),
    }
    Ok(())
}

async fn pin(
    pool: &sqlx::SqlitePool,
    character: &str,
    id: &str,
    version: Option<&str>,
) -> Result<Option<String>> {
    let version_id = match version {
        Some(v) => v.trim().to_string(),
        None => {
            let doc = DocumentStore::new(pool.clone())
                .get_document(id)
                .await?
                .ok_or_else(|| anyhow!("document not found: {}", id))?;
            doc.active_version_id
                .ok_or_else(|| anyhow!("{} has no active version; run `pctx reprocess {}` first", id, id))?
        }
    };

    let registry = AssignmentRegistry::new(pool.clone());
    if !registry.pin_version(character, id, Some(&version_id)).await? {
        bail!(
            "cannot pin: {} is not assigned to {}, or {} is not one of its versions",
            id,
            character,
            version_id
        );
    }
    Ok(if version_id.is_empty() {
        None
    } else {
        Some(version_id)
    })
}

pub async fn run_docs(config: &Config, character: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let engine = ContextEngine::new(pool.clone(), config);
    let entries = engine.document_context(character).await;
    pool.close().await;
    let entries = entries?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No documents assigned to {}.", character);
        return Ok(());
    }
    for entry in entries {
        let pin = entry
            .pinned_version_id
            .as_deref()
            .map(|v| format!("  pinned={}", v))
            .unwrap_or_default();
        println!("{}  {}{}", entry.id, entry.name, pin);
        if !entry.tags.is_empty() || !entry.folder.is_empty() {
            println!("    folder: {}  tags: {}", entry.folder, entry.tags.join(", "));
        }
    }
    Ok(())
}
