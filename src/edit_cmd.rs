//! Metadata and lifecycle commands: `tag`, `rename`, `delete`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::parse_tag_list;
use crate::store::{DocumentStore, DocumentUpdate, TagEdit};

/// Tag and folder edits from the command line. Tag lists are
/// comma-separated.
#[derive(Debug, Clone, Default)]
pub struct TagArgs {
    pub set: Option<String>,
    pub add: Option<String>,
    pub remove: Option<String>,
    pub folder: Option<String>,
}

impl TagArgs {
    pub fn to_update(&self) -> Result<DocumentUpdate> {
        let edits = [&self.set, &self.add, &self.remove]
            .iter()
            .filter(|e| e.is_some())
            .count();
        if edits > 1 {
            bail!("use only one of --set, --add, --remove");
        }

        let mut update = DocumentUpdate::new();
        if let Some(tags) = &self.set {
            update = update.tags(TagEdit::Set(parse_tag_list(tags)));
        }
        if let Some(tags) = &self.add {
            update = update.tags(TagEdit::Add(parse_tag_list(tags)));
        }
        if let Some(tags) = &self.remove {
            update = update.tags(TagEdit::Remove(parse_tag_list(tags)));
        }
        if let Some(folder) = &self.folder {
            update = update.folder(folder.as_str());
        }
        if update.is_empty() {
            bail!("nothing to change: pass --set, --add, --remove, or --folder");
        }
        Ok(update)
    }
}

pub async fn run_tag(config: &Config, ids: &[String], args: &TagArgs) -> Result<()> {
    let update = args.to_update()?;
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let updated = store.bulk_update(ids, &update).await;
    pool.close().await;
    let updated = updated?;

    println!("tag");
    println!("  documents updated: {} / {}", updated, ids.len());
    println!("ok");
    Ok(())
}

pub async fn run_rename(config: &Config, id: &str, name: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let updated = store
        .update_document(id, &DocumentUpdate::new().name(name))
        .await;
    pool.close().await;

    match updated? {
        Some(doc) => {
            println!("renamed {} to {}", doc.id, doc.name);
            Ok(())
        }
        None => bail!("document not found: {}", id),
    }
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let deleted = store.delete_document(id).await;
    pool.close().await;

    if !deleted? {
        bail!("document not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}
