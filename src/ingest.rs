//! `pctx add`: scan input paths, read files, and add them to the library.
//!
//! Unreadable or oversized files are reported and skipped; files that
//! fail to parse are still added (with `parse_status = error`) so the
//! user can see them and upload a replacement version later.

use anyhow::Result;
use std::path::PathBuf;
use tracing::warn;

use crate::config::Config;
use crate::db;
use crate::models::ParseStatus;
use crate::progress::{AddProgressEvent, ProgressMode};
use crate::scan::scan_paths;
use crate::store::{DocumentStore, IncomingFile};

pub async fn run_add(
    config: &Config,
    paths: &[PathBuf],
    tags: &[String],
    folder: &str,
    progress: ProgressMode,
) -> Result<()> {
    let reporter = progress.reporter();
    for root in paths.iter().filter(|p| p.is_dir()) {
        reporter.report(AddProgressEvent::Scanning {
            root: root.display().to_string(),
        });
    }
    let scanned = scan_paths(paths, folder, &config.ingest)?;

    let total = scanned.len() as u64;
    let mut files = Vec::with_capacity(scanned.len());
    let mut skipped = 0usize;
    for (i, entry) in scanned.iter().enumerate() {
        if entry.size > config.ingest.max_file_bytes {
            warn!(path = %entry.path.display(), size = entry.size, "file exceeds max_file_bytes");
            println!("  skipped  {}  (larger than {} bytes)", entry.path.display(), config.ingest.max_file_bytes);
            skipped += 1;
            continue;
        }
        match IncomingFile::from_path(&entry.path) {
            Ok(file) => files.push(file.with_folder(&entry.folder).with_tags(tags)),
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "could not read file");
                println!("  skipped  {}  ({})", entry.path.display(), e);
                skipped += 1;
            }
        }
        reporter.report(AddProgressEvent::Reading {
            n: i as u64 + 1,
            total,
        });
    }

    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool.clone());
    let outcomes = store.add_documents(&files).await?;

    let mut failed = 0usize;
    for outcome in &outcomes {
        match outcome.status {
            ParseStatus::Parsed => println!("  added    {}  {}", outcome.id, outcome.name),
            ParseStatus::Degraded => println!(
                "  added    {}  {}  (warning: {})",
                outcome.id, outcome.name, outcome.message
            ),
            ParseStatus::Error => {
                failed += 1;
                println!(
                    "  failed   {}  {}  ({})",
                    outcome.id, outcome.name, outcome.message
                );
            }
        }
    }

    println!("add");
    println!("  files found: {}", scanned.len());
    println!("  documents added: {}", outcomes.len());
    println!("  parse errors: {}", failed);
    println!("  skipped: {}", skipped);
    println!("ok");

    pool.close().await;
    Ok(())
}
