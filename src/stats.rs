//! Library statistics and health overview.
//!
//! Provides a quick summary of what is stored: document, version, chunk
//! and assignment counts, parse failures, and a per-type breakdown. Used
//! by `pctx stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Per-document-type breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStats {
    pub doc_type: String,
    pub doc_count: i64,
    pub total_bytes: i64,
    pub chunk_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryStats {
    pub documents: i64,
    pub versions: i64,
    pub chunks: i64,
    pub assignments: i64,
    pub characters: i64,
    pub parse_errors: i64,
    pub unversioned: i64,
    pub by_type: Vec<TypeStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<LibraryStats> {
    let count = |sql: &'static str| async move {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
    };

    let documents = count("SELECT COUNT(*) FROM documents").await?;
    let versions = count("SELECT COUNT(*) FROM versions").await?;
    let chunks = count("SELECT COUNT(*) FROM chunks").await?;
    let assignments = count("SELECT COUNT(*) FROM associations").await?;
    let characters = count("SELECT COUNT(DISTINCT character_id) FROM associations").await?;
    let parse_errors = count("SELECT COUNT(*) FROM documents WHERE parse_status = 'error'").await?;
    let unversioned = count("SELECT COUNT(*) FROM documents WHERE active_version_id IS NULL").await?;

    // Chunk counts come from each document's active version only.
    let type_rows = sqlx::query(
        r#"
        SELECT
            d.doc_type,
            COUNT(DISTINCT d.id) AS doc_count,
            COALESCE(SUM(d.size), 0) AS total_bytes,
            COALESCE(SUM(v.chunk_count), 0) AS chunk_count
        FROM documents d
        LEFT JOIN versions v ON v.id = d.active_version_id
        GROUP BY d.doc_type
        ORDER BY doc_count DESC, d.doc_type ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut by_type = Vec::with_capacity(type_rows.len());
    for row in &type_rows {
        by_type.push(TypeStats {
            doc_type: row.try_get("doc_type")?,
            doc_count: row.try_get("doc_count")?,
            total_bytes: row.try_get("total_bytes")?,
            chunk_count: row.try_get("chunk_count")?,
        });
    }

    Ok(LibraryStats {
        documents,
        versions,
        chunks,
        assignments,
        characters,
        parse_errors,
        unversioned,
        by_type,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await;
    pool.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Persona Context — Library Stats");
    println!("===============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Documents:    {}", stats.documents);
    println!("  Unversioned:  {}", stats.unversioned);
    println!("  Parse errors: {}", stats.parse_errors);
    println!("  Versions:     {}", stats.versions);
    println!("  Chunks:       {}", stats.chunks);
    println!(
        "  Assignments:  {} across {} character{}",
        stats.assignments,
        stats.characters,
        if stats.characters == 1 { "" } else { "s" }
    );

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!(
            "  {:<10} {:>6} {:>12} {:>14}",
            "TYPE", "DOCS", "SIZE", "ACTIVE CHUNKS"
        );
        println!("  {}", "-".repeat(46));
        for t in &stats.by_type {
            println!(
                "  {:<10} {:>6} {:>12} {:>14}",
                t.doc_type,
                t.doc_count,
                format_bytes(t.total_bytes.max(0) as u64),
                t.chunk_count
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::AssignmentRegistry;
    use crate::store::{DocumentStore, IncomingFile, ReprocessOptions};

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn stats_count_library_contents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("stats.sqlite")).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        let store = DocumentStore::new(pool.clone());
        let registry = AssignmentRegistry::new(pool.clone());

        let ok = store
            .add_document(&IncomingFile::new("a.md", "One.\n\nTwo."))
            .await
            .unwrap();
        store
            .add_document(&IncomingFile::new("b.pdf", "broken"))
            .await
            .unwrap();
        store
            .reprocess(&ok.id, &ReprocessOptions::default())
            .await
            .unwrap();
        registry.assign("mira", &ok.id).await.unwrap();
        registry.assign("oren", &ok.id).await.unwrap();

        let stats = collect_stats(&pool).await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.versions, 1);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.assignments, 2);
        assert_eq!(stats.characters, 2);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.unversioned, 1);
        let md = stats.by_type.iter().find(|t| t.doc_type == "md").unwrap();
        assert_eq!(md.chunk_count, 2);
    }
}
