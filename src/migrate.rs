use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT NOT NULL DEFAULT '',
            doc_type TEXT NOT NULL DEFAULT 'unknown',
            extracted_text TEXT NOT NULL DEFAULT '',
            processed_text TEXT NOT NULL DEFAULT '',
            preprocess_preset TEXT NOT NULL DEFAULT 'none',
            preprocess_custom TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            folder TEXT NOT NULL DEFAULT '',
            active_version_id TEXT,
            last_chunk_strategy TEXT NOT NULL DEFAULT 'paragraph',
            last_token_size INTEGER NOT NULL DEFAULT 120,
            parse_status TEXT NOT NULL DEFAULT 'parsed',
            parse_error TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create versions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            id TEXT PRIMARY KEY,
            doc_id TEXT NOT NULL,
            strategy TEXT NOT NULL,
            token_size INTEGER NOT NULL,
            preset TEXT NOT NULL,
            custom_instructions TEXT NOT NULL DEFAULT '',
            text_snapshot TEXT NOT NULL,
            chunk_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (doc_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            doc_id TEXT NOT NULL,
            version_id TEXT NOT NULL,
            chunk_order INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(version_id, chunk_order),
            FOREIGN KEY (version_id) REFERENCES versions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create associations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS associations (
            id TEXT PRIMARY KEY,
            character_id TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            pinned_version_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(character_id, doc_id),
            FOREIGN KEY (doc_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_documents_name ON documents(name)",
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_versions_doc_id ON versions(doc_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_version_id ON chunks(version_id, chunk_order)",
        "CREATE INDEX IF NOT EXISTS idx_associations_character_id ON associations(character_id)",
        "CREATE INDEX IF NOT EXISTS idx_associations_doc_id ON associations(doc_id)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
