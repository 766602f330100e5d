//! Character-to-document assignments.
//!
//! An assignment links a character to a document and may pin one of the
//! document's versions. There is at most one assignment per
//! `(character_id, doc_id)` pair; its id is `assoc-<character>-<doc>`.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{non_empty_id, Assignment};
use crate::store::from_millis;

const ASSIGNMENT_COLUMNS: &str =
    "id, character_id, doc_id, pinned_version_id, created_at, updated_at";

pub fn assignment_id(character_id: &str, doc_id: &str) -> String {
    format!("assoc-{}-{}", character_id, doc_id)
}

/// Usage badges for a document listing, e.g. `active | shared`.
pub fn badge_text(assigned_to_current: bool, usage_count: usize) -> String {
    let mut badges = Vec::with_capacity(2);
    if assigned_to_current {
        badges.push("active");
    }
    badges.push(if usage_count > 1 {
        "shared"
    } else {
        "character-exclusive"
    });
    badges.join(" | ")
}

#[derive(Clone)]
pub struct AssignmentRegistry {
    pool: SqlitePool,
}

impl AssignmentRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Assign a document to a character. Idempotent: an existing
    /// assignment (and its pin) is left as is. Returns `false` when the
    /// document does not exist.
    pub async fn assign(&self, character_id: &str, doc_id: &str) -> Result<bool> {
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            warn!(character_id = %character_id, doc_id = %doc_id, "cannot assign missing document");
            return Ok(false);
        }

        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO associations (id, character_id, doc_id, pinned_version_id, created_at, updated_at) \
             VALUES (?, ?, ?, NULL, ?, ?) \
             ON CONFLICT(character_id, doc_id) DO NOTHING",
        )
        .bind(assignment_id(character_id, doc_id))
        .bind(character_id)
        .bind(doc_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(character_id = %character_id, doc_id = %doc_id, "document assigned");
        Ok(true)
    }

    /// Remove an assignment. Returns whether one existed.
    pub async fn unassign(&self, character_id: &str, doc_id: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM associations WHERE character_id = ? AND doc_id = ?")
            .bind(character_id)
            .bind(doc_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    /// Pin a version on an existing assignment; `None` or an empty id
    /// clears the pin. Returns `false` without writing when there is no
    /// assignment, or when the version does not belong to the document.
    pub async fn pin_version(
        &self,
        character_id: &str,
        doc_id: &str,
        version_id: Option<&str>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(mut assignment) = fetch_assignment(&mut tx, character_id, doc_id).await? else {
            return Ok(false);
        };

        let pinned = non_empty_id(version_id);
        if let Some(version_id) = &pinned {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT doc_id FROM versions WHERE id = ?")
                    .bind(version_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if owner.as_deref() != Some(doc_id) {
                warn!(
                    character_id = %character_id,
                    doc_id = %doc_id,
                    version_id = %version_id,
                    "refusing to pin a version of another document"
                );
                return Ok(false);
            }
        }

        assignment.pinned_version_id = pinned;
        sqlx::query("UPDATE associations SET pinned_version_id = ?, updated_at = ? WHERE id = ?")
            .bind(&assignment.pinned_version_id)
            .bind(Utc::now().timestamp_millis())
            .bind(&assignment.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn get(&self, character_id: &str, doc_id: &str) -> Result<Option<Assignment>> {
        let mut conn = self.pool.acquire().await?;
        fetch_assignment(&mut conn, character_id, doc_id).await
    }

    /// A character's assignments in the order they were made.
    pub async fn list_for_character(&self, character_id: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM associations WHERE character_id = ? ORDER BY created_at ASC, rowid ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(character_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    pub async fn list_all(&self) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM associations ORDER BY character_id ASC, created_at ASC, rowid ASC",
            ASSIGNMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    /// Number of characters each document is assigned to.
    pub async fn usage_counts(&self) -> Result<HashMap<String, usize>> {
        let rows = sqlx::query("SELECT doc_id, COUNT(*) AS uses FROM associations GROUP BY doc_id")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = HashMap::new();
        for row in rows {
            let doc_id: String = row.try_get("doc_id")?;
            let uses: i64 = row.try_get("uses")?;
            counts.insert(doc_id, uses.max(0) as usize);
        }
        Ok(counts)
    }
}

async fn fetch_assignment(
    conn: &mut SqliteConnection,
    character_id: &str,
    doc_id: &str,
) -> Result<Option<Assignment>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM associations WHERE character_id = ? AND doc_id = ?",
        ASSIGNMENT_COLUMNS
    ))
    .bind(character_id)
    .bind(doc_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(assignment_from_row).transpose()
}

pub(crate) async fn put_assignment(
    conn: &mut SqliteConnection,
    assignment: &Assignment,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO associations ({}) VALUES (?, ?, ?, ?, ?, ?)",
        ASSIGNMENT_COLUMNS
    ))
    .bind(&assignment.id)
    .bind(&assignment.character_id)
    .bind(&assignment.doc_id)
    .bind(&assignment.pinned_version_id)
    .bind(assignment.created_at.timestamp_millis())
    .bind(assignment.updated_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) fn assignment_from_row(row: &SqliteRow) -> Result<Assignment> {
    Ok(Assignment {
        id: row.try_get("id")?,
        character_id: row.try_get("character_id")?,
        doc_id: row.try_get("doc_id")?,
        pinned_version_id: row.try_get("pinned_version_id")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, IncomingFile, ReprocessOptions};

    async fn setup() -> (tempfile::TempDir, DocumentStore, AssignmentRegistry) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("assign.sqlite"))
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (
            tmp,
            DocumentStore::new(pool.clone()),
            AssignmentRegistry::new(pool),
        )
    }

    #[test]
    fn badges() {
        assert_eq!(badge_text(true, 3), "active | shared");
        assert_eq!(badge_text(true, 1), "active | character-exclusive");
        assert_eq!(badge_text(false, 2), "shared");
        assert_eq!(badge_text(false, 0), "character-exclusive");
    }

    #[tokio::test]
    async fn assign_is_idempotent() {
        let (_tmp, store, registry) = setup().await;
        let doc = store
            .add_document(&IncomingFile::new("a.md", "Alpha."))
            .await
            .unwrap();

        assert!(registry.assign("mira", &doc.id).await.unwrap());
        assert!(registry.assign("mira", &doc.id).await.unwrap());
        assert!(registry.assign("oren", &doc.id).await.unwrap());
        assert!(!registry.assign("mira", "doc-missing").await.unwrap());

        let mira = registry.list_for_character("mira").await.unwrap();
        assert_eq!(mira.len(), 1);
        assert_eq!(mira[0].id, assignment_id("mira", &doc.id));
        assert_eq!(registry.usage_counts().await.unwrap()[&doc.id], 2);

        assert!(registry.unassign("mira", &doc.id).await.unwrap());
        assert!(!registry.unassign("mira", &doc.id).await.unwrap());
        assert!(registry.list_for_character("mira").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pin_requires_assignment_and_matching_version() {
        let (_tmp, store, registry) = setup().await;
        let a = store
            .add_document(&IncomingFile::new("a.md", "Alpha."))
            .await
            .unwrap();
        let b = store
            .add_document(&IncomingFile::new("b.md", "Beta."))
            .await
            .unwrap();
        let va = store
            .reprocess(&a.id, &ReprocessOptions::default())
            .await
            .unwrap();
        let vb = store
            .reprocess(&b.id, &ReprocessOptions::default())
            .await
            .unwrap();

        assert!(!registry
            .pin_version("mira", &a.id, Some(&va.version_id))
            .await
            .unwrap());

        registry.assign("mira", &a.id).await.unwrap();
        assert!(!registry
            .pin_version("mira", &a.id, Some(&vb.version_id))
            .await
            .unwrap());
        assert!(registry
            .get("mira", &a.id)
            .await
            .unwrap()
            .unwrap()
            .pinned_version_id
            .is_none());

        assert!(registry
            .pin_version("mira", &a.id, Some(&va.version_id))
            .await
            .unwrap());
        let pinned = registry.get("mira", &a.id).await.unwrap().unwrap();
        assert_eq!(pinned.pinned_version_id.as_deref(), Some(va.version_id.as_str()));

        assert!(registry.pin_version("mira", &a.id, Some("")).await.unwrap());
        assert!(!registry.get("mira", &a.id).await.unwrap().unwrap().is_pinned());
    }

    #[tokio::test]
    async fn list_all_orders_by_character_then_assignment() {
        let (_tmp, store, registry) = setup().await;
        let a = store
            .add_document(&IncomingFile::new("a.md", "Alpha."))
            .await
            .unwrap();
        let b = store
            .add_document(&IncomingFile::new("b.md", "Beta."))
            .await
            .unwrap();

        registry.assign("oren", &b.id).await.unwrap();
        registry.assign("mira", &b.id).await.unwrap();
        registry.assign("oren", &a.id).await.unwrap();
        registry.assign("mira", &a.id).await.unwrap();

        let all: Vec<(String, String)> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|x| (x.character_id, x.doc_id))
            .collect();
        assert_eq!(
            all,
            vec![
                ("mira".to_string(), b.id.clone()),
                ("mira".to_string(), a.id.clone()),
                ("oren".to_string(), b.id.clone()),
                ("oren".to_string(), a.id.clone()),
            ]
        );

        let counts = registry.usage_counts().await.unwrap();
        assert_eq!(counts[&a.id], 2);
        assert_eq!(counts[&b.id], 2);
    }
}
