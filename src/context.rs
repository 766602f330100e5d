//! Context assembly for a character.
//!
//! [`ContextEngine::context_bundle`] loads the character's assignments and
//! resolves each document's source text through a caller-owned
//! [`SourceCache`]. The candidates are then ranked and packed under a
//! token budget.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::assign::AssignmentRegistry;
use crate::budget::{allocate, ContextBundle};
use crate::config::Config;
use crate::models::Document;
use crate::rank::{Candidate, RankPath, Ranker};
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SourceKey {
    Version { doc_id: String, version_id: String },
    Unversioned { doc_id: String, updated_at: i64 },
}

/// Session-scoped cache of resolved source text.
///
/// Version snapshots never change, so they are keyed by document and
/// version id. A pointer to another document's version resolves to the
/// document's own text, so the document id is part of the key. Documents
/// without a version are keyed by id and `updated_at`, so any edit
/// produces a fresh entry.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<SourceKey, Arc<str>>,
    hits: u64,
    misses: u64,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    fn key_for(doc: &Document, pinned_version_id: Option<&str>) -> SourceKey {
        match pinned_version_id.or(doc.active_version_id.as_deref()) {
            Some(version_id) => SourceKey::Version {
                doc_id: doc.id.clone(),
                version_id: version_id.to_string(),
            },
            None => SourceKey::Unversioned {
                doc_id: doc.id.clone(),
                updated_at: doc.recency(),
            },
        }
    }

    async fn resolve(
        &mut self,
        store: &DocumentStore,
        doc: &Document,
        pinned_version_id: Option<&str>,
    ) -> Result<Arc<str>> {
        let key = Self::key_for(doc, pinned_version_id);
        if let Some(text) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(text));
        }
        self.misses += 1;
        let text: Arc<str> = store.resolve_source_text(doc, pinned_version_id).await?.into();
        self.entries.insert(key, Arc::clone(&text));
        Ok(text)
    }
}

/// One assigned document as listed for a character.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContextEntry {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub folder: String,
    pub pinned_version_id: Option<String>,
    pub active_version_id: Option<String>,
}

pub struct ContextEngine {
    store: DocumentStore,
    registry: AssignmentRegistry,
    ranker: Ranker,
}

impl ContextEngine {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self {
            store: DocumentStore::new(pool.clone()),
            registry: AssignmentRegistry::new(pool),
            ranker: Ranker::new(&config.ranking),
        }
    }

    pub fn with_ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn registry(&self) -> &AssignmentRegistry {
        &self.registry
    }

    /// Assigned, parseable documents paired with their pinned version.
    async fn assigned_documents(&self, character_id: &str) -> Result<Vec<(Document, Option<String>)>> {
        let assignments = self.registry.list_for_character(character_id).await?;
        let mut out = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let Some(doc) = self.store.get_document(&assignment.doc_id).await? else {
                continue;
            };
            if !doc.parse_status.is_usable() {
                continue;
            }
            out.push((doc, assignment.pinned_version_id));
        }
        Ok(out)
    }

    /// Ranked, budgeted context for a character and query. A character
    /// with no usable assignments gets an empty bundle.
    pub async fn context_bundle(
        &self,
        cache: &mut SourceCache,
        character_id: &str,
        query: &str,
        token_budget: usize,
        reserve_tokens: usize,
    ) -> Result<ContextBundle> {
        let assigned = self.assigned_documents(character_id).await?;

        let mut candidates = Vec::with_capacity(assigned.len());
        for (doc, pinned_version_id) in assigned {
            let text = cache
                .resolve(&self.store, &doc, pinned_version_id.as_deref())
                .await?;
            candidates.push(Candidate::new(doc, pinned_version_id.is_some(), text));
        }

        let ranking = self.ranker.rank(candidates, query).await;
        if let RankPath::Fallback(reason) = &ranking.path {
            debug!(character_id = %character_id, reason = %reason, "ranking fell back to inline scoring");
        }

        let bundle = allocate(&ranking.candidates, token_budget, reserve_tokens);
        info!(
            character_id = %character_id,
            candidates = ranking.candidates.len(),
            included = bundle.usage.docs.len(),
            used_tokens = bundle.usage.used_tokens,
            "context assembled"
        );
        Ok(bundle)
    }

    /// Assigned, parseable documents for a character in assignment order.
    pub async fn document_context(&self, character_id: &str) -> Result<Vec<DocumentContextEntry>> {
        Ok(self
            .assigned_documents(character_id)
            .await?
            .into_iter()
            .map(|(doc, pinned_version_id)| DocumentContextEntry {
                id: doc.id,
                name: doc.name,
                tags: doc.tags,
                folder: doc.folder,
                pinned_version_id,
                active_version_id: doc.active_version_id,
            })
            .collect())
    }
}
