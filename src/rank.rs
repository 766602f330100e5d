//! Relevance ranking of a character's assigned documents.
//!
//! A pinned assignment adds [`PINNED_BOOST`], and each query term found
//! anywhere in the document's name, folder, tags, or leading source text
//! adds one. Ties break on recency (newest first) and then on name.
//!
//! For larger candidate sets scoring can be handed to a
//! [`ScoringOffload`] unit, raced against a deadline. When the unit times
//! out, fails, is unavailable, or returns something that is not a
//! permutation of the input, the same computation runs inline. Both paths
//! produce the same order, so callers only learn which path was taken via
//! [`RankPath`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::config::RankingConfig;
use crate::models::Document;

/// Score added for a pinned assignment.
pub const PINNED_BOOST: u32 = 100;

/// Shortest query term that counts.
pub const MIN_TERM_CHARS: usize = 3;

/// Lowercase alphanumeric terms of at least [`MIN_TERM_CHARS`] characters,
/// de-duplicated in first-seen order and capped at `max_terms`.
pub fn query_terms(query: &str, max_terms: usize) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if terms.len() >= max_terms {
            break;
        }
        if raw.chars().count() < MIN_TERM_CHARS {
            continue;
        }
        if !terms.iter().any(|t| t == raw) {
            terms.push(raw.to_string());
        }
    }
    terms
}

/// An assigned document ready to be ranked and assembled.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Document,
    pub pinned: bool,
    /// Resolved text (pinned snapshot, active snapshot, or fallback).
    pub source_text: Arc<str>,
    pub score: u32,
}

impl Candidate {
    pub fn new(document: Document, pinned: bool, source_text: impl Into<Arc<str>>) -> Self {
        Self {
            document,
            pinned,
            source_text: source_text.into(),
            score: 0,
        }
    }
}

/// The owned, self-contained view of a candidate that crosses into an
/// offload unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub name: String,
    pub folder: String,
    pub tags: Vec<String>,
    /// Lowercased leading source text.
    pub snippet: String,
    pub recency: i64,
    pub pinned: bool,
}

impl CandidateSnapshot {
    pub fn from_candidate(candidate: &Candidate, snippet_chars: usize) -> Self {
        let leading: String = candidate.source_text.chars().take(snippet_chars).collect();
        Self {
            name: candidate.document.name.clone(),
            folder: candidate.document.folder.clone(),
            tags: candidate.document.tags.clone(),
            snippet: leading.to_lowercase(),
            recency: candidate.document.recency(),
            pinned: candidate.pinned,
        }
    }
}

/// Position in the input plus the computed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedIndex {
    pub index: usize,
    pub score: u32,
}

pub fn relevance_score(snapshot: &CandidateSnapshot, terms: &[String]) -> u32 {
    let base = if snapshot.pinned { PINNED_BOOST } else { 0 };
    if terms.is_empty() {
        return base;
    }
    let haystacks = [
        snapshot.name.to_lowercase(),
        snapshot.folder.to_lowercase(),
        snapshot.tags.join(" "),
        snapshot.snippet.clone(),
    ];
    let hits = terms
        .iter()
        .filter(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
        .count();
    base + hits as u32
}

fn compare_ranked(a: (&CandidateSnapshot, &RankedIndex), b: (&CandidateSnapshot, &RankedIndex)) -> Ordering {
    b.1.score
        .cmp(&a.1.score)
        .then(b.0.recency.cmp(&a.0.recency))
        .then_with(|| a.0.name.to_lowercase().cmp(&b.0.name.to_lowercase()))
        .then_with(|| a.0.name.cmp(&b.0.name))
        .then(a.1.index.cmp(&b.1.index))
}

/// Score and order snapshots. Returns `None` if `cancel` is raised while
/// scoring.
pub fn rank_snapshots(
    snapshots: &[CandidateSnapshot],
    terms: &[String],
    cancel: Option<&AtomicBool>,
) -> Option<Vec<RankedIndex>> {
    let mut ranked = Vec::with_capacity(snapshots.len());
    for (index, snapshot) in snapshots.iter().enumerate() {
        if cancel.is_some_and(|flag| flag.load(AtomicOrdering::Relaxed)) {
            return None;
        }
        ranked.push(RankedIndex {
            index,
            score: relevance_score(snapshot, terms),
        });
    }
    ranked.sort_by(|a, b| compare_ranked((&snapshots[a.index], a), (&snapshots[b.index], b)));
    Some(ranked)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffloadError {
    #[error("offload timed out after {0:?}")]
    Timeout(Duration),
    #[error("offload unavailable: {0}")]
    Unavailable(String),
    #[error("offload failed: {0}")]
    Failed(String),
    #[error("offload cancelled")]
    Cancelled,
}

/// A unit that scores snapshots away from the caller.
///
/// Implementations must stop promptly once `cancel` is raised; the ranker
/// raises it whenever it stops waiting.
#[async_trait]
pub trait ScoringOffload: Send + Sync {
    fn name(&self) -> &str;

    async fn rank(
        &self,
        snapshots: Vec<CandidateSnapshot>,
        terms: Vec<String>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Vec<RankedIndex>, OffloadError>;
}

/// Scores on tokio's blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingPoolOffload;

/// Raises the cancel flag and aborts the task when dropped, so a caller
/// that stops polling (timeout) still tears the task down.
struct TaskGuard {
    abort: AbortHandle,
    cancel: Arc<AtomicBool>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.cancel.store(true, AtomicOrdering::Relaxed);
        self.abort.abort();
    }
}

#[async_trait]
impl ScoringOffload for BlockingPoolOffload {
    fn name(&self) -> &str {
        "blocking-pool"
    }

    async fn rank(
        &self,
        snapshots: Vec<CandidateSnapshot>,
        terms: Vec<String>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Vec<RankedIndex>, OffloadError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| OffloadError::Unavailable(e.to_string()))?;
        let flag = Arc::clone(&cancel);
        let task = handle.spawn_blocking(move || rank_snapshots(&snapshots, &terms, Some(&*flag)));
        let _guard = TaskGuard {
            abort: task.abort_handle(),
            cancel,
        };

        match task.await {
            Ok(Some(order)) => Ok(order),
            Ok(None) => Err(OffloadError::Cancelled),
            Err(e) => Err(OffloadError::Failed(e.to_string())),
        }
    }
}

/// Which path produced a ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankPath {
    /// Below the offload threshold, or no unit configured.
    Inline,
    Offloaded,
    /// The unit was tried and abandoned.
    Fallback(OffloadError),
}

#[derive(Debug, Clone)]
pub struct Ranking {
    pub candidates: Vec<Candidate>,
    pub path: RankPath,
}

pub struct Ranker {
    offload: Option<Arc<dyn ScoringOffload>>,
    threshold: usize,
    timeout: Duration,
    snippet_chars: usize,
    max_terms: usize,
}

impl Ranker {
    pub fn new(config: &RankingConfig) -> Self {
        let offload: Option<Arc<dyn ScoringOffload>> = if config.offload_enabled {
            Some(Arc::new(BlockingPoolOffload))
        } else {
            None
        };
        Self {
            offload,
            threshold: config.offload_threshold,
            timeout: config.offload_timeout(),
            snippet_chars: config.snippet_chars,
            max_terms: config.max_terms,
        }
    }

    pub fn with_offload(mut self, offload: Arc<dyn ScoringOffload>) -> Self {
        self.offload = Some(offload);
        self
    }

    pub fn without_offload(mut self) -> Self {
        self.offload = None;
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn snapshots(&self, candidates: &[Candidate]) -> Vec<CandidateSnapshot> {
        candidates
            .iter()
            .map(|c| CandidateSnapshot::from_candidate(c, self.snippet_chars))
            .collect()
    }

    /// Rank inline, without consulting any offload unit.
    pub fn rank_sync(&self, candidates: Vec<Candidate>, query: &str) -> Vec<Candidate> {
        let terms = query_terms(query, self.max_terms);
        let snapshots = self.snapshots(&candidates);
        let order = rank_snapshots(&snapshots, &terms, None).unwrap_or_default();
        apply_order(candidates, &order)
    }

    /// Rank, offloading when the candidate count reaches the threshold.
    pub async fn rank(&self, candidates: Vec<Candidate>, query: &str) -> Ranking {
        let offload = match &self.offload {
            Some(offload) if candidates.len() >= self.threshold => Arc::clone(offload),
            _ => {
                return Ranking {
                    candidates: self.rank_sync(candidates, query),
                    path: RankPath::Inline,
                }
            }
        };

        let terms = query_terms(query, self.max_terms);
        let snapshots = self.snapshots(&candidates);
        let cancel = Arc::new(AtomicBool::new(false));

        let outcome = tokio::time::timeout(
            self.timeout,
            offload.rank(snapshots.clone(), terms.clone(), Arc::clone(&cancel)),
        )
        .await;
        cancel.store(true, AtomicOrdering::Relaxed);

        let error = match outcome {
            Ok(Ok(order)) if is_permutation(&order, candidates.len()) => {
                debug!(unit = offload.name(), candidates = candidates.len(), "ranked by offload");
                return Ranking {
                    candidates: apply_order(candidates, &order),
                    path: RankPath::Offloaded,
                };
            }
            Ok(Ok(order)) => OffloadError::Failed(format!(
                "returned {} indices that are not a permutation of {}",
                order.len(),
                candidates.len()
            )),
            Ok(Err(e)) => e,
            Err(_) => OffloadError::Timeout(self.timeout),
        };

        match &error {
            OffloadError::Timeout(limit) => warn!(
                unit = offload.name(),
                timeout_ms = limit.as_millis() as u64,
                "offload timed out, ranking inline"
            ),
            other => warn!(unit = offload.name(), error = %other, "offload failed, ranking inline"),
        }

        let order = rank_snapshots(&snapshots, &terms, None).unwrap_or_default();
        Ranking {
            candidates: apply_order(candidates, &order),
            path: RankPath::Fallback(error),
        }
    }
}

fn is_permutation(order: &[RankedIndex], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for entry in order {
        match seen.get_mut(entry.index) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

fn apply_order(candidates: Vec<Candidate>, order: &[RankedIndex]) -> Vec<Candidate> {
    let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|entry| {
            let mut candidate = slots.get_mut(entry.index)?.take()?;
            candidate.score = entry.score;
            Some(candidate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn candidate(name: &str, tags: &[&str], text: &str, pinned: bool, updated_ms: i64) -> Candidate {
        let document = Document {
            id: format!("doc-{}", name),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            updated_at: Utc.timestamp_millis_opt(updated_ms).unwrap(),
            ..Default::default()
        };
        Candidate::new(document, pinned, text)
    }

    fn names(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.document.name.as_str()).collect()
    }

    fn many_candidates() -> Vec<Candidate> {
        (0..12)
            .map(|i| {
                let text = if i % 3 == 0 {
                    "The dragon guards the northern pass."
                } else {
                    "Market prices and harbor taxes."
                };
                candidate(&format!("doc{:02}", i), &[], text, i == 7, 1_000 + (i % 4) as i64)
            })
            .collect()
    }

    fn ranker() -> Ranker {
        Ranker::new(&RankingConfig::default())
    }

    struct StallingOffload {
        seen_cancel: Mutex<Option<Arc<AtomicBool>>>,
    }

    #[async_trait]
    impl ScoringOffload for StallingOffload {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn rank(
            &self,
            _snapshots: Vec<CandidateSnapshot>,
            _terms: Vec<String>,
            cancel: Arc<AtomicBool>,
        ) -> Result<Vec<RankedIndex>, OffloadError> {
            *self.seen_cancel.lock().unwrap() = Some(cancel);
            std::future::pending().await
        }
    }

    struct FailingOffload;

    #[async_trait]
    impl ScoringOffload for FailingOffload {
        fn name(&self) -> &str {
            "failing"
        }

        async fn rank(
            &self,
            _snapshots: Vec<CandidateSnapshot>,
            _terms: Vec<String>,
            _cancel: Arc<AtomicBool>,
        ) -> Result<Vec<RankedIndex>, OffloadError> {
            Err(OffloadError::Failed("worker crashed".to_string()))
        }
    }

    struct DuplicatingOffload;

    #[async_trait]
    impl ScoringOffload for DuplicatingOffload {
        fn name(&self) -> &str {
            "duplicating"
        }

        async fn rank(
            &self,
            snapshots: Vec<CandidateSnapshot>,
            _terms: Vec<String>,
            _cancel: Arc<AtomicBool>,
        ) -> Result<Vec<RankedIndex>, OffloadError> {
            Ok(vec![RankedIndex { index: 0, score: 1 }; snapshots.len()])
        }
    }

    #[test]
    fn terms_are_lowercased_deduped_and_capped() {
        assert_eq!(
            query_terms("Where's the DRAGON? the dragon's lair, ok", 24),
            vec!["where", "the", "dragon", "lair"]
        );
        let long: String = (0..40).map(|i| format!("term{} ", i)).collect();
        assert_eq!(query_terms(&long, 24).len(), 24);
        assert!(query_terms("a an to", 24).is_empty());
    }

    #[test]
    fn score_counts_term_presence_once() {
        let c = candidate("Dragon Lore", &["beasts"], "dragon dragon dragon", false, 0);
        let snapshot = CandidateSnapshot::from_candidate(&c, 2400);
        let terms = query_terms("dragon beasts unicorn", 24);
        assert_eq!(relevance_score(&snapshot, &terms), 2);
    }

    #[test]
    fn snippet_limits_searched_text() {
        let text = format!("{} needle", "x".repeat(3000));
        let c = candidate("haystack", &[], &text, false, 0);
        let snapshot = CandidateSnapshot::from_candidate(&c, 2400);
        assert_eq!(relevance_score(&snapshot, &["needle".to_string()]), 0);
    }

    #[test]
    fn pinned_zero_score_beats_unpinned_five() {
        let unpinned = candidate(
            "busy",
            &[],
            "alpha bravo charlie delta echo",
            false,
            9_999,
        );
        let pinned = candidate("quiet", &[], "nothing relevant", true, 1);
        let ranked = ranker().rank_sync(vec![unpinned, pinned], "alpha bravo charlie delta echo");
        assert_eq!(names(&ranked), vec!["quiet", "busy"]);
        assert_eq!(ranked[0].score, PINNED_BOOST);
        assert_eq!(ranked[1].score, 5);
    }

    #[test]
    fn pinned_first_with_empty_query() {
        let ranked = ranker().rank_sync(
            vec![
                candidate("a", &[], "x", false, 5),
                candidate("b", &[], "x", true, 1),
            ],
            "",
        );
        assert_eq!(names(&ranked), vec!["b", "a"]);
    }

    #[test]
    fn ties_break_on_recency_then_name() {
        let ranked = ranker().rank_sync(
            vec![
                candidate("Beta", &[], "x", false, 10),
                candidate("alpha", &[], "x", false, 10),
                candidate("Gamma", &[], "x", false, 20),
            ],
            "unrelated",
        );
        assert_eq!(names(&ranked), vec!["Gamma", "alpha", "Beta"]);
    }

    #[tokio::test]
    async fn below_threshold_ranks_inline() {
        let ranking = ranker()
            .rank(vec![candidate("a", &[], "x", false, 1)], "x")
            .await;
        assert_eq!(ranking.path, RankPath::Inline);
        assert_eq!(ranking.candidates.len(), 1);
    }

    #[tokio::test]
    async fn threshold_and_disabled_offload_choose_the_path() {
        let ranking = ranker().without_offload().rank(many_candidates(), "dragon").await;
        assert_eq!(ranking.path, RankPath::Inline);

        let ranking = ranker().with_threshold(100).rank(many_candidates(), "dragon").await;
        assert_eq!(ranking.path, RankPath::Inline);

        let ranking = ranker()
            .with_threshold(1)
            .rank(vec![candidate("solo", &[], "dragon", false, 1)], "dragon")
            .await;
        assert_eq!(ranking.path, RankPath::Offloaded);
        assert_eq!(ranking.candidates[0].score, 1);
    }

    #[tokio::test]
    async fn offloaded_order_matches_inline() {
        let expected = names(&ranker().rank_sync(many_candidates(), "dragon pass"))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let ranking = ranker().rank(many_candidates(), "dragon pass").await;
        assert_eq!(ranking.path, RankPath::Offloaded);
        assert_eq!(names(&ranking.candidates), expected);
        assert_eq!(ranking.candidates[0].document.name, "doc07");
    }

    #[tokio::test]
    async fn stalled_offload_times_out_and_is_cancelled() {
        let stalling = Arc::new(StallingOffload {
            seen_cancel: Mutex::new(None),
        });
        let ranker = ranker()
            .with_offload(stalling.clone())
            .with_timeout(Duration::from_millis(50));
        let expected: Vec<String> = names(&ranker.rank_sync(many_candidates(), "dragon"))
            .into_iter()
            .map(String::from)
            .collect();

        let ranking = ranker.rank(many_candidates(), "dragon").await;
        assert_eq!(
            ranking.path,
            RankPath::Fallback(OffloadError::Timeout(Duration::from_millis(50)))
        );
        assert_eq!(names(&ranking.candidates), expected);

        let flag = stalling.seen_cancel.lock().unwrap().clone().unwrap();
        assert!(flag.load(AtomicOrdering::Relaxed));
    }

    #[tokio::test]
    async fn failing_or_invalid_offload_falls_back() {
        let expected: Vec<String> = names(&ranker().rank_sync(many_candidates(), "harbor"))
            .into_iter()
            .map(String::from)
            .collect();

        let failing = ranker().with_offload(Arc::new(FailingOffload));
        let ranking = failing.rank(many_candidates(), "harbor").await;
        assert!(matches!(ranking.path, RankPath::Fallback(OffloadError::Failed(_))));
        assert_eq!(names(&ranking.candidates), expected);

        let duplicating = ranker().with_offload(Arc::new(DuplicatingOffload));
        let ranking = duplicating.rank(many_candidates(), "harbor").await;
        assert!(matches!(ranking.path, RankPath::Fallback(OffloadError::Failed(_))));
        assert_eq!(ranking.candidates.len(), 12);
        assert_eq!(names(&ranking.candidates), expected);
    }

    #[test]
    fn cancelled_scoring_stops() {
        let snapshots = ranker().snapshots(&many_candidates());
        let flag = AtomicBool::new(true);
        assert!(rank_snapshots(&snapshots, &[], Some(&flag)).is_none());
    }

    #[test]
    fn permutation_check() {
        let ok = [RankedIndex { index: 1, score: 0 }, RankedIndex { index: 0, score: 0 }];
        assert!(is_permutation(&ok, 2));
        assert!(!is_permutation(&ok, 3));
        let out_of_range = [RankedIndex { index: 2, score: 0 }, RankedIndex { index: 0, score: 0 }];
        assert!(!is_permutation(&out_of_range, 2));
    }
}
