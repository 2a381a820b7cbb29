//! Feedback collector & weight store: closes the loop between predicted
//! routes and user-visible behavior, mutating per-user keyword weights
//! under concurrent load (spec §4.4, C4).
//!
//! Two `WeightStore` implementations are interchangeable via dependency
//! injection: an in-memory map and a `redb`-backed persistent store. The
//! `FeedbackCollector` does not depend on which flavor is injected.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::FeedbackError;
use crate::store::durable::DurableStore;
use crate::types::{clamp_weight, FeedbackKind, RouterFeedback, MAX_WEIGHT};

/// user → category → keyword → weight.
pub type UserWeights = HashMap<String, HashMap<String, u8>>;

/// Interface for reading/writing per-user keyword weights and recording
/// feedback statistics (spec §4.4, Weight Store contract).
pub trait WeightStore: Send + Sync {
    /// Defensive copy of a user's weight table (absence ⇒ empty map; caller
    /// falls back to static defaults per keyword).
    fn get_weights(&self, user_id: i64) -> UserWeights;

    fn save_weights(&self, user_id: i64, weights: UserWeights);

    /// Record one feedback event for statistics purposes (accuracy windowing).
    fn record_feedback(&self, feedback: &RouterFeedback);

    /// Accuracy and breakdowns over a sliding window of the most recent
    /// `window` feedback records for `user_id`.
    fn get_stats(&self, user_id: i64, window: usize) -> FeedbackStats;
}

/// Accuracy = correct / total over a sliding window, with breakdowns by
/// intent and by source (spec §4.4, Statistics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackStats {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub by_intent: HashMap<String, (usize, usize)>,
    pub by_source: HashMap<String, (usize, usize)>,
}

fn compute_stats(records: &[RouterFeedback]) -> FeedbackStats {
    let mut stats = FeedbackStats::default();
    stats.total = records.len();
    for r in records {
        let correct = r.predicted_intent == r.actual_intent;
        if correct {
            stats.correct += 1;
        }
        let intent_entry = stats.by_intent.entry(r.predicted_intent.to_string()).or_insert((0, 0));
        intent_entry.0 += 1;
        if correct {
            intent_entry.1 += 1;
        }
        let source_entry = stats.by_source.entry(r.source.as_str().to_string()).or_insert((0, 0));
        source_entry.0 += 1;
        if correct {
            source_entry.1 += 1;
        }
    }
    stats.accuracy = if stats.total == 0 {
        0.0
    } else {
        stats.correct as f64 / stats.total as f64
    };
    stats
}

struct MemInner {
    weights: HashMap<i64, UserWeights>,
    history: HashMap<i64, Vec<RouterFeedback>>,
}

/// In-memory `WeightStore` guarded by a single reader/writer lock; writes
/// operate on the innermost keyword map only (spec §5, Shared-resource policy).
pub struct InMemoryWeightStore {
    inner: RwLock<MemInner>,
}

impl InMemoryWeightStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemInner {
                weights: HashMap::new(),
                history: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryWeightStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightStore for InMemoryWeightStore {
    fn get_weights(&self, user_id: i64) -> UserWeights {
        self.inner
            .read()
            .expect("weight store lock poisoned")
            .weights
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn save_weights(&self, user_id: i64, weights: UserWeights) {
        self.inner
            .write()
            .expect("weight store lock poisoned")
            .weights
            .insert(user_id, weights);
    }

    fn record_feedback(&self, feedback: &RouterFeedback) {
        self.inner
            .write()
            .expect("weight store lock poisoned")
            .history
            .entry(feedback.user_id)
            .or_default()
            .push(feedback.clone());
    }

    fn get_stats(&self, user_id: i64, window: usize) -> FeedbackStats {
        let inner = self.inner.read().expect("weight store lock poisoned");
        let Some(history) = inner.history.get(&user_id) else {
            return FeedbackStats::default();
        };
        let start = history.len().saturating_sub(window);
        compute_stats(&history[start..])
    }
}

const WEIGHTS_PREFIX: &[u8] = b"weights:";
const HISTORY_PREFIX: &[u8] = b"history:";

/// Persistent `WeightStore` backed by `redb` (spec §4.4, (b) persistent store).
pub struct RedbWeightStore {
    db: DurableStore,
}

impl RedbWeightStore {
    pub fn open(data_dir: &Path) -> Result<Self, FeedbackError> {
        let db = DurableStore::open(data_dir).map_err(|e| FeedbackError::StoreBackend {
            message: e.to_string(),
        })?;
        Ok(Self { db })
    }

    fn weights_key(user_id: i64) -> Vec<u8> {
        [WEIGHTS_PREFIX, user_id.to_be_bytes().as_slice()].concat()
    }

    fn history_key(user_id: i64, seq: u64) -> Vec<u8> {
        [HISTORY_PREFIX, user_id.to_be_bytes().as_slice(), seq.to_be_bytes().as_slice()].concat()
    }
}

impl WeightStore for RedbWeightStore {
    fn get_weights(&self, user_id: i64) -> UserWeights {
        self.db
            .get(&Self::weights_key(user_id))
            .ok()
            .flatten()
            .and_then(|bytes| bincode::deserialize(&bytes).ok())
            .unwrap_or_default()
    }

    fn save_weights(&self, user_id: i64, weights: UserWeights) {
        if let Ok(bytes) = bincode::serialize(&weights) {
            let _ = self.db.put(&Self::weights_key(user_id), &bytes);
        }
    }

    fn record_feedback(&self, feedback: &RouterFeedback) {
        let prefix_len = HISTORY_PREFIX.len() + 8;
        let seq = self
            .db
            .scan_prefix(&Self::history_key(feedback.user_id, 0)[..prefix_len])
            .map(|v| v.len() as u64)
            .unwrap_or(0);
        if let Ok(bytes) = bincode::serialize(feedback) {
            let _ = self.db.put(&Self::history_key(feedback.user_id, seq), &bytes);
        }
    }

    fn get_stats(&self, user_id: i64, window: usize) -> FeedbackStats {
        let prefix_len = HISTORY_PREFIX.len() + 8;
        let mut records: Vec<RouterFeedback> = self
            .db
            .scan_prefix(&Self::history_key(user_id, 0)[..prefix_len])
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(_, v)| bincode::deserialize(&v).ok())
            .collect();
        records.sort_by_key(|r| r.timestamp);
        let start = records.len().saturating_sub(window);
        compute_stats(&records[start..])
    }
}

/// Serializable wire form of a weight delta applied by the collector.
#[derive(Debug, Clone)]
struct Adjustment {
    user_id: i64,
    category: String,
    keyword: String,
    delta: i64,
}

/// Static defaults consulted when a keyword has no recorded weight yet
/// (spec §4.4, Bounds: "an old weight of 0 is treated as the static default").
pub trait StaticWeightDefaults: Send + Sync {
    fn default_weight(&self, category: &str, keyword: &str) -> u8;
}

/// Flat default of the mid-point weight (3) for every keyword, used when no
/// richer static config collaborator is injected.
pub struct FlatDefaults(pub u8);

impl StaticWeightDefaults for FlatDefaults {
    fn default_weight(&self, _category: &str, _keyword: &str) -> u8 {
        self.0
    }
}

impl Default for FlatDefaults {
    fn default() -> Self {
        Self(3)
    }
}

/// Observes routing outcomes and adjusts per-user keyword weights
/// (spec §4.4, C4). The queued async-drain path is canonical (spec §9,
/// Open Questions); a synchronous fallback applies under channel backpressure
/// so feedback is never lost.
pub struct FeedbackCollector {
    store: std::sync::Arc<dyn WeightStore>,
    defaults: Box<dyn StaticWeightDefaults>,
    tx: mpsc::Sender<Adjustment>,
}

pub const ADJUSTMENT_QUEUE_CAPACITY: usize = 100;

impl FeedbackCollector {
    /// Construct the collector and spawn its background drain worker under
    /// the given lifecycle task group.
    ///
    /// `store` is an `Arc` (not owned outright) so the same weight store can
    /// be shared with the router's read-only weight lookups (spec §4.1,
    /// Weight-aware matching) while the collector holds the writer side.
    pub fn new(
        store: std::sync::Arc<dyn WeightStore>,
        defaults: Box<dyn StaticWeightDefaults>,
        lifecycle: &crate::lifecycle::LifecycleManager,
    ) -> std::sync::Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<Adjustment>(ADJUSTMENT_QUEUE_CAPACITY);
        let collector = std::sync::Arc::new(Self { store, defaults, tx });
        let worker_collector = std::sync::Arc::clone(&collector);
        lifecycle.spawn_tracked("feedback-drain", async move {
            while let Some(adjustment) = rx.recv().await {
                worker_collector.apply(adjustment);
            }
        });
        collector
    }

    /// Single ingress: record feedback, persist best-effort, then dispatch
    /// the weight adjustment. Persistence failure never blocks adjustment.
    pub fn record(&self, feedback: RouterFeedback) {
        self.store.record_feedback(&feedback);

        let deltas = self.deltas_for(&feedback);
        for (category, keyword, delta) in deltas {
            let adjustment = Adjustment {
                user_id: feedback.user_id,
                category,
                keyword,
                delta,
            };
            match self.tx.try_send(adjustment) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(adjustment)) => {
                    debug!(user_id = feedback.user_id, "feedback queue full, applying synchronously");
                    self.apply(adjustment);
                }
                Err(mpsc::error::TrySendError::Closed(adjustment)) => {
                    debug!(user_id = feedback.user_id, "feedback queue closed, applying synchronously");
                    self.apply(adjustment);
                }
            }
        }
    }

    /// Compute the (category, keyword, delta) triples for one feedback event
    /// (spec §4.4, per-kind policy).
    fn deltas_for(&self, feedback: &RouterFeedback) -> Vec<(String, String, i64)> {
        let utterance_lower = feedback.utterance.to_lowercase();
        let predicted_category = feedback.predicted_intent.as_str().split('_').next().unwrap_or("").to_string();
        let actual_category = feedback.actual_intent.as_str().split('_').next().unwrap_or("").to_string();

        match feedback.kind {
            FeedbackKind::Switch => {
                let mut deltas = Vec::new();
                for kw in self.keywords_present(&predicted_category, &utterance_lower) {
                    deltas.push((predicted_category.clone(), kw, -2));
                }
                for kw in self.keywords_present(&actual_category, &utterance_lower) {
                    deltas.push((actual_category.clone(), kw, 2));
                }
                deltas
            }
            FeedbackKind::Rephrase => {
                let mut deltas = Vec::new();
                for kw in self.keywords_present(&predicted_category, &utterance_lower) {
                    deltas.push((predicted_category.clone(), kw, -1));
                }
                for kw in self.keywords_present(&actual_category, &utterance_lower) {
                    deltas.push((actual_category.clone(), kw, 1));
                }
                deltas
            }
            FeedbackKind::Positive => {
                if feedback.predicted_intent == feedback.actual_intent {
                    self.keywords_present(&predicted_category, &utterance_lower)
                        .into_iter()
                        .map(|kw| (predicted_category.clone(), kw, 1))
                        .collect()
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Placeholder keyword extraction: in production this consults the same
    /// `CapabilitySource` the router's rule matcher used. Here we take any
    /// non-trivial whitespace/punctuation-delimited token present in the
    /// utterance as a candidate keyword for the category, capped to avoid
    /// unbounded weight churn on long utterances.
    fn keywords_present(&self, category: &str, utterance_lower: &str) -> Vec<String> {
        if category.is_empty() {
            return Vec::new();
        }
        utterance_lower
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|tok| !tok.is_empty())
            .map(|tok| tok.to_string())
            .take(8)
            .collect()
    }

    fn apply(&self, adjustment: Adjustment) {
        let mut weights = self.store.get_weights(adjustment.user_id);
        let category_map = weights.entry(adjustment.category.clone()).or_default();
        let base = *category_map.get(&adjustment.keyword).unwrap_or(&0);
        let effective_base = if base == 0 {
            self.defaults.default_weight(&adjustment.category, &adjustment.keyword) as i64
        } else {
            base as i64
        };
        let new_weight = clamp_weight(effective_base, adjustment.delta);
        category_map.insert(adjustment.keyword.clone(), new_weight);
        self.store.save_weights(adjustment.user_id, weights);
    }

    pub fn stats(&self, user_id: i64, window: usize) -> FeedbackStats {
        self.store.get_stats(user_id, window)
    }
}

#[allow(dead_code)]
pub const WEIGHT_CEILING: u8 = MAX_WEIGHT;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleManager;
    use crate::types::RouteSource;

    fn feedback(kind: FeedbackKind, predicted: crate::types::Intent, actual: crate::types::Intent) -> RouterFeedback {
        RouterFeedback::new(42, "提醒我明天开会", predicted, actual, kind, RouteSource::Rule)
    }

    #[tokio::test]
    async fn switch_decrements_losing_increments_winning() {
        let lifecycle = LifecycleManager::new();
        let collector = FeedbackCollector::new(
            std::sync::Arc::new(InMemoryWeightStore::new()),
            Box::new(FlatDefaults(2)),
            &lifecycle,
        );
        collector.record(feedback(
            FeedbackKind::Switch,
            crate::types::Intent::ScheduleCreate,
            crate::types::Intent::MemoSearch,
        ));
        lifecycle.shutdown().await;
        let weights = collector.store.get_weights(42);
        let schedule = weights.get("schedule").expect("schedule category touched");
        assert!(schedule.values().all(|&w| w == 1), "2-2 saturates at floor 1");
        let memo = weights.get("memo").expect("memo category touched");
        assert!(memo.values().all(|&w| w == MAX_WEIGHT || w == 4), "2+2 within bounds");
    }

    #[tokio::test]
    async fn weights_never_leave_bounds() {
        let lifecycle = LifecycleManager::new();
        let collector = FeedbackCollector::new(
            std::sync::Arc::new(InMemoryWeightStore::new()),
            Box::new(FlatDefaults(5)),
            &lifecycle,
        );
        for _ in 0..5 {
            collector.record(feedback(
                FeedbackKind::Switch,
                crate::types::Intent::ScheduleCreate,
                crate::types::Intent::MemoSearch,
            ));
        }
        lifecycle.shutdown().await;
        let weights = collector.store.get_weights(42);
        for category in weights.values() {
            for &w in category.values() {
                assert!((1..=5).contains(&w));
            }
        }
    }

    #[test]
    fn redb_weight_store_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = RedbWeightStore::open(dir.path()).unwrap();
            let mut weights = UserWeights::new();
            weights.insert("schedule".into(), HashMap::from([("会议".to_string(), 4u8)]));
            store.save_weights(7, weights);
        }
        let store = RedbWeightStore::open(dir.path()).unwrap();
        let weights = store.get_weights(7);
        assert_eq!(weights.get("schedule").unwrap().get("会议"), Some(&4));
    }

    #[test]
    fn stats_window_limits_history() {
        let store = InMemoryWeightStore::new();
        for i in 0..10 {
            let intent = if i % 2 == 0 {
                crate::types::Intent::ScheduleCreate
            } else {
                crate::types::Intent::MemoSearch
            };
            store.record_feedback(&RouterFeedback::new(
                1,
                "x",
                crate::types::Intent::ScheduleCreate,
                intent,
                FeedbackKind::Positive,
                RouteSource::Rule,
            ));
        }
        let stats = store.get_stats(1, 4);
        assert_eq!(stats.total, 4);
    }
}
