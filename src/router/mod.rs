//! Intent Router (C1): L0 fingerprint cache → L1 rule match → L2 registry
//! disambiguation → L3 optional semantic fallback (spec §4.1).

pub mod rule_matcher;
pub mod semantic;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::RoutingCache;
use crate::capability::CapabilitySource;
use crate::error::RouterError;
use crate::feedback::WeightStore;
use crate::lifecycle::LifecycleManager;
use crate::registry::IntentRegistry;
use crate::router::rule_matcher::{contains_conjunction_marker, rule_match};
use crate::router::semantic::{SemanticMatcher, NoSemanticMatcher, SEMANTIC_CONFIDENCE_THRESHOLD};
use crate::types::{Intent, RouteSource, RoutingDecision, Utterance};

/// External collaborator that persists routing history (spec §4.1, step 6:
/// "schedule a background write ... with a 5-second deadline"). Kept as a
/// trait so the router core has no concrete persistence dependency.
pub trait HistorySink: Send + Sync {
    fn record<'a>(
        &'a self,
        user_id: i64,
        utterance: &'a str,
        decision: &'a RoutingDecision,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>;
}

/// No-op history sink used when no persistence collaborator is injected.
pub struct NullHistorySink;

impl HistorySink for NullHistorySink {
    fn record<'a>(
        &'a self,
        _user_id: i64,
        _utterance: &'a str,
        _decision: &'a RoutingDecision,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

const HISTORY_WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// Builder/holder for the Router's injected collaborators (spec §9,
/// Global singletons → injected collaborators: cache, registry, weight
/// store, and semantic matcher are all constructor parameters).
pub struct Router {
    registry: Arc<IntentRegistry>,
    cache: Arc<RoutingCache>,
    capability_source: Arc<dyn CapabilitySource>,
    weight_store: Option<Arc<dyn WeightStore>>,
    semantic_matcher: Arc<dyn SemanticMatcher>,
    history_sink: Arc<dyn HistorySink>,
    lifecycle: LifecycleManager,
}

impl Router {
    pub fn new(
        registry: Arc<IntentRegistry>,
        cache: Arc<RoutingCache>,
        capability_source: Arc<dyn CapabilitySource>,
        lifecycle: LifecycleManager,
    ) -> Self {
        Self {
            registry,
            cache,
            capability_source,
            weight_store: None,
            semantic_matcher: Arc::new(NoSemanticMatcher),
            history_sink: Arc::new(NullHistorySink),
            lifecycle,
        }
    }

    pub fn with_weight_store(mut self, store: Arc<dyn WeightStore>) -> Self {
        self.weight_store = Some(store);
        self
    }

    pub fn with_semantic_matcher(mut self, matcher: Arc<dyn SemanticMatcher>) -> Self {
        self.semantic_matcher = matcher;
        self
    }

    pub fn with_history_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history_sink = sink;
        self
    }

    /// Point-in-time routing-cache counters (spec §4.3, `get_stats`).
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.get_stats()
    }

    /// Snapshot of the priority-sorted intent table (spec §4.2, debug tooling).
    pub fn registry_dump(&self) -> Vec<(Intent, crate::types::AgentType, i32, String)> {
        self.registry.dump()
    }

    /// Whether the decision requires secondary orchestration (spec §4.1,
    /// Needs-orchestration policy): confidence < 0.8, a multi-intent
    /// conjunction marker is present, or the intent is unknown.
    fn needs_orchestration(utterance: &str, intent: Intent, confidence: f64) -> bool {
        confidence < 0.8 || contains_conjunction_marker(utterance) || intent.is_unknown()
    }

    /// Classify an utterance. Strict order, first hit returns (spec §4.1).
    pub async fn classify(&self, ctx: &CancellationToken, utterance: &Utterance) -> Result<RoutingDecision, RouterError> {
        if ctx.is_cancelled() {
            return Err(RouterError::Cancelled);
        }

        // L0 — fingerprint cache.
        if let Some(cached) = self.cache.get(&utterance.text) {
            let needs_orchestration = Self::needs_orchestration(&utterance.text, cached.intent, cached.confidence);
            return Ok(RoutingDecision {
                source: RouteSource::Cache,
                needs_orchestration,
                ..cached
            });
        }

        // L1 — rule match.
        let weights = self
            .weight_store
            .as_ref()
            .filter(|_| utterance.user_id > 0)
            .map(|store| store.get_weights(utterance.user_id));
        let match_result = rule_match(&utterance.text, self.capability_source.as_ref(), utterance.user_id, weights.as_ref());

        let mut decision = if match_result.matched {
            // L2 — registry disambiguation.
            let action = match_result.action.unwrap_or(crate::types::GenericAction::None);
            let (intent, registry_confidence, resolved) =
                self.registry.resolve(action, &match_result.matched_keywords, &utterance.text);
            if resolved && !intent.is_unknown() {
                let confidence = match_result.confidence.max(registry_confidence).min(0.95);
                Some(RoutingDecision {
                    intent,
                    confidence,
                    source: RouteSource::Registry,
                    needs_orchestration: false,
                })
            } else {
                None
            }
        } else {
            None
        };

        // L3 — semantic/LLM fallback.
        if decision.is_none() {
            match self.semantic_matcher.match_utterance(&utterance.text).await {
                Ok(Some(sem)) if sem.confidence > SEMANTIC_CONFIDENCE_THRESHOLD => {
                    let (intent, _, resolved) = self.registry.resolve(
                        crate::types::GenericAction::None,
                        std::slice::from_ref(&sem.capability),
                        &utterance.text,
                    );
                    if resolved && !intent.is_unknown() {
                        decision = Some(RoutingDecision {
                            intent,
                            confidence: sem.confidence,
                            source: RouteSource::Semantic,
                            needs_orchestration: false,
                        });
                    }
                }
                Ok(_) => {}
                Err(message) => {
                    warn!(error = %message, "semantic fallback failed, degrading to unknown");
                }
            }
        }

        let mut decision = decision.unwrap_or_else(|| RoutingDecision::unknown(RouteSource::Rule));
        decision.needs_orchestration = Self::needs_orchestration(&utterance.text, decision.intent, decision.confidence);

        // Invariant: every non-unknown intent must resolve to a defined agent type.
        if !decision.intent.is_unknown() && self.registry.get_agent_type(decision.intent).is_none() {
            return Err(RouterError::Invariant {
                intent: decision.intent.to_string(),
            });
        }

        // Cache-back on any non-cache success.
        if !decision.intent.is_unknown() {
            self.cache.set(&utterance.text, decision.clone());
        }

        // History record (fire-and-forget) for identified users.
        if utterance.user_id > 0 && !decision.intent.is_unknown() {
            let sink = Arc::clone(&self.history_sink);
            let user_id = utterance.user_id;
            let text = utterance.text.clone();
            let decision_for_history = decision.clone();
            self.lifecycle.fire_and_forget("router-history", HISTORY_WRITE_DEADLINE, move || async move {
                sink.record(user_id, &text, &decision_for_history).await
            });
        }

        debug!(
            intent = %decision.intent,
            confidence = decision.confidence,
            source = decision.source.as_str(),
            "classified utterance"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::KeywordCapabilitySource;

    fn router() -> Router {
        let registry = Arc::new(IntentRegistry::with_defaults().unwrap());
        let cache = Arc::new(RoutingCache::with_default_capacity());
        let capability_source: Arc<dyn CapabilitySource> = Arc::new(KeywordCapabilitySource::defaults());
        Router::new(registry, cache, capability_source, LifecycleManager::new())
    }

    #[tokio::test]
    async fn schedule_query_cold_path_then_cache_hit() {
        let router = router();
        let ctx = CancellationToken::new();
        let utterance = Utterance::new("明天下午3点开会").with_user(42);

        let first = router.classify(&ctx, &utterance).await.unwrap();
        assert_eq!(first.intent, Intent::ScheduleQuery);
        assert!(first.confidence >= 0.85);
        assert_ne!(first.source, RouteSource::Cache);

        let second = router.classify(&ctx, &utterance).await.unwrap();
        assert_eq!(second.source, RouteSource::Cache);
        assert_eq!(second.intent, first.intent);
    }

    #[tokio::test]
    async fn memo_search_explicit_keywords() {
        let router = router();
        let ctx = CancellationToken::new();
        let utterance = Utterance::new("搜索关于 Go 的笔记");
        let decision = router.classify(&ctx, &utterance).await.unwrap();
        assert_eq!(decision.intent, Intent::MemoSearch);
        assert!(decision.confidence >= 0.7);
    }

    #[tokio::test]
    async fn ambiguous_multi_intent_forces_orchestration() {
        let router = router();
        let ctx = CancellationToken::new();
        let utterance = Utterance::new("明天开会，顺便查找笔记");
        let decision = router.classify(&ctx, &utterance).await.unwrap();
        assert!(decision.needs_orchestration);
    }

    #[tokio::test]
    async fn empty_utterance_is_unknown_without_panic() {
        let router = router();
        let ctx = CancellationToken::new();
        let utterance = Utterance::new("");
        let decision = router.classify(&ctx, &utterance).await.unwrap();
        assert_eq!(decision.intent, Intent::Unknown);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.needs_orchestration);
    }

    #[tokio::test]
    async fn punctuation_only_utterance_is_unknown() {
        let router = router();
        let ctx = CancellationToken::new();
        let utterance = Utterance::new("，。？！");
        let decision = router.classify(&ctx, &utterance).await.unwrap();
        assert_eq!(decision.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn cancelled_context_errors() {
        let router = router();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let utterance = Utterance::new("明天开会");
        let result = router.classify(&ctx, &utterance).await;
        assert!(matches!(result, Err(RouterError::Cancelled)));
    }

    #[tokio::test]
    async fn concurrent_classify_same_utterance_is_consistent() {
        let router = Arc::new(router());
        let ctx = CancellationToken::new();
        let utterance = Arc::new(Utterance::new("明天下午3点开会").with_user(7));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let router = Arc::clone(&router);
            let ctx = ctx.clone();
            let utterance = Arc::clone(&utterance);
            handles.push(tokio::spawn(async move { router.classify(&ctx, &utterance).await.unwrap() }));
        }
        let mut decisions = Vec::new();
        for h in handles {
            decisions.push(h.await.unwrap());
        }
        let first_intent = decisions[0].intent;
        assert!(decisions.iter().all(|d| d.intent == first_intent));
    }
}
