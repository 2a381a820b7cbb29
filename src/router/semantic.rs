//! Optional L3 semantic/LLM fallback matcher (spec §4.1, step 4).
//!
//! The embedding/reranker service itself is an external collaborator
//! (spec §1); this module only defines the interface the router consumes
//! and a null implementation for when no semantic matcher is configured.

use std::future::Future;
use std::pin::Pin;

/// Result of a semantic capability match: the capability name and a
/// confidence in [0,1].
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub capability: String,
    pub confidence: f64,
}

/// Embeds the utterance and compares against per-capability reference
/// embeddings. Object-safe via boxed futures so it can be injected as
/// `Arc<dyn SemanticMatcher>`.
pub trait SemanticMatcher: Send + Sync {
    fn match_utterance<'a>(
        &'a self,
        utterance: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SemanticMatch>, String>> + Send + 'a>>;
}

/// No semantic matcher configured: classification falls straight through
/// to `(unknown, 0, needs_orchestration=true, source=rule)` (spec §4.1, step 4).
pub struct NoSemanticMatcher;

impl SemanticMatcher for NoSemanticMatcher {
    fn match_utterance<'a>(
        &'a self,
        _utterance: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SemanticMatch>, String>> + Send + 'a>> {
        Box::pin(async { Ok(None) })
    }
}

/// Minimum confidence for a semantic match to be accepted (spec §4.1, step 4).
pub const SEMANTIC_CONFIDENCE_THRESHOLD: f64 = 0.3;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_matcher_returns_none() {
        let matcher = NoSemanticMatcher;
        let result = matcher.match_utterance("anything").await.unwrap();
        assert!(result.is_none());
    }
}
