// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # divinesense
//!
//! Cognitive routing and dispatch core for a personal knowledge-management
//! assistant.
//!
//! ## Architecture
//!
//! - **Intent router** (`router`): rule matching, semantic fallback, and
//!   capability-weighted intent classification (L0–L3 cascade)
//! - **Intent registry** (`registry`): capability → agent-type → intent
//!   projection, mutable at runtime
//! - **Routing cache** (`cache`): LRU + TTL classification cache
//! - **Feedback & weight store** (`feedback`): per-user capability-weight
//!   adjustment from observed corrections
//! - **Streaming dispatcher** (`dispatch`): runs the selected agent's
//!   plan → act → observe loop and streams ordered event envelopes
//! - **Lifecycle manager** (`lifecycle`): tracked background work and
//!   graceful shutdown drain
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use divinesense::capability::KeywordCapabilitySource;
//! use divinesense::cache::RoutingCache;
//! use divinesense::lifecycle::LifecycleManager;
//! use divinesense::registry::IntentRegistry;
//! use divinesense::router::Router;
//! use divinesense::types::Utterance;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let registry = Arc::new(IntentRegistry::with_defaults().unwrap());
//! let cache = Arc::new(RoutingCache::new(500).unwrap());
//! let capability_source = Arc::new(KeywordCapabilitySource::defaults());
//! let lifecycle = LifecycleManager::new();
//! let router = Router::new(registry, cache, capability_source, lifecycle);
//! let ctx = CancellationToken::new();
//! let utterance = Utterance::new("明天下午3点开会").with_user(42);
//! let decision = router.classify(&ctx, &utterance).await.unwrap();
//! # let _ = decision;
//! # }
//! ```

pub mod cache;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feedback;
pub mod lifecycle;
pub mod llm;
pub mod paths;
pub mod registry;
pub mod router;
pub mod store;
pub mod types;
