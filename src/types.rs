//! Shared data model for the routing and dispatch core.
//!
//! These types are the contract between the router, registry, cache,
//! feedback collector and streaming dispatcher (spec §3). They are kept
//! free of subsystem logic so any component can depend on them without
//! pulling in the others.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed enumeration of stable routing targets.
///
/// Intents are the contract between the router and downstream dispatching;
/// new intents require a corresponding [`crate::registry::IntentConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    MemoSearch,
    MemoCreate,
    ScheduleQuery,
    ScheduleCreate,
    ScheduleUpdate,
    BatchSchedule,
    GeneralTask,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::MemoSearch => "memo_search",
            Intent::MemoCreate => "memo_create",
            Intent::ScheduleQuery => "schedule_query",
            Intent::ScheduleCreate => "schedule_create",
            Intent::ScheduleUpdate => "schedule_update",
            Intent::BatchSchedule => "batch_schedule",
            Intent::GeneralTask => "general_task",
            Intent::Unknown => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Intent::Unknown)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed enumeration identifying a specialist handler.
///
/// Every intent maps to exactly one agent type via the [`crate::registry::IntentRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Memo,
    Schedule,
    General,
    Ideation,
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Memo => "memo",
            AgentType::Schedule => "schedule",
            AgentType::General => "general",
            AgentType::Ideation => "ideation",
            AgentType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain-agnostic verb detected from text, decoupling pattern recognition
/// from agent assignment (spec §9, import-cycle avoidance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericAction {
    Query,
    Search,
    Create,
    Update,
    Batch,
    None,
}

impl GenericAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenericAction::Query => "query",
            GenericAction::Search => "search",
            GenericAction::Create => "create",
            GenericAction::Update => "update",
            GenericAction::Batch => "batch",
            GenericAction::None => "none",
        }
    }
}

/// Where a routing decision originated. Drives cache TTL (spec §4.3) and
/// is surfaced to callers for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Cache,
    Rule,
    Registry,
    Semantic,
    Llm,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Cache => "cache",
            RouteSource::Rule => "rule",
            RouteSource::Registry => "registry",
            RouteSource::Semantic => "semantic",
            RouteSource::Llm => "llm",
        }
    }
}

/// Opaque text plus context. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub user_id: i64,
    pub timezone: Option<String>,
    pub conversation_id: Option<i64>,
    pub device_context: Option<serde_json::Value>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: 0,
            timezone: None,
            conversation_id: None,
            device_context: None,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Output of rule matching (spec §4.1 L1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub action: Option<GenericAction>,
    pub matched_keywords: Vec<String>,
    pub confidence: f64,
    pub matched: bool,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            action: None,
            matched_keywords: Vec::new(),
            confidence: 0.0,
            matched: false,
        }
    }
}

/// (intent, confidence, source, needs-orchestration): the router's public output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,
    pub confidence: f64,
    pub source: RouteSource,
    pub needs_orchestration: bool,
}

impl RoutingDecision {
    pub fn unknown(source: RouteSource) -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            source,
            needs_orchestration: true,
        }
    }
}

/// A cache entry: a routing decision plus its creation timestamp (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub decision: RoutingDecision,
    pub created_at: DateTime<Utc>,
}

/// The kind of user-visible correction that drives weight adjustment (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Positive,
    Rephrase,
    Switch,
}

/// One observed routing outcome, fed back into the weight adjuster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterFeedback {
    pub user_id: i64,
    pub utterance: String,
    pub predicted_intent: Intent,
    pub actual_intent: Intent,
    pub kind: FeedbackKind,
    pub source: RouteSource,
    pub timestamp: DateTime<Utc>,
}

impl RouterFeedback {
    pub fn new(
        user_id: i64,
        utterance: impl Into<String>,
        predicted_intent: Intent,
        actual_intent: Intent,
        kind: FeedbackKind,
        source: RouteSource,
    ) -> Self {
        Self {
            user_id,
            utterance: utterance.into(),
            predicted_intent,
            actual_intent,
            kind,
            source,
            timestamp: Utc::now(),
        }
    }
}

/// user id → category → keyword → weight in [1,5]. Absence means the
/// static default from config applies (spec §3, Weight Table).
pub type WeightTable = HashMap<i64, HashMap<String, HashMap<String, u8>>>;

pub const MIN_WEIGHT: u8 = 1;
pub const MAX_WEIGHT: u8 = 5;

/// Clamp a weight delta application into `[MIN_WEIGHT, MAX_WEIGHT]`.
pub fn clamp_weight(base: i64, delta: i64) -> u8 {
    (base + delta).clamp(MIN_WEIGHT as i64, MAX_WEIGHT as i64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_weight_saturates() {
        assert_eq!(clamp_weight(1, -5), MIN_WEIGHT);
        assert_eq!(clamp_weight(5, 5), MAX_WEIGHT);
        assert_eq!(clamp_weight(3, 1), 4);
    }

    #[test]
    fn intent_display_matches_wire_string() {
        assert_eq!(Intent::ScheduleCreate.as_str(), "schedule_create");
        assert_eq!(Intent::ScheduleCreate.to_string(), "schedule_create");
    }
}
