//! Intent registry: configurable mapping from generic action + matched
//! capability keywords to intent, and from intent to specialist agent type.
//!
//! The registry is the only component that owns the action→agent table
//! (spec §9, import-cycle avoidance) — the rule matcher never references
//! concrete agent types.

use std::sync::RwLock;

use regex::Regex;

use crate::error::RegistryError;
use crate::types::{AgentType, GenericAction, Intent};

/// Registry entry: one routable intent plus its matching rules and priority.
#[derive(Debug, Clone)]
pub struct IntentConfig {
    pub intent: Intent,
    pub agent_type: AgentType,
    pub keywords: Vec<String>,
    pub patterns: Vec<Regex>,
    /// Higher priority wins on conflict.
    pub priority: i32,
    /// Free-form tag surfaced for observability (e.g. "specialist", "general").
    pub route_type: String,
}

impl IntentConfig {
    pub fn new(intent: Intent, agent_type: AgentType, priority: i32, route_type: impl Into<String>) -> Self {
        Self {
            intent,
            agent_type,
            keywords: Vec::new(),
            patterns: Vec::new(),
            priority,
            route_type: route_type.into(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords.extend(keywords.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, RegistryError> {
        let re = Regex::new(pattern).map_err(|source| RegistryError::BadPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.patterns.push(re);
        Ok(self)
    }
}

/// A single expert/agent descriptor as loaded from agent YAML config
/// (external collaborator, spec §1). `build_from_expert_configs` projects
/// a list of these into registered [`IntentConfig`]s.
#[derive(Debug, Clone)]
pub struct ExpertConfig {
    pub agent_type: AgentType,
    /// Raw capability strings, e.g. "搜索笔记", "create reminder".
    pub capabilities: Vec<String>,
    pub priority: i32,
}

/// Infer a [`GenericAction`] from a raw capability string by keyword scan
/// (spec §4.2, Capability→Action inference).
pub fn infer_action(capability: &str) -> GenericAction {
    let lower = capability.to_lowercase();
    if contains_any(&lower, &["更新", "修改", "delete", "删除", "update"]) {
        GenericAction::Update
    } else if contains_any(&lower, &["批量", "batch", "重复"]) {
        GenericAction::Batch
    } else if contains_any(&lower, &["搜索", "查询", "search", "query"]) {
        // "搜索/查询/search/query" is listed as mapping to `search` in spec §4.2.
        GenericAction::Search
    } else if contains_any(&lower, &["创建", "新建", "create", "记录"]) {
        GenericAction::Create
    } else {
        GenericAction::Query
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Project (action, agent type) onto a specific [`Intent`] via the fixed
/// table in spec §4.2. Unknown combinations yield `Intent::Unknown`.
pub fn project_intent(action: GenericAction, agent_type: AgentType) -> Intent {
    use AgentType::*;
    use GenericAction::*;
    match (agent_type, action) {
        (Memo, Search) => Intent::MemoSearch,
        (Memo, Create) => Intent::MemoCreate,
        (Schedule, Query) => Intent::ScheduleQuery,
        (Schedule, Create) => Intent::ScheduleCreate,
        (Schedule, Update) => Intent::ScheduleUpdate,
        (Schedule, Batch) => Intent::BatchSchedule,
        (General, _) => Intent::GeneralTask,
        _ => Intent::Unknown,
    }
}

struct Inner {
    configs: Vec<IntentConfig>,
    /// Priority-sorted (descending) indices into `configs`, rebuilt on every mutation.
    sorted: Vec<usize>,
}

impl Inner {
    fn rebuild_sorted(&mut self) {
        let mut idx: Vec<usize> = (0..self.configs.len()).collect();
        idx.sort_by(|&a, &b| self.configs[b].priority.cmp(&self.configs[a].priority));
        self.sorted = idx;
    }
}

/// Configurable, hot-swappable intent registry (spec §4.2, C2).
///
/// All mutations acquire the writer lock and rebuild the priority-sorted
/// cache; reads take the reader lock only.
pub struct IntentRegistry {
    inner: RwLock<Inner>,
}

impl IntentRegistry {
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(Inner {
                configs: Vec::new(),
                sorted: Vec::new(),
            }),
        }
    }

    /// Register the built-in set: schedule (create/query/update/batch),
    /// memo (search/create), and general tasks (spec §4.2, Defaults).
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let registry = Self::empty();
        registry.register(
            IntentConfig::new(Intent::BatchSchedule, AgentType::Schedule, 110, "specialist")
                .with_keywords(&["批量", "每周", "每天", "重复", "batch", "recurring"])
                .with_pattern(r"(?i)每(周|天|月).*?(提醒|安排|会议)")?,
        )?;
        registry.register(
            IntentConfig::new(Intent::ScheduleCreate, AgentType::Schedule, 100, "specialist")
                .with_keywords(&["安排", "创建日程", "预约", "提醒我", "schedule a", "remind me"])
                .with_pattern(r"(?i)提醒我|安排.*(会议|日程)")?,
        )?;
        registry.register(
            IntentConfig::new(Intent::ScheduleQuery, AgentType::Schedule, 100, "specialist")
                .with_keywords(&["查看日程", "什么时候", "有什么安排", "what time", "my schedule"]),
        )?;
        registry.register(
            IntentConfig::new(Intent::ScheduleUpdate, AgentType::Schedule, 100, "specialist")
                .with_keywords(&["改期", "取消会议", "修改日程", "reschedule", "cancel meeting"]),
        )?;
        registry.register(
            IntentConfig::new(Intent::MemoSearch, AgentType::Memo, 100, "specialist")
                .with_keywords(&["搜索笔记", "查找笔记", "search notes", "find memo"]),
        )?;
        registry.register(
            IntentConfig::new(Intent::MemoCreate, AgentType::Memo, 100, "specialist")
                .with_keywords(&["记一条笔记", "创建备忘录", "write a note", "jot down"]),
        )?;
        registry.register(IntentConfig::new(Intent::GeneralTask, AgentType::General, 50, "general"))?;
        Ok(registry)
    }

    /// Register a new intent config. Errors on duplicate intent.
    pub fn register(&self, config: IntentConfig) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.configs.iter().any(|c| c.intent == config.intent) {
            return Err(RegistryError::DuplicateIntent {
                intent: config.intent.to_string(),
            });
        }
        inner.configs.push(config);
        inner.rebuild_sorted();
        Ok(())
    }

    /// Replace (hot-swap) the config for an already-registered intent.
    pub fn replace(&self, config: IntentConfig) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.configs.retain(|c| c.intent != config.intent);
        inner.configs.push(config);
        inner.rebuild_sorted();
    }

    /// Match an utterance against the priority-sorted config list.
    /// Regex patterns are tried first (confidence 0.9), then keyword
    /// substrings (confidence 0.7). First hit wins.
    pub fn match_text(&self, utterance: &str) -> (Intent, f64, bool) {
        let inner = self.inner.read().expect("registry lock poisoned");
        let lower = utterance.to_lowercase();
        for &i in &inner.sorted {
            let config = &inner.configs[i];
            if config.patterns.iter().any(|p| p.is_match(utterance)) {
                return (config.intent, 0.9, true);
            }
        }
        for &i in &inner.sorted {
            let config = &inner.configs[i];
            if config.keywords.iter().any(|kw| lower.contains(&kw.to_lowercase())) {
                return (config.intent, 0.7, true);
            }
        }
        (Intent::Unknown, 0.0, false)
    }

    /// Resolve an (action, matched capabilities) pair from the rule matcher
    /// into an intent by projecting each capability's inferred action and
    /// checking whether the resulting intent is registered. Falls back to
    /// `match_text` if no capability resolves.
    ///
    /// When more than one matched capability projects to a distinct
    /// registered intent (e.g. an utterance touching both a schedule and a
    /// memo capability under the same action), the highest-priority intent
    /// wins rather than whichever capability happened to come first in the
    /// caller's slice — ties keep the first candidate seen, so the caller
    /// must hand in capabilities in a stable order for `classify` to stay
    /// deterministic (spec §3, §8).
    pub fn resolve(&self, action: GenericAction, capabilities: &[String], utterance: &str) -> (Intent, f64, bool) {
        let mut best: Option<(Intent, i32)> = None;
        for capability in capabilities {
            let Some(agent_type) = self.agent_type_for_capability(capability) else {
                continue;
            };
            let intent = project_intent(action, agent_type);
            if intent.is_unknown() {
                continue;
            }
            let Some(priority) = self.priority_of(intent) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, best_priority)| priority > *best_priority) {
                best = Some((intent, priority));
            }
        }
        if let Some((intent, _)) = best {
            return (intent, 0.85, true);
        }
        self.match_text(utterance)
    }

    /// Registered priority for an intent, if any (used to tie-break `resolve`).
    fn priority_of(&self, intent: Intent) -> Option<i32> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.configs.iter().find(|c| c.intent == intent).map(|c| c.priority)
    }

    fn agent_type_for_capability(&self, capability: &str) -> Option<AgentType> {
        let lower = capability.to_lowercase();
        if lower.starts_with("schedule") {
            Some(AgentType::Schedule)
        } else if lower.starts_with("memo") {
            Some(AgentType::Memo)
        } else if lower.starts_with("general") {
            Some(AgentType::General)
        } else if lower.starts_with("ideation") {
            Some(AgentType::Ideation)
        } else {
            None
        }
    }

    /// Build (or rebuild) intent configs from a list of expert/agent
    /// descriptors: each capability string is mapped to a generic action,
    /// projected to a specific intent, and registered at the expert's priority.
    pub fn build_from_expert_configs(&self, experts: &[ExpertConfig]) -> Result<(), RegistryError> {
        for expert in experts {
            for capability in &expert.capabilities {
                let action = infer_action(capability);
                let intent = project_intent(action, expert.agent_type);
                if intent.is_unknown() {
                    continue;
                }
                let mut inner = self.inner.write().expect("registry lock poisoned");
                if let Some(existing) = inner.configs.iter_mut().find(|c| c.intent == intent) {
                    if !existing.keywords.iter().any(|k| k == capability) {
                        existing.keywords.push(capability.clone());
                    }
                } else {
                    inner.configs.push(
                        IntentConfig::new(intent, expert.agent_type, expert.priority, "specialist")
                            .with_keywords(&[capability.as_str()]),
                    );
                }
                inner.rebuild_sorted();
            }
        }
        Ok(())
    }

    /// Every non-unknown intent maps to exactly one agent type (spec §3 invariant).
    pub fn get_agent_type(&self, intent: Intent) -> Option<AgentType> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.configs.iter().find(|c| c.intent == intent).map(|c| c.agent_type)
    }

    /// Reverse lookup: the highest-priority intent registered for an agent type.
    pub fn get_intent(&self, agent_type: AgentType) -> Option<Intent> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .sorted
            .iter()
            .map(|&i| &inner.configs[i])
            .find(|c| c.agent_type == agent_type)
            .map(|c| c.intent)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of (intent, agent_type, priority, route_type) for dump/debug tooling.
    pub fn dump(&self) -> Vec<(Intent, AgentType, i32, String)> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .sorted
            .iter()
            .map(|&i| {
                let c = &inner.configs[i];
                (c.intent, c.agent_type, c.priority, c.route_type.clone())
            })
            .collect()
    }
}

impl Default for IntentRegistry {
    fn default() -> Self {
        Self::with_defaults().expect("built-in registry patterns are valid regex")
    }
}
