//! Capability source: the injected collaborator that tells the rule matcher
//! which capability tags are present in an utterance.
//!
//! Per spec §9 (import-cycle avoidance), the rule matcher must not know
//! concrete agent types — it only deals in capability tags. The registry
//! is the sole owner of the capability/action → agent table.

use std::collections::HashMap;

/// A tag advertised by an agent describing one thing it can do
/// (glossary: "Capability"), e.g. `"schedule.create"`, `"memo.search"`.
pub type Capability = String;

/// Supplies the set of capability tags present in an utterance.
///
/// Implementations typically hold a static keyword table loaded from agent
/// YAML descriptors (see `AI_PARROTS_CONFIG_DIR`), independent of the rule
/// matcher's action-detection regexes.
pub trait CapabilitySource: Send + Sync {
    /// Return every capability whose keyword set matches the normalized utterance.
    fn matched_capabilities(&self, normalized_text: &str) -> Vec<Capability>;

    /// Return true if `keyword` is one of the "core" keywords gating `category`
    /// (spec §4.1, categorical gates: a bare time pattern must coincide with a
    /// schedule-core keyword to score as schedule).
    fn is_core_keyword(&self, category: &str, keyword: &str) -> bool;
}

/// A static, in-process capability source built from a keyword table.
///
/// This is the default collaborator: in production the table is populated
/// from agent YAML descriptors (an external collaborator per spec §1); here
/// it is a plain `HashMap` so the router core has no file-loading dependency.
#[derive(Debug, Clone, Default)]
pub struct KeywordCapabilitySource {
    /// capability → keyword list
    keywords: HashMap<Capability, Vec<String>>,
    /// category → core keyword set (subset that gates a bare time-pattern match)
    core_keywords: HashMap<String, Vec<String>>,
}

impl KeywordCapabilitySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability's keyword list.
    pub fn with_capability(mut self, capability: impl Into<String>, keywords: &[&str]) -> Self {
        self.keywords.insert(
            capability.into(),
            keywords.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Mark a keyword as "core" for a category (used by the weight-aware
    /// categorical gate).
    pub fn with_core_keyword(mut self, category: impl Into<String>, keyword: &str) -> Self {
        self.core_keywords
            .entry(category.into())
            .or_default()
            .push(keyword.to_string());
        self
    }

    /// The default personal-knowledge-assistant capability table: schedule
    /// create/query/update/batch, memo search/create.
    pub fn defaults() -> Self {
        Self::new()
            .with_capability("schedule.create", &["日程", "安排", "会议", "开会", "提醒", "预约", "schedule", "meeting", "remind"])
            .with_capability("schedule.query", &["日程", "安排", "会议", "开会", "查看", "什么时候", "schedule", "calendar"])
            .with_capability("schedule.update", &["改期", "修改", "取消", "reschedule", "cancel"])
            .with_capability("schedule.batch", &["批量", "重复", "每周", "每天", "batch", "recurring"])
            .with_capability("memo.search", &["笔记", "备忘录", "查找", "搜索", "memo", "note"])
            .with_capability("memo.create", &["记录", "笔记", "备忘", "创建", "write down", "jot"])
            .with_core_keyword("schedule", "日程")
            .with_core_keyword("schedule", "会议")
            .with_core_keyword("schedule", "开会")
            .with_core_keyword("schedule", "安排")
            .with_core_keyword("schedule", "提醒")
            .with_core_keyword("schedule", "schedule")
            .with_core_keyword("schedule", "meeting")
            .with_core_keyword("memo", "笔记")
            .with_core_keyword("memo", "备忘录")
            .with_core_keyword("memo", "memo")
            .with_core_keyword("memo", "note")
    }
}

impl CapabilitySource for KeywordCapabilitySource {
    fn matched_capabilities(&self, normalized_text: &str) -> Vec<Capability> {
        // Sorted for determinism: `self.keywords` is a `HashMap`, whose
        // iteration order is randomized per `RandomState` and must not leak
        // into routing decisions (spec §3, §8: `classify` is deterministic
        // given fixed registry/weights/cache state).
        let mut matched: Vec<Capability> = self
            .keywords
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| normalized_text.contains(kw.as_str())))
            .map(|(cap, _)| cap.clone())
            .collect();
        matched.sort();
        matched
    }

    fn is_core_keyword(&self, category: &str, keyword: &str) -> bool {
        self.core_keywords
            .get(category)
            .is_some_and(|core| core.iter().any(|k| k == keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_schedule_keyword() {
        let source = KeywordCapabilitySource::defaults();
        let caps = source.matched_capabilities("明天下午3点开会");
        assert!(caps.contains(&"schedule.create".to_string()) || caps.contains(&"schedule.query".to_string()));
    }

    #[test]
    fn core_keyword_gate() {
        let source = KeywordCapabilitySource::defaults();
        assert!(source.is_core_keyword("schedule", "会议"));
        assert!(!source.is_core_keyword("schedule", "随便什么"));
    }

    #[test]
    fn matched_capabilities_order_is_stable_across_calls() {
        let source = KeywordCapabilitySource::defaults();
        let first = source.matched_capabilities("创建会议笔记");
        for _ in 0..20 {
            assert_eq!(source.matched_capabilities("创建会议笔记"), first);
        }
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted, "matched_capabilities must return a sorted (deterministic) order");
    }
}
