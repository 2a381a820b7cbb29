//! L1 rule matcher: normalization, generic-action detection, and
//! weight-aware keyword scoring (spec §4.1).

use std::sync::LazyLock;

use regex::Regex;

use crate::capability::CapabilitySource;
use crate::feedback::UserWeights;
use crate::types::{GenericAction, MatchResult};

/// Punctuation stripped during normalization (spec §4.1: "a fixed punctuation
/// set"): space, `,.?!`, and their CJK counterparts, plus tab/newline.
const STRIP_CHARS: &[char] = &[' ', ',', '.', '?', '!', '，', '。', '？', '！', '、', '\t', '\n'];

/// Lowercase ASCII and strip the fixed punctuation set. Idempotent:
/// `normalize_input(normalize_input(s)) == normalize_input(s)`.
pub fn normalize_input(text: &str) -> String {
    text.chars()
        .filter(|c| !STRIP_CHARS.contains(c))
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Ordered disjunction of action regexes, tried in this exact order
/// (spec §4.1: `update`, `batch`, `search`, `query`, `create`).
static ACTION_PATTERNS: LazyLock<Vec<(GenericAction, Regex)>> = LazyLock::new(|| {
    vec![
        (GenericAction::Update, Regex::new(r"(?i)更新|修改|改期|取消|update|reschedule|cancel").unwrap()),
        (GenericAction::Batch, Regex::new(r"(?i)批量|每周|每天|每月|重复|batch|recurring").unwrap()),
        (GenericAction::Search, Regex::new(r"(?i)搜索|查找|search|find").unwrap()),
        (GenericAction::Query, Regex::new(r"(?i)查询|查看|什么时候|query|when is|what time").unwrap()),
        (GenericAction::Create, Regex::new(r"(?i)创建|新建|安排|预约|提醒我|create|schedule a|remind me").unwrap()),
    ]
});

/// Time patterns: digit+[:/时/点], am/pm+digit+[点/时], relative-day
/// keywords, `<digit>月<digit>日|号` (spec §4.1).
static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \d{1,2}[:：时点] |
        (am|pm|上午|下午|早上|晚上)\s*\d{1,2}\s*[点时] |
        明天|后天|今天|下周|昨天 |
        \d{1,2}月\d{1,2}(日|号)
        ",
    )
    .unwrap()
});

/// Multi-intent conjunction markers that force orchestration (spec §4.1,
/// Needs-orchestration policy).
pub const CONJUNCTION_MARKERS: &[&str] = &["顺便", "同时", "还有", "以及", "并且", "另外", "也"];

pub fn contains_conjunction_marker(text: &str) -> bool {
    CONJUNCTION_MARKERS.iter().any(|m| text.contains(m))
}

/// Detect the generic action, falling back to a bare time-pattern ⇒ `Query`
/// when no action regex fires (spec §4.1, step 2).
pub fn detect_action(normalized: &str) -> Option<GenericAction> {
    for (action, pattern) in ACTION_PATTERNS.iter() {
        if pattern.is_match(normalized) {
            return Some(*action);
        }
    }
    if TIME_PATTERN.is_match(normalized) {
        return Some(GenericAction::Query);
    }
    None
}

/// Base confidence formula (spec §4.1, step 2): 0.5 base + 0.3 if action
/// detected + 0.1 per matched keyword, capped at 0.95.
fn base_confidence(action: Option<GenericAction>, keyword_count: usize) -> f64 {
    let mut confidence = 0.5;
    if action.is_some() {
        confidence += 0.3;
    }
    confidence += 0.1 * keyword_count as f64;
    confidence.min(0.95)
}

/// Weight-aware confidence: combine per-keyword weights linearly instead of
/// a flat +0.1 per match, gated by the category's core-keyword requirement
/// (spec §4.1, Weight-aware matching).
fn weighted_confidence(
    action: Option<GenericAction>,
    matched: &[String],
    category: &str,
    weights: &UserWeights,
    capability_source: &dyn CapabilitySource,
) -> f64 {
    let mut confidence = 0.5;
    if action.is_some() {
        confidence += 0.3;
    }
    let has_core = matched.iter().any(|kw| capability_source.is_core_keyword(category, kw));
    if !has_core && matched.is_empty() {
        return confidence.min(0.95);
    }
    if !has_core {
        // A bare time pattern without a core keyword never scores as this category.
        return 0.0;
    }
    let category_weights = weights.get(category);
    for kw in matched {
        let w = category_weights
            .and_then(|cat| cat.get(kw))
            .copied()
            .unwrap_or(3) as f64; // static default midpoint when unweighted
        confidence += 0.02 * w;
    }
    confidence.min(0.95)
}

/// Run the full L1 rule match: normalize once, detect the generic action,
/// collect matched capability keywords, and score confidence.
///
/// When `user_id > 0`, `weights` carries the per-user weight table and
/// scoring is weight-aware with categorical gating; otherwise the flat
/// formula applies.
pub fn rule_match(
    utterance: &str,
    capability_source: &dyn CapabilitySource,
    user_id: i64,
    weights: Option<&UserWeights>,
) -> MatchResult {
    let normalized = normalize_input(utterance);
    let action = detect_action(&normalized);
    let matched_keywords = capability_source.matched_capabilities(&normalized);

    if action.is_none() && matched_keywords.is_empty() {
        return MatchResult::no_match();
    }

    let confidence = if user_id > 0 {
        if let Some(weights) = weights {
            // Capabilities are namespaced "category.keyword"-ish tags; derive
            // the category from the first matched capability's prefix.
            let category = matched_keywords
                .first()
                .and_then(|c| c.split('.').next())
                .unwrap_or("")
                .to_string();
            let plain_keywords: Vec<String> = matched_keywords
                .iter()
                .filter_map(|c| c.split('.').next_back())
                .map(|s| s.to_string())
                .collect();
            let w = weighted_confidence(action, &plain_keywords, &category, weights, capability_source);
            if w == 0.0 && !matched_keywords.is_empty() {
                // Categorical gate rejected this as a false trigger; fall back
                // to the unweighted formula rather than silently degrading
                // confidence for users with no recorded weights yet.
                base_confidence(action, matched_keywords.len())
            } else {
                w
            }
        } else {
            base_confidence(action, matched_keywords.len())
        }
    } else {
        base_confidence(action, matched_keywords.len())
    };

    MatchResult {
        action,
        matched_keywords,
        confidence,
        matched: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::KeywordCapabilitySource;

    #[test]
    fn normalize_is_idempotent() {
        let input = "明天下午3点开会, 顺便！";
        let once = normalize_input(input);
        let twice = normalize_input(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_strips_punctuation_and_lowercases() {
        let out = normalize_input("Hello, World!");
        assert_eq!(out, "helloworld");
    }

    #[test]
    fn detects_update_before_create_on_ordered_disjunction() {
        // "安排" would hit create, but "取消" (update) must win per the fixed order.
        let action = detect_action("取消安排的会议");
        assert_eq!(action, Some(GenericAction::Update));
    }

    #[test]
    fn bare_time_pattern_without_action_is_query() {
        let action = detect_action("明天下午3点");
        assert_eq!(action, Some(GenericAction::Query));
    }

    #[test]
    fn no_action_no_keyword_is_no_match() {
        let source = KeywordCapabilitySource::defaults();
        let result = rule_match("the quick brown fox", &source, 0, None);
        assert!(!result.matched);
    }

    #[test]
    fn empty_utterance_no_match_without_panic() {
        let source = KeywordCapabilitySource::defaults();
        let result = rule_match("", &source, 0, None);
        assert!(!result.matched);
    }

    #[test]
    fn confidence_capped_at_095() {
        let source = KeywordCapabilitySource::defaults();
        let result = rule_match("安排一个会议提醒并预约日程", &source, 0, None);
        assert!(result.confidence <= 0.95);
    }

    #[test]
    fn conjunction_marker_detected() {
        assert!(contains_conjunction_marker("明天开会，顺便查找笔记"));
        assert!(!contains_conjunction_marker("明天开会"));
    }
}
