//! Event envelope, metadata, and block-summary wire types (spec §3, §6).
//!
//! A single ordered channel carries a sum type (`Content | Event | Terminal`)
//! rather than parallel channels, preserving ordering without coordinating
//! multiple receivers (spec §9, Streaming with heterogeneous payloads).

use serde::{Deserialize, Serialize};

/// The wire-visible event taxonomy (spec §6): the union of the typed-event
/// enum in §3 plus the additional tags surfaced over the chat RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Thinking,
    ToolUse,
    ToolResult,
    Answer,
    Plan,
    TaskStart,
    TaskEnd,
    DecomposeStart,
    DecomposeEnd,
    DangerBlock,
    MemoQueryResult,
    ScheduleQueryResult,
    ScheduleUpdated,
    Error,
    SessionStats,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Thinking => "thinking",
            EventType::ToolUse => "tool_use",
            EventType::ToolResult => "tool_result",
            EventType::Answer => "answer",
            EventType::Plan => "plan",
            EventType::TaskStart => "task_start",
            EventType::TaskEnd => "task_end",
            EventType::DecomposeStart => "decompose_start",
            EventType::DecomposeEnd => "decompose_end",
            EventType::DangerBlock => "danger_block",
            EventType::MemoQueryResult => "memo_query_result",
            EventType::ScheduleQueryResult => "schedule_query_result",
            EventType::ScheduleUpdated => "schedule_updated",
            EventType::Error => "error",
            EventType::SessionStats => "session_stats",
        }
    }
}

/// Tool name, duration, status, and optional token/summary/file fields
/// (spec §3, Event Metadata).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    pub tool_name: Option<String>,
    pub tool_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub status: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub input_summary: Option<String>,
    pub output_summary: Option<String>,
    pub file_path: Option<String>,
    pub line_count: Option<u64>,
    pub error_msg: Option<String>,
}

/// Per-turn roll-up statistics (spec §3, Block Summary).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockSummary {
    pub session_id: String,
    pub total_duration_ms: u64,
    pub thinking_duration_ms: u64,
    pub tool_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_tokens: u64,
    pub tool_call_count: u64,
    pub tools_used: Vec<String>,
    pub files_modified: Vec<String>,
    pub estimated_cost: f64,
    pub status: String,
    pub error_message: Option<String>,
}

impl BlockSummary {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: "ok".to_string(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, status: impl Into<String>, error_message: impl Into<String>) -> Self {
        self.status = status.into();
        self.error_message = Some(error_message.into());
        self
    }
}

/// One item on the dispatcher's ordered event stream.
///
/// Every envelope carries either a non-empty content fragment or exactly
/// one typed event (spec §4.5, Ordering and framing); the stream terminates
/// with exactly one envelope bearing `done=true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventEnvelope {
    /// A streamed token chunk. May be empty only for pure signalling use
    /// internal to the producer; callers should treat an empty chunk as a
    /// no-op rather than rendering it.
    Content { block_id: i64, content: String },
    /// A typed event with a payload and optional structured metadata.
    Event {
        block_id: i64,
        event_type: EventType,
        payload: String,
        event_meta: Option<EventMetadata>,
    },
    /// The terminal marker. Exactly one is emitted per dispatch, unless cancelled.
    Terminal {
        block_id: i64,
        done: bool,
        block_summary: Option<BlockSummary>,
    },
}

impl EventEnvelope {
    pub fn content(block_id: i64, content: impl Into<String>) -> Self {
        Self::Content {
            block_id,
            content: content.into(),
        }
    }

    pub fn event(block_id: i64, event_type: EventType, payload: impl Into<String>) -> Self {
        Self::Event {
            block_id,
            event_type,
            payload: payload.into(),
            event_meta: None,
        }
    }

    pub fn event_with_meta(block_id: i64, event_type: EventType, payload: impl Into<String>, meta: EventMetadata) -> Self {
        Self::Event {
            block_id,
            event_type,
            payload: payload.into(),
            event_meta: Some(meta),
        }
    }

    pub fn terminal(block_id: i64, summary: Option<BlockSummary>) -> Self {
        Self::Terminal {
            block_id,
            done: true,
            block_summary: summary,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventEnvelope::Terminal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_always_carries_done_true() {
        let envelope = EventEnvelope::terminal(1, None);
        match envelope {
            EventEnvelope::Terminal { done, .. } => assert!(done),
            _ => panic!("expected terminal"),
        }
    }

    #[test]
    fn event_type_wire_strings_match_taxonomy() {
        assert_eq!(EventType::ToolUse.as_str(), "tool_use");
        assert_eq!(EventType::ScheduleQueryResult.as_str(), "schedule_query_result");
    }
}
