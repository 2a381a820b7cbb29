//! Streaming Dispatcher (C5): runs the selected agent and multiplexes
//! token chunks and event envelopes onto one ordered channel, enforcing
//! timeout, cancellation, and reasoning-loop bounds (spec §4.5).

pub mod agent_runtime;
pub mod events;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::agent_runtime::{Agent, AgentAction, Observation, ToolSet};
use crate::dispatch::events::{BlockSummary, EventEnvelope, EventMetadata, EventType};
use crate::error::DispatchError;
use crate::types::AgentType;

/// Reasoning-loop and tool-execution bounds (spec §5, Resource caps).
pub const MAX_ITERATIONS: usize = 5;
pub const MAX_TOOL_FAILURES: usize = 3;
pub const CIRCULAR_DETECTOR_WINDOW: usize = 10;
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(30);
pub const STANDARD_AGENT_TIMEOUT: Duration = Duration::from_secs(120);
pub const STREAMING_AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-dispatch options (spec §4.5, Contract): geek/evolution mode flags,
/// conversation id, timezone, device context.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub geek_mode: bool,
    pub evolution_mode: bool,
    pub conversation_id: Option<i64>,
    pub user_timezone: Option<String>,
    pub device_context: Option<serde_json::Value>,
    /// Content/event channel capacity (default 10, spec §4.5 Backpressure).
    pub content_buffer: usize,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self {
            content_buffer: 10,
            ..Default::default()
        }
    }
}

/// Runs one specialist agent to completion, relaying its events onto a
/// single ordered channel (spec §4.5, C5).
pub struct StreamingDispatcher {
    session_id: String,
}

impl StreamingDispatcher {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    /// `dispatch(ctx, utterance, agent_type, options) → stream of EventEnvelope`.
    ///
    /// Opens a derived deadline context (120s standard, 300s streaming),
    /// enforces reasoning-loop bounds, and guarantees exactly one terminal
    /// marker on every exit path.
    pub fn dispatch(
        &self,
        ctx: CancellationToken,
        block_id: i64,
        utterance: String,
        agent_type: AgentType,
        agent: Arc<dyn Agent>,
        tools: ToolSet,
        options: DispatchOptions,
        streaming: bool,
    ) -> mpsc::Receiver<EventEnvelope> {
        let (tx, rx) = mpsc::channel(options.content_buffer.max(1));
        let session_id = self.session_id.clone();
        let deadline = if streaming { STREAMING_AGENT_TIMEOUT } else { STANDARD_AGENT_TIMEOUT };

        tokio::spawn(async move {
            run_turn(ctx, tx, session_id, block_id, utterance, agent_type, agent, tools, deadline).await;
        });

        rx
    }
}

async fn run_turn(
    ctx: CancellationToken,
    tx: mpsc::Sender<EventEnvelope>,
    session_id: String,
    block_id: i64,
    utterance: String,
    _agent_type: AgentType,
    agent: Arc<dyn Agent>,
    tools: ToolSet,
    deadline: Duration,
) {
    let turn_start = Instant::now();
    let deadline_ctx = ctx.child_token();
    let deadline_guard = {
        let deadline_ctx = deadline_ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            deadline_ctx.cancel();
        })
    };

    let mut observations: Vec<Observation> = Vec::new();
    let mut recent_calls: VecDeque<(String, String)> = VecDeque::with_capacity(CIRCULAR_DETECTOR_WINDOW);
    let mut summary = BlockSummary::new(session_id);
    let mut consecutive_failures = 0usize;

    'turn: for iteration in 0..MAX_ITERATIONS {
        if ctx.is_cancelled() {
            summary.status = "cancelled".to_string();
            break;
        }
        if deadline_ctx.is_cancelled() {
            summary = summary.with_error(
                "error",
                DispatchError::Timeout { elapsed_ms: turn_start.elapsed().as_millis() as u64 }.to_string(),
            );
            break;
        }

        let action = match agent.next_action(&utterance, &observations).await {
            Ok(action) => action,
            Err(message) => {
                summary = summary.with_error("error", message.clone());
                if !send_or_exit(&tx, &ctx, EventEnvelope::event(block_id, EventType::Error, message)).await {
                    return;
                }
                break;
            }
        };

        match action {
            AgentAction::Think(text) => {
                summary.thinking_duration_ms += 1;
                if !send_or_exit(&tx, &ctx, EventEnvelope::event(block_id, EventType::Thinking, text)).await {
                    return;
                }
            }
            AgentAction::CallTool { name, input } => {
                let call_key = (name.clone(), input.clone());
                if is_circular(&recent_calls, &call_key) {
                    let message = DispatchError::BudgetExceeded {
                        reason: format!("circular tool call detected: {name}"),
                    }
                    .to_string();
                    summary = summary.with_error("error", message.clone());
                    let _ = send_or_exit(&tx, &ctx, EventEnvelope::event(block_id, EventType::Error, message)).await;
                    break 'turn;
                }
                push_bounded(&mut recent_calls, call_key);

                if !send_or_exit(
                    &tx,
                    &ctx,
                    EventEnvelope::event_with_meta(
                        block_id,
                        EventType::ToolUse,
                        name.clone(),
                        EventMetadata {
                            tool_name: Some(name.clone()),
                            input_summary: Some(input.clone()),
                            ..Default::default()
                        },
                    ),
                )
                .await
                {
                    return;
                }

                let tool_started = Instant::now();
                let result = match tools.get(&name) {
                    Some(tool) => {
                        let tool_ctx = ctx.child_token();
                        tokio::select! {
                            res = tool.call(&input) => res,
                            _ = tokio::time::sleep(TOOL_TIMEOUT) => Err("tool timed out".to_string()),
                            _ = tool_ctx.cancelled() => Err("cancelled".to_string()),
                        }
                    }
                    None => Err(format!("no such tool: {name}")),
                };
                let tool_elapsed = tool_started.elapsed().as_millis() as u64;
                summary.tool_duration_ms += tool_elapsed;
                summary.tool_call_count += 1;
                if !summary.tools_used.contains(&name) {
                    summary.tools_used.push(name.clone());
                }

                let (status, error_msg) = match &result {
                    Ok(_) => {
                        consecutive_failures = 0;
                        ("ok".to_string(), None)
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        ("error".to_string(), Some(e.clone()))
                    }
                };

                if !send_or_exit(
                    &tx,
                    &ctx,
                    EventEnvelope::event_with_meta(
                        block_id,
                        EventType::ToolResult,
                        name.clone(),
                        EventMetadata {
                            tool_name: Some(name.clone()),
                            duration_ms: Some(tool_elapsed),
                            status: Some(status),
                            error_msg: error_msg.clone(),
                            ..Default::default()
                        },
                    ),
                )
                .await
                {
                    return;
                }

                observations.push(Observation {
                    tool: name,
                    input,
                    output: result,
                });

                if consecutive_failures >= MAX_TOOL_FAILURES {
                    let message = DispatchError::BudgetExceeded {
                        reason: "consecutive tool failure cap reached".to_string(),
                    }
                    .to_string();
                    summary = summary.with_error("error", message.clone());
                    let _ = send_or_exit(&tx, &ctx, EventEnvelope::event(block_id, EventType::Error, message)).await;
                    break 'turn;
                }
            }
            AgentAction::Respond(text) => {
                summary.generation_duration_ms += 1;
                summary.status = "ok".to_string();
                if !send_or_exit(&tx, &ctx, EventEnvelope::content(block_id, text.clone())).await {
                    return;
                }
                if !send_or_exit(&tx, &ctx, EventEnvelope::event(block_id, EventType::Answer, text)).await {
                    return;
                }
                break 'turn;
            }
        }

        if iteration + 1 == MAX_ITERATIONS {
            let message = DispatchError::BudgetExceeded {
                reason: format!("iteration cap ({MAX_ITERATIONS}) reached"),
            }
            .to_string();
            summary = summary.with_error("error", message);
        }
    }

    deadline_guard.abort();
    summary.total_duration_ms = turn_start.elapsed().as_millis() as u64;

    let _ = tx.send(EventEnvelope::terminal(block_id, Some(summary))).await;
    debug!(block_id, "dispatch turn finished");
}

fn is_circular(recent: &VecDeque<(String, String)>, candidate: &(String, String)) -> bool {
    recent.iter().filter(|c| *c == candidate).count() >= 2
}

fn push_bounded(recent: &mut VecDeque<(String, String)>, item: (String, String)) {
    if recent.len() >= CIRCULAR_DETECTOR_WINDOW {
        recent.pop_front();
    }
    recent.push_back(item);
}

/// Send an envelope, honoring backpressure. Returns `false` if the caller
/// should stop producing: the channel closed, or the context was cancelled
/// while the channel was full (spec §4.5, Backpressure).
async fn send_or_exit(tx: &mpsc::Sender<EventEnvelope>, ctx: &CancellationToken, envelope: EventEnvelope) -> bool {
    tokio::select! {
        res = tx.send(envelope) => res.is_ok(),
        _ = ctx.cancelled() => {
            warn!("dispatch cancelled mid-send, producer exiting");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::agent_runtime::{Agent, AgentAction, Observation, RespondImmediately, Tool};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

    #[tokio::test]
    async fn success_path_emits_single_terminal() {
        let dispatcher = StreamingDispatcher::new("session-1");
        let agent: Arc<dyn Agent> = Arc::new(RespondImmediately("hi there".to_string()));
        let mut rx = dispatcher.dispatch(
            CancellationToken::new(),
            1,
            "hello".to_string(),
            AgentType::General,
            agent,
            ToolSet::new(),
            DispatchOptions::new(),
            false,
        );

        let mut terminals = 0;
        let mut saw_answer = false;
        while let Some(envelope) = rx.recv().await {
            if envelope.is_terminal() {
                terminals += 1;
            }
            if let EventEnvelope::Event { event_type: EventType::Answer, .. } = &envelope {
                saw_answer = true;
            }
        }
        assert_eq!(terminals, 1);
        assert!(saw_answer);
    }

    struct AlwaysFailTool;
    impl Tool for AlwaysFailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn call<'a>(&'a self, _input: &'a str) -> BoxFuture<'a, Result<String, String>> {
            Box::pin(async move { Err("boom".to_string()) })
        }
    }

    struct AlwaysCallFailTool;
    impl Agent for AlwaysCallFailTool {
        fn next_action<'a>(&'a self, _utterance: &'a str, _observations: &'a [Observation]) -> BoxFuture<'a, Result<AgentAction, String>> {
            Box::pin(async move {
                Ok(AgentAction::CallTool {
                    name: "fail".to_string(),
                    input: "x".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn consecutive_tool_failures_hit_budget_and_terminate() {
        let dispatcher = StreamingDispatcher::new("session-2");
        let agent: Arc<dyn Agent> = Arc::new(AlwaysCallFailTool);
        let tools = ToolSet::new().with_tool(Arc::new(AlwaysFailTool));
        let mut rx = dispatcher.dispatch(
            CancellationToken::new(),
            2,
            "do it".to_string(),
            AgentType::General,
            agent,
            tools,
            DispatchOptions::new(),
            false,
        );

        let mut terminal_summary = None;
        while let Some(envelope) = rx.recv().await {
            if let EventEnvelope::Terminal { block_summary, .. } = envelope {
                terminal_summary = block_summary;
            }
        }
        let summary = terminal_summary.expect("terminal must carry a summary");
        assert_eq!(summary.status, "error");
        assert!(summary.tool_call_count <= MAX_TOOL_FAILURES as u64);
    }

    struct LoopingAgent(AtomicUsize);
    impl Agent for LoopingAgent {
        fn next_action<'a>(&'a self, _utterance: &'a str, _observations: &'a [Observation]) -> BoxFuture<'a, Result<AgentAction, String>> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(AgentAction::Think(format!("step {n}"))) })
        }
    }

    #[tokio::test]
    async fn iteration_cap_terminates_with_budget_error() {
        let dispatcher = StreamingDispatcher::new("session-3");
        let agent: Arc<dyn Agent> = Arc::new(LoopingAgent(AtomicUsize::new(0)));
        let mut rx = dispatcher.dispatch(
            CancellationToken::new(),
            3,
            "loop".to_string(),
            AgentType::General,
            agent,
            ToolSet::new(),
            DispatchOptions::new(),
            false,
        );

        let mut terminal_summary = None;
        let mut thinking_events = 0;
        while let Some(envelope) = rx.recv().await {
            match envelope {
                EventEnvelope::Terminal { block_summary, .. } => terminal_summary = block_summary,
                EventEnvelope::Event { event_type: EventType::Thinking, .. } => thinking_events += 1,
                _ => {}
            }
        }
        assert_eq!(thinking_events, MAX_ITERATIONS);
        assert_eq!(terminal_summary.unwrap().status, "error");
    }

    #[tokio::test]
    async fn cancelled_context_emits_single_cancelled_terminal() {
        let dispatcher = StreamingDispatcher::new("session-4");
        let ctx = CancellationToken::new();
        ctx.cancel();
        let agent: Arc<dyn Agent> = Arc::new(RespondImmediately("should not appear".to_string()));
        let mut rx = dispatcher.dispatch(
            ctx,
            4,
            "hi".to_string(),
            AgentType::General,
            agent,
            ToolSet::new(),
            DispatchOptions::new(),
            false,
        );

        let mut envelopes = Vec::new();
        while let Some(envelope) = rx.recv().await {
            envelopes.push(envelope);
        }
        assert_eq!(envelopes.len(), 1);
        match &envelopes[0] {
            EventEnvelope::Terminal { block_summary, .. } => {
                assert_eq!(block_summary.as_ref().unwrap().status, "cancelled");
            }
            _ => panic!("expected single terminal"),
        }
    }
}
