//! The agent reasoning-loop abstraction driven by the streaming dispatcher
//! (spec §4.5, Reasoning loop bounds / Tool execution).
//!
//! Prompts and concrete tool implementations are external collaborators
//! (spec §1); this module defines only the plan→act→observe contract and
//! the bounds the dispatcher enforces around it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One observed tool result fed back into the next reasoning step.
#[derive(Debug, Clone)]
pub struct Observation {
    pub tool: String,
    pub input: String,
    pub output: Result<String, String>,
}

/// What the agent wants to do next.
#[derive(Debug, Clone)]
pub enum AgentAction {
    /// Emit a `thinking` event and continue the loop.
    Think(String),
    /// Invoke a tool by name with the given input.
    CallTool { name: String, input: String },
    /// Produce the final answer and terminate the loop.
    Respond(String),
}

/// A specialist handler (memo / schedule / general / ideation). The
/// dispatcher drives the loop; the agent only decides the next action
/// given the utterance and the observations so far.
pub trait Agent: Send + Sync {
    fn next_action<'a>(
        &'a self,
        utterance: &'a str,
        observations: &'a [Observation],
    ) -> BoxFuture<'a, Result<AgentAction, String>>;
}

/// A business tool invoked by agents (memo search, schedule creation, ...).
/// Implementations are external collaborators (spec §1); this is the
/// interface shape the dispatcher consumes.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn call<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, String>>;
}

/// A named registry of tools available to one dispatch.
#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

/// A single-turn agent that replies immediately without calling tools —
/// useful as a default `general`/`ideation` handler and in tests.
pub struct RespondImmediately(pub String);

impl Agent for RespondImmediately {
    fn next_action<'a>(&'a self, _utterance: &'a str, _observations: &'a [Observation]) -> BoxFuture<'a, Result<AgentAction, String>> {
        Box::pin(async move { Ok(AgentAction::Respond(self.0.clone())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn call<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, String>> {
            Box::pin(async move { Ok(input.to_string()) })
        }
    }

    #[tokio::test]
    async fn respond_immediately_returns_configured_text() {
        let agent = RespondImmediately("hello".to_string());
        let action = agent.next_action("hi", &[]).await.unwrap();
        match action {
            AgentAction::Respond(text) => assert_eq!(text, "hello"),
            _ => panic!("expected respond"),
        }
    }

    #[tokio::test]
    async fn tool_set_lookup() {
        let set = ToolSet::new().with_tool(Arc::new(EchoTool));
        let tool = set.get("echo").unwrap();
        assert_eq!(tool.call("ping").await.unwrap(), "ping");
        assert!(set.get("missing").is_none());
    }
}
