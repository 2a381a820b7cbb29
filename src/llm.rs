//! LLM collaborator interface (spec §6).
//!
//! Provider-specific chat clients are external collaborators (spec §1): this
//! module defines only the opaque text-in/text-out contract the dispatcher
//! consumes, plus the provider registry for base-URL/auth resolution.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One message in a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A tool descriptor passed to `chat_with_tools` (opaque to the LLM
/// collaborator interface; tool implementations are external per spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Token-usage and latency accounting for one model call (spec §3,
/// §4.5 LLM call accounting).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LlmCallStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub time_to_first_token_ms: u64,
    pub total_generation_ms: u64,
}

impl LlmCallStats {
    pub fn merge(&mut self, other: &LlmCallStats) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cached_tokens += other.cached_tokens;
        self.time_to_first_token_ms = self.time_to_first_token_ms.max(other.time_to_first_token_ms);
        self.total_generation_ms += other.total_generation_ms;
    }
}

/// A streamed content chunk or a terminal stats/error signal.
pub enum StreamItem {
    Content(String),
    Stats(LlmCallStats),
    Error(String),
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque chat collaborator: text-in/text-out with token-usage reporting.
/// Object-safe via boxed futures so it can be injected as `Arc<dyn LlmClient>`.
pub trait LlmClient: Send + Sync {
    fn chat<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<(String, LlmCallStats), String>>;

    /// Streams content chunks followed by a final stats item (or an error item).
    fn chat_stream<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<tokio::sync::mpsc::Receiver<StreamItem>, String>>;

    fn chat_with_tools<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolDescriptor],
    ) -> BoxFuture<'a, Result<(String, LlmCallStats), String>>;
}

/// Recognised provider identifiers (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderId {
    OpenAi,
    DeepSeek,
    SiliconFlow,
    Ollama,
    Zai,
    DashScope,
    OpenRouter,
}

impl ProviderId {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "siliconflow" => Ok(Self::SiliconFlow),
            "ollama" => Ok(Self::Ollama),
            "zai" => Ok(Self::Zai),
            "dashscope" => Ok(Self::DashScope),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(ConfigError::UnknownProvider { provider: other.to_string() }),
        }
    }

    /// Default base URL for this provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "https://api.openai.com/v1",
            ProviderId::DeepSeek => "https://api.deepseek.com/v1",
            ProviderId::SiliconFlow => "https://api.siliconflow.cn/v1",
            ProviderId::Ollama => "http://localhost:11434",
            ProviderId::Zai => "https://api.z.ai/v1",
            ProviderId::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            ProviderId::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Whether this provider requires an API key (spec §6: "API key
    /// required unless provider is `ollama`").
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::Ollama)
    }
}

/// Resolved configuration for one model role (main chat, embedding,
/// rerank, or intent-fallback — spec §6, `AI_*` environment table).
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub provider: ProviderId,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl ModelProfile {
    /// Validate credential requirements (spec §7, `ConfigError` — "fails at
    /// construction, not at request time").
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.requires_api_key() && self.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingApiKey {
                provider: format!("{:?}", self.provider),
            });
        }
        Ok(())
    }
}
