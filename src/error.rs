//! Rich diagnostic error types for the routing and dispatch core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the router core.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum RouterCoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Feedback(#[from] FeedbackError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

pub type RouterResult<T> = std::result::Result<T, RouterCoreError>;

// ---------------------------------------------------------------------------
// Router (classification) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RouterError {
    #[error("classification cancelled")]
    #[diagnostic(
        code(router::router::cancelled),
        help("The caller's context was cancelled before a routing decision was produced.")
    )]
    Cancelled,

    #[error("registry returned unknown agent type for intent {intent}")]
    #[diagnostic(
        code(router::router::invariant),
        help(
            "Every non-unknown intent must map to a defined agent type via the registry. \
             This indicates a programmer error in registry configuration."
        )
    )]
    Invariant { intent: String },

    #[error("semantic matcher failed: {message}")]
    #[diagnostic(
        code(router::router::semantic_failure),
        help("The L3 semantic fallback collaborator returned an error; classification degrades to unknown.")
    )]
    SemanticFailure { message: String },
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("intent {intent} is already registered")]
    #[diagnostic(
        code(router::registry::duplicate_intent),
        help("Remove the existing IntentConfig before re-registering, or use a distinct intent name.")
    )]
    DuplicateIntent { intent: String },

    #[error("invalid regex pattern \"{pattern}\": {source}")]
    #[diagnostic(
        code(router::registry::bad_pattern),
        help("Fix the regex syntax in the IntentConfig pattern list.")
    )]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no intent registered for agent type {agent_type}")]
    #[diagnostic(
        code(router::registry::no_default_intent),
        help("Register at least one IntentConfig for this agent type.")
    )]
    NoDefaultIntent { agent_type: String },
}

// ---------------------------------------------------------------------------
// Cache errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache capacity must be greater than zero")]
    #[diagnostic(
        code(router::cache::zero_capacity),
        help("Configure RoutingCache with a capacity of at least 1.")
    )]
    ZeroCapacity,
}

// ---------------------------------------------------------------------------
// Feedback errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FeedbackError {
    #[error("weight store I/O error: {source}")]
    #[diagnostic(
        code(router::feedback::store_io),
        help("Check that the weight-store data directory exists and is writable.")
    )]
    StoreIo {
        #[source]
        source: std::io::Error,
    },

    #[error("weight store backend error: {message}")]
    #[diagnostic(
        code(router::feedback::store_backend),
        help("The persistent weight-store backend reported an error during a transaction.")
    )]
    StoreBackend { message: String },

    #[error("adjustment queue is closed")]
    #[diagnostic(
        code(router::feedback::queue_closed),
        help("The feedback drain worker has shut down; this happens after lifecycle shutdown has begun.")
    )]
    QueueClosed,
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error("dispatch cancelled")]
    #[diagnostic(
        code(router::dispatch::cancelled),
        help("The caller cancelled the dispatch context; this is not retried.")
    )]
    Cancelled,

    #[error("dispatch timed out after {elapsed_ms}ms")]
    #[diagnostic(
        code(router::dispatch::timeout),
        help("The per-turn deadline was exceeded. Consider raising the agent or stream timeout.")
    )]
    Timeout { elapsed_ms: u64 },

    #[error("provider error: {message}")]
    #[diagnostic(
        code(router::dispatch::provider_error),
        help("The upstream model provider returned a network or malformed-response error. Retried at most once.")
    )]
    ProviderError { message: String },

    #[error("tool {tool} failed: {message}")]
    #[diagnostic(
        code(router::dispatch::tool_error),
        help("A tool invocation failed; this counts against the consecutive tool-failure budget.")
    )]
    ToolError { tool: String, message: String },

    #[error("budget exceeded: {reason}")]
    #[diagnostic(
        code(router::dispatch::budget_exceeded),
        help("Either the reasoning-iteration cap or the consecutive tool-failure cap was reached. Not retriable.")
    )]
    BudgetExceeded { reason: String },

    #[error("config error: {message}")]
    #[diagnostic(
        code(router::dispatch::config_error),
        help("A required provider credential or base URL is missing. Fix the environment configuration and restart.")
    )]
    ConfigError { message: String },
}

// ---------------------------------------------------------------------------
// Store errors (weight-store / cache persistence)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(router::store::io),
        help("A filesystem operation failed. Check that the data directory exists and has correct permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb error: {message}")]
    #[diagnostic(
        code(router::store::redb),
        help("The embedded redb transaction failed. The database file may be corrupt or locked by another process.")
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(router::store::serde),
        help("Failed to encode or decode a stored value. This usually indicates a schema change without migration.")
    )]
    Serde { message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(router::config::no_home),
        help("Set the HOME environment variable or ensure a valid user profile exists.")
    )]
    NoHome,

    #[error("missing required environment variable: {key}")]
    #[diagnostic(
        code(router::config::missing_env),
        help("Set {key} before starting the router core. See the AI_* environment table in the crate docs.")
    )]
    MissingEnv { key: String },

    #[error("provider {provider} requires an API key")]
    #[diagnostic(
        code(router::config::missing_api_key),
        help("Set AI_LLM_API_KEY (or the provider-specific equivalent) unless the provider is \"ollama\".")
    )]
    MissingApiKey { provider: String },

    #[error("unknown provider: {provider}")]
    #[diagnostic(
        code(router::config::unknown_provider),
        help("Recognised providers: openai, deepseek, siliconflow, ollama, zai, dashscope, openrouter.")
    )]
    UnknownProvider { provider: String },
}
