//! Environment configuration (spec §6, `AI_*` table).
//!
//! Resolved once at startup and cached behind a `OnceLock`, never re-read
//! implicitly mid-request (spec §9, Global-singletons note).

use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{ModelProfile, ProviderId};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_profile(prefix: &str) -> Result<Option<ModelProfile>, ConfigError> {
    let Some(provider_raw) = env_var(&format!("{prefix}_PROVIDER")) else {
        return Ok(None);
    };
    let provider = ProviderId::parse(&provider_raw)?;
    let base_url = env_var(&format!("{prefix}_BASE_URL")).unwrap_or_else(|| provider.default_base_url().to_string());
    let model = env_var(&format!("{prefix}_MODEL")).unwrap_or_else(|| "default".to_string());
    let api_key = env_var(&format!("{prefix}_API_KEY"));
    let timeout = env_var(&format!("{prefix}_TIMEOUT"))
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30));
    let profile = ModelProfile {
        provider,
        api_key,
        base_url,
        model,
        timeout,
    };
    profile.validate()?;
    Ok(Some(profile))
}

/// Master switch and per-role model profiles resolved from the environment
/// (spec §6: `AI_ENABLED`, `AI_LLM_*`, `AI_EMBEDDING_*`, `AI_RERANK_*`, `AI_INTENT_*`).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub enabled: bool,
    pub llm: Option<ModelProfile>,
    pub embedding: Option<ModelProfile>,
    pub rerank: Option<ModelProfile>,
    pub intent: Option<ModelProfile>,
    /// Directory of agent YAML descriptors (`AI_PARROTS_CONFIG_DIR`).
    pub parrots_config_dir: Option<String>,
    /// Template substitution in prompts only (`FRONTEND_BASE_URL`).
    pub frontend_base_url: Option<String>,
}

impl RouterConfig {
    /// Idempotent, thread-safe: reads `std::env` once per call but callers
    /// should route through [`global`] to avoid re-reading mid-request.
    pub fn from_env() -> Result<Self, ConfigError> {
        let enabled = env_var("AI_ENABLED").map(|v| v != "false" && v != "0").unwrap_or(true);
        Ok(Self {
            enabled,
            llm: parse_profile("AI_LLM")?,
            embedding: parse_profile("AI_EMBEDDING")?,
            rerank: parse_profile("AI_RERANK")?,
            intent: parse_profile("AI_INTENT")?,
            parrots_config_dir: env_var("AI_PARROTS_CONFIG_DIR"),
            frontend_base_url: env_var("FRONTEND_BASE_URL"),
        })
    }
}

static GLOBAL_CONFIG: OnceLock<RouterConfig> = OnceLock::new();

/// The process-wide configuration, constructed from the environment on
/// first access and never re-read implicitly afterwards.
pub fn global() -> &'static RouterConfig {
    GLOBAL_CONFIG.get_or_init(|| RouterConfig::from_env().unwrap_or(RouterConfig {
        enabled: false,
        llm: None,
        embedding: None,
        rerank: None,
        intent: None,
        parrots_config_dir: None,
        frontend_base_url: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default_without_master_switch_is_enabled() {
        // AI_ENABLED absent => enabled defaults to true per spec wording
        // ("Master switch; disables entire core when false").
        let config = RouterConfig {
            enabled: true,
            llm: None,
            embedding: None,
            rerank: None,
            intent: None,
            parrots_config_dir: None,
            frontend_base_url: None,
        };
        assert!(config.enabled);
    }
}
