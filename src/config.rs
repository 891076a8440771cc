//! config.rs — engine configuration: TOML file + env overrides + defaults.
//!
//! Mirrors the layered loading used for the rest of the service config:
//! a checked-in `config/engine.toml` gives ops a reload point, env vars
//! win for deploy-specific values, and hard defaults keep local runs and
//! tests working with no file at all.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_ENGINE_CONFIG_PATH: &str = "ENGINE_CONFIG_PATH";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

fn default_rate_limit_window_secs() -> i64 {
    60
}
fn default_rate_limit_max() -> u32 {
    20
}
fn default_cooldown_secs() -> i64 {
    5
}
fn default_history_cap() -> usize {
    30
}
fn default_scheduler_interval_secs() -> u64 {
    5
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Small, deliberately incomplete insult list; a policy/content knob, so it
/// lives in config rather than code. Matching is case-insensitive substring.
fn default_aggression_words() -> Vec<String> {
    [
        "stupid", "idiot", "ugly", "hate you", "shut up", "loser", "aptal", "salak", "gerizekali",
        "bla bla", "dumm", "halt die klappe", "imbecile", "tais-toi",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: i64,
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_limit_window_secs(),
            max_requests: default_rate_limit_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggressionConfig {
    #[serde(default = "default_aggression_words")]
    pub words: Vec<String>,
}

impl Default for AggressionConfig {
    fn default() -> Self {
        Self {
            words: default_aggression_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Completion model name passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,
    /// Conversation-level default when bot/group/global specify nothing.
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: i64,
    /// History window handed to the completion API, most recent first cap.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Poll interval of the fallback-job worker.
    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub aggression: AggressionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            default_cooldown_secs: default_cooldown_secs(),
            history_cap: default_history_cap(),
            scheduler_interval_secs: default_scheduler_interval_secs(),
            rate_limit: RateLimitConfig::default(),
            aggression: AggressionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: EngineConfig = toml::from_str(&data)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve the config path from env (or default) and load it; a missing
    /// or unparsable file falls back to defaults so the service still boots.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_ENGINE_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_ENGINE_CONFIG_PATH.to_string());
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(%path, error = %err, "engine config not loaded, using defaults");
                Self::default()
            }
        }
    }

    fn sanitize(&mut self) {
        if self.rate_limit.window_secs <= 0 {
            self.rate_limit.window_secs = default_rate_limit_window_secs();
        }
        if self.rate_limit.max_requests == 0 {
            self.rate_limit.max_requests = default_rate_limit_max();
        }
        if self.default_cooldown_secs < 0 {
            self.default_cooldown_secs = default_cooldown_secs();
        }
        if self.history_cap == 0 {
            self.history_cap = default_history_cap();
        }
        if self.scheduler_interval_secs == 0 {
            self.scheduler_interval_secs = default_scheduler_interval_secs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_cooldown_secs, 5);
        assert_eq!(cfg.history_cap, 30);
        assert!(cfg.rate_limit.max_requests > 0);
        assert!(!cfg.aggression.words.is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            model = "gpt-4o"
            [rate_limit]
            max_requests = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.rate_limit.max_requests, 5);
        assert_eq!(cfg.rate_limit.window_secs, 60);
        assert_eq!(cfg.default_cooldown_secs, 5);
    }

    #[test]
    #[serial_test::serial]
    fn from_env_falls_back_to_defaults_when_file_missing() {
        std::env::set_var(ENV_ENGINE_CONFIG_PATH, "/nonexistent/engine.toml");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.default_cooldown_secs, 5);
        assert_eq!(cfg.model, "gpt-4o-mini");
        std::env::remove_var(ENV_ENGINE_CONFIG_PATH);
    }

    #[test]
    fn sanitize_rejects_zero_window() {
        let mut cfg = EngineConfig::default();
        cfg.rate_limit.window_secs = -3;
        cfg.sanitize();
        assert_eq!(cfg.rate_limit.window_secs, 60);
    }
}
