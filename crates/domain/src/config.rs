use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level hub configuration, loaded from `config.toml` with environment
/// overrides for secrets.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum in-flight HTTP requests before the concurrency-limit layer
    /// starts shedding load. Overridable via `HUB_MAX_CONCURRENT_REQUESTS`.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors: CorsConfig::default(),
            max_concurrent_requests: d_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. `["*"]` is fully permissive.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one `<session_id>.json` file per session.
    #[serde(default = "d_sessions_dir")]
    pub directory: PathBuf,
    /// Default model used for sessions created without an explicit model.
    #[serde(default = "d_model")]
    pub default_model: String,
    #[serde(default = "d_max_tokens")]
    pub default_max_tokens: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            directory: d_sessions_dir(),
            default_model: d_model(),
            default_max_tokens: d_max_tokens(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Base URL for the configured provider's HTTP API.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the provider API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: None,
            api_key_env: d_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Anthropic,
}

/// Severity of a config validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Validate the configuration, returning warnings and hard errors.
    /// Mirrors the teacher's `Config::validate` convention: warnings don't
    /// block startup, errors do.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "server.port must be nonzero".into(),
            });
        }
        if std::env::var(&self.llm.api_key_env).is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "{} not set — provider calls will fail until configured",
                    self.llm.api_key_env
                ),
            });
        }
        issues
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    9600
}
fn d_max_concurrent() -> usize {
    256
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_sessions_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}
fn d_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_max_tokens() -> u32 {
    8192
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string(&cfg).expect("serialize");
        let back: Config = toml::from_str(&s).expect("deserialize");
        assert_eq!(back.server.port, cfg.server.port);
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }
}
