use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ASSISTANT_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_ASSISTANT_MODEL: &str = "phi3";

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f64,
    pub max_tokens: u64,
    /// How long an assembled fact sheet is reused.
    pub facts_ttl: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ASSISTANT_URL.to_string(),
            model: DEFAULT_ASSISTANT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            temperature: 0.3,
            max_tokens: 120,
            facts_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub log_json: bool,
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = AssistantConfig::default();
        Self {
            assistant: AssistantConfig {
                endpoint: env_string("FEEDESK_ASSISTANT_URL", &defaults.endpoint),
                model: env_string("FEEDESK_ASSISTANT_MODEL", &defaults.model),
                timeout: Duration::from_secs(env_u64(
                    "FEEDESK_ASSISTANT_TIMEOUT_SECS",
                    defaults.timeout.as_secs(),
                )),
                temperature: defaults.temperature,
                max_tokens: env_u64("FEEDESK_ASSISTANT_MAX_TOKENS", defaults.max_tokens),
                facts_ttl: Duration::from_secs(env_u64(
                    "FEEDESK_FACTS_TTL_SECS",
                    defaults.facts_ttl.as_secs(),
                )),
            },
            log_json: env_bool("FEEDESK_LOG_JSON", false),
            workspace: env::var("FEEDESK_WORKSPACE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
