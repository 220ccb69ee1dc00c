use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared key callers must send as a bearer token. Unset disables the check.
    pub api_key: Option<String>,
    #[serde(default = "default_server_key_env")]
    pub api_key_env: String,
}

impl ServerConfig {
    /// Inline key, else the one in `api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
            api_key_env: default_server_key_env(),
        }
    }
}

/// The classifier upstream both selectors call.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_selector_model")]
    pub model: String,
    #[serde(default = "default_selector_base_url")]
    pub base_url: String,
    /// Inline key; takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    #[serde(default = "default_selector_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_selector_temperature")]
    pub temperature: f64,
    #[serde(default = "default_selector_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_selector_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_selector_retries")]
    pub max_retries: u32,
    /// Last-resort model id when no catalog model can be resolved.
    pub fallback_model_id: Option<String>,
}

impl SelectorConfig {
    pub fn fallback_model_id(&self) -> &str {
        self.fallback_model_id.as_deref().unwrap_or(&self.model)
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            model: default_selector_model(),
            base_url: default_selector_base_url(),
            api_key: None,
            api_key_env: default_selector_key_env(),
            temperature: default_selector_temperature(),
            max_tokens: default_selector_max_tokens(),
            timeout_secs: default_selector_timeout(),
            max_retries: default_selector_retries(),
            fallback_model_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Bounds the wait for response headers, and for the body of buffered calls.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            response_timeout_secs: default_response_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Selector prompt templates. `{{CANDIDATES}}` and `{{USER_REQUEST}}` are substituted.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_agent_prompt")]
    pub agent_selector: String,
    #[serde(default = "default_model_prompt")]
    pub model_selector: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            agent_selector: default_agent_prompt(),
            model_selector: default_model_prompt(),
        }
    }
}

pub const CANDIDATES_PLACEHOLDER: &str = "{{CANDIDATES}}";
pub const USER_REQUEST_PLACEHOLDER: &str = "{{USER_REQUEST}}";

// Defaults
fn default_bind() -> String {
    std::env::var("AGENT_RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:3000".into())
}
fn default_server_key_env() -> String {
    "API_KEY".into()
}
fn default_selector_model() -> String {
    std::env::var("SELECTOR_MODEL_ID").unwrap_or_else(|_| "gpt-4".into())
}
fn default_selector_base_url() -> String {
    std::env::var("SELECTOR_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into())
}
fn default_selector_key_env() -> String {
    "SELECTOR_API_KEY".into()
}
fn default_selector_temperature() -> f64 {
    0.3
}
fn default_selector_max_tokens() -> u32 {
    50
}
fn default_selector_timeout() -> u64 {
    15
}
fn default_selector_retries() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_response_timeout() -> u64 {
    120
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.toml")
}
fn default_agent_prompt() -> String {
    "You are an agent router. Pick the agent best suited to answer the user's request.\n\
     Available agents:\n\n\
     {{CANDIDATES}}\n\n\
     The user's request is: \"{{USER_REQUEST}}\"\n\n\
     Reply with the id of exactly one agent and nothing else."
        .into()
}
fn default_model_prompt() -> String {
    "You are a model router. Pick the model best suited to answer the user's request.\n\
     Available models:\n\n\
     {{CANDIDATES}}\n\n\
     The user's request is: \"{{USER_REQUEST}}\"\n\n\
     Reply with the id of exactly one model and nothing else."
        .into()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse config: {e}")))?;
        if config.catalog.path.is_relative()
            && let Some(parent) = path.parent()
        {
            config.catalog.path = parent.join(&config.catalog.path);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.selector.base_url.trim().is_empty() {
            return Err(Error::config("selector.base_url must not be empty"));
        }
        if self.selector.model.trim().is_empty() {
            return Err(Error::config("selector.model must not be empty"));
        }
        for (name, template) in [
            ("prompts.agent_selector", &self.prompts.agent_selector),
            ("prompts.model_selector", &self.prompts.model_selector),
        ] {
            if !template.contains(CANDIDATES_PLACEHOLDER) {
                return Err(Error::config(format!(
                    "{name} must contain {CANDIDATES_PLACEHOLDER}"
                )));
            }
        }
        if self.upstream.response_timeout_secs == 0 || self.selector.timeout_secs == 0 {
            return Err(Error::config("timeouts must be at least one second"));
        }
        Ok(())
    }
}
