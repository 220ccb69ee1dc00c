use crate::config::SelectorConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, join_url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Client for the selector upstream: a small OpenAI-compatible completion call
/// with its own credentials, separate from every catalog model.
pub struct LlmClient {
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    base_url: String,
    http: HttpClient,
    /// Bound on a whole `complete` call, retries and backoff included.
    deadline: Duration,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        temperature: f64,
        max_tokens: u32,
        http: HttpClient,
    ) -> Self {
        let deadline = http.timeout();
        Self {
            api_key,
            model,
            temperature,
            max_tokens,
            base_url,
            http,
            deadline,
        }
    }

    /// Build from the `[selector]` section, reading the API key from the configured env var.
    pub fn from_config(config: &SelectorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            warn!(env = %config.api_key_env, "selector API key not set");
        }
        let http = HttpClient::new(
            concat!("agent-relay/", env!("CARGO_PKG_VERSION")),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_retries(config.max_retries);
        Ok(Self::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.temperature,
            config.max_tokens,
            http,
        ))
    }

    pub async fn complete(&self, system: &str, user_message: &str) -> Result<String> {
        debug!(model = %self.model, "sending selector request");

        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = join_url(&self.base_url, "chat/completions");
        let auth = format!("Bearer {}", self.api_key);
        let headers = [("Authorization", auth.as_str())];
        let call = self.http.post_json_raw(&url, &body, &headers);
        let response_text = match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result.map_err(|e| {
                warn!("selector API error: {e}");
                e
            })?,
            Err(_) => {
                warn!(timeout_secs = self.deadline.as_secs(), "selector call timed out");
                return Err(Error::selector(format!(
                    "selector did not answer within {}s",
                    self.deadline.as_secs()
                )));
            }
        };

        let resp: OpenAiResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse selector response: {e}")))?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::parse("empty response from selector"))
    }
}
