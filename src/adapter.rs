//! Merge the resolved agent and model into the caller's request.

use crate::catalog::{Agent, Model};
use crate::chat::{ChatMessage, ChatRequest};
use crate::http::join_url;
use std::fmt;

/// Where the forward call goes and the key it carries.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub base_url: String,
    pub api_key: String,
}

impl Credentials {
    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, "chat/completions")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Build the effective request for `model`, applying `agent` overrides when
/// one was resolved and the model's prompt prefix otherwise. `original` is
/// left untouched.
pub fn adapt(
    original: &ChatRequest,
    agent: Option<&Agent>,
    model: &Model,
) -> (ChatRequest, Credentials) {
    let mut request = original.clone();
    request.model = Some(model.upstream_model().to_string());

    let api_key = match agent {
        Some(agent) => {
            apply_agent(&mut request, agent);
            agent.api_key().unwrap_or(model.api_key())
        }
        None => {
            if let Some(prefix) = model.prompt_prefix() {
                prefix_system_prompt(&mut request.messages, prefix);
            }
            model.api_key()
        }
    };

    let credentials = Credentials {
        base_url: model.base_url.clone(),
        api_key: api_key.to_string(),
    };
    (request, credentials)
}

fn apply_agent(request: &mut ChatRequest, agent: &Agent) {
    if !agent.system_prompt.is_empty() {
        replace_system_prompt(&mut request.messages, &agent.system_prompt);
    }
    if let Some(t) = agent.temperature {
        request.temperature = Some(t);
    }
    if let Some(p) = agent.top_p {
        request.top_p = Some(p);
    }
    if let Some(n) = agent.max_tokens() {
        request.max_tokens = Some(n);
    }
}

/// Overwrite the first system message in place, or insert one at the front.
fn replace_system_prompt(messages: &mut Vec<ChatMessage>, prompt: &str) {
    match messages.iter_mut().find(|m| m.is_system()) {
        Some(msg) => msg.content = Some(prompt.into()),
        None => messages.insert(0, ChatMessage::system(prompt)),
    }
}

/// Prefix a leading system message, or insert the prefix as one.
fn prefix_system_prompt(messages: &mut Vec<ChatMessage>, prefix: &str) {
    match messages.first_mut() {
        Some(first) if first.is_system() => first.prepend_text(prefix),
        _ => messages.insert(0, ChatMessage::system(prefix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> Model {
        Model {
            id: "big".into(),
            name: "Big".into(),
            description: String::new(),
            capabilities: vec![],
            base_url: "https://llm.example.com/v1/".into(),
            api_key: Some("sk-model".into()),
            api_key_env: None,
            prompt: Some("House rules.".into()),
            upstream_model: None,
            priority: 0,
            active: true,
            default: false,
        }
    }

    fn agent() -> Agent {
        Agent {
            id: "code-expert".into(),
            name: "Code Expert".into(),
            description: String::new(),
            capabilities: vec![],
            model_id: Some("big".into()),
            api_key: None,
            api_key_env: None,
            system_prompt: "You write code.".into(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            priority: 0,
            active: true,
            default: false,
        }
    }

    fn request(value: serde_json::Value) -> ChatRequest {
        serde_json::from_value(value).unwrap()
    }

    fn roles(req: &ChatRequest) -> Vec<&str> {
        req.messages.iter().map(|m| m.role.as_str()).collect()
    }

    #[test]
    fn agent_inserts_system_message_at_front() {
        let original = request(json!({
            "model": "whatever",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let (req, _) = adapt(&original, Some(&agent()), &model());
        assert_eq!(roles(&req), ["system", "user"]);
        assert_eq!(req.messages[0].text(), "You write code.");
        assert_eq!(req.model.as_deref(), Some("big"));
    }

    #[test]
    fn agent_replaces_existing_system_message_in_place() {
        let original = request(json!({
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "system", "content": "old"},
                {"role": "assistant", "content": "ok"},
                {"role": "user", "content": "second"}
            ]
        }));
        let (req, _) = adapt(&original, Some(&agent()), &model());
        assert_eq!(roles(&req), ["user", "system", "assistant", "user"]);
        assert_eq!(req.messages[1].text(), "You write code.");
        assert_eq!(req.messages[0].text(), "first");
        assert_eq!(req.messages[3].text(), "second");
    }

    #[test]
    fn explicit_agent_overrides_replace_caller_values() {
        let mut agent = agent();
        agent.temperature = Some(0.1);
        agent.top_p = Some(0.5);
        agent.max_tokens = Some(256);
        let original = request(json!({
            "messages": [],
            "temperature": 0.9,
            "top_p": 1.0,
            "max_tokens": 10
        }));
        let (req, _) = adapt(&original, Some(&agent), &model());
        assert_eq!(req.temperature, Some(0.1));
        assert_eq!(req.top_p, Some(0.5));
        assert_eq!(req.max_tokens, Some(256));
    }

    #[test]
    fn unset_agent_fields_leave_caller_values() {
        let mut agent = agent();
        agent.max_tokens = Some(0);
        let original = request(json!({
            "messages": [],
            "temperature": 0.9,
            "max_tokens": 10
        }));
        let (req, _) = adapt(&original, Some(&agent), &model());
        assert_eq!(req.temperature, Some(0.9));
        assert_eq!(req.top_p, None);
        assert_eq!(req.max_tokens, Some(10));
    }

    #[test]
    fn agent_key_wins_over_model_key() {
        let original = request(json!({"messages": []}));
        let (_, creds) = adapt(&original, Some(&agent()), &model());
        assert_eq!(creds.api_key, "sk-model");

        let mut keyed = agent();
        keyed.api_key = Some("sk-agent".into());
        let (_, creds) = adapt(&original, Some(&keyed), &model());
        assert_eq!(creds.api_key, "sk-agent");
        assert_eq!(creds.endpoint(), "https://llm.example.com/v1/chat/completions");
    }

    #[test]
    fn agent_path_ignores_model_prefix() {
        let original = request(json!({
            "messages": [{"role": "system", "content": "orig"}]
        }));
        let (req, _) = adapt(&original, Some(&agent()), &model());
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].text(), "You write code.");
    }

    #[test]
    fn model_prefix_joins_leading_system_message() {
        let original = request(json!({
            "messages": [
                {"role": "system", "content": "orig"},
                {"role": "user", "content": "hi"}
            ]
        }));
        let (req, _) = adapt(&original, None, &model());
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].text(), "House rules.\n\norig");
    }

    #[test]
    fn model_prefix_inserts_when_first_message_is_not_system() {
        let original = request(json!({
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "system", "content": "late"}
            ]
        }));
        let (req, _) = adapt(&original, None, &model());
        assert_eq!(roles(&req), ["system", "user", "system"]);
        assert_eq!(req.messages[0].text(), "House rules.");
        assert_eq!(req.messages[2].text(), "late");
    }

    #[test]
    fn no_prefix_leaves_messages_alone() {
        let mut model = model();
        model.prompt = Some(String::new());
        model.upstream_model = Some("vendor/big".into());
        let original = request(json!({
            "model": "caller",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }));
        let (req, _) = adapt(&original, None, &model);
        assert_eq!(req.messages, original.messages);
        assert_eq!(req.model.as_deref(), Some("vendor/big"));
        assert!(req.is_stream());
    }

    #[test]
    fn original_request_is_not_mutated() {
        let original = request(json!({
            "model": "caller",
            "messages": [{"role": "system", "content": "orig"}],
            "temperature": 0.7
        }));
        let snapshot = original.clone();
        let mut agent = agent();
        agent.temperature = Some(0.0);
        let _ = adapt(&original, Some(&agent), &model());
        let _ = adapt(&original, None, &model());
        assert_eq!(original, snapshot);
    }

    #[test]
    fn credentials_debug_hides_key() {
        let original = request(json!({"messages": []}));
        let (_, creds) = adapt(&original, None, &model());
        assert!(!format!("{creds:?}").contains("sk-model"));
    }
}
