//! Free-text routing: pick an agent or a model for a request by asking a
//! classifier LLM, with deterministic fallbacks whenever it cannot answer.

pub mod agent;
pub mod model;

pub use agent::AgentSelector;
pub use model::ModelSelector;

use crate::catalog::{Agent, Model};
use crate::config::{CANDIDATES_PLACEHOLDER, USER_REQUEST_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::llm::LlmClient;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write;

/// What the classifier sees of one catalog record.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub model_id: Option<String>,
}

impl From<&Agent> for Candidate {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            description: agent.description.clone(),
            capabilities: agent.capabilities.clone(),
            model_id: agent.model_id.clone(),
        }
    }
}

impl From<&Model> for Candidate {
    fn from(model: &Model) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            description: model.description.clone(),
            capabilities: model.capabilities.clone(),
            model_id: None,
        }
    }
}

/// Maps free text to one candidate id. The answer is not trusted: callers
/// check it against the candidate set.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, candidates: &[Candidate], text: &str) -> Result<String>;
}

/// Classifier backed by a chat-completion call to the selector upstream.
pub struct HttpClassifier {
    llm: LlmClient,
    template: String,
}

impl HttpClassifier {
    pub fn new(llm: LlmClient, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
        }
    }

    pub fn render_prompt(&self, candidates: &[Candidate], text: &str) -> String {
        render_prompt(&self.template, candidates, text)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, candidates: &[Candidate], text: &str) -> Result<String> {
        let prompt = self.render_prompt(candidates, text);
        let reply = self.llm.complete(&prompt, text).await?;
        let id = parse_reply(&reply);
        if id.is_empty() {
            return Err(Error::selector("selector returned an empty reply"));
        }
        Ok(id.to_string())
    }
}

fn render_prompt(template: &str, candidates: &[Candidate], text: &str) -> String {
    let mut listing = String::new();
    for c in candidates {
        let _ = writeln!(listing, "id: {}", c.id);
        let _ = writeln!(listing, "name: {}", c.name);
        let _ = writeln!(listing, "description: {}", c.description);
        let _ = writeln!(listing, "capabilities: {}", c.capabilities.join(", "));
        if let Some(model) = &c.model_id {
            let _ = writeln!(listing, "model: {model}");
        }
        listing.push_str("---\n");
    }
    template
        .replace(CANDIDATES_PLACEHOLDER, listing.trim_end())
        .replace(USER_REQUEST_PLACEHOLDER, text)
}

/// The reply should be a bare id; tolerate surrounding whitespace, quotes and backticks.
pub fn parse_reply(reply: &str) -> &str {
    reply
        .trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'')
        .trim()
}

/// Why a selector settled on its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Nothing active to choose from.
    NoCandidates,
    /// Exactly one active record; no classifier call.
    OnlyCandidate,
    /// The classifier named a known record.
    Classified,
    /// The classifier answer was unusable; the store default was used.
    Fallback,
    /// Every fallback failed; the configured last resort was used.
    LastResort,
    /// Nothing could be resolved.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection<T> {
    pub choice: Option<T>,
    pub reason: SelectionReason,
}

impl<T> Selection<T> {
    pub fn new(choice: Option<T>, reason: SelectionReason) -> Self {
        Self { choice, reason }
    }
}
