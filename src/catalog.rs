//! Agent and model records, and the read-only store the router selects from.
//!
//! Writes to the catalog belong to whoever edits the catalog file; the router
//! only ever reads it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// An upstream target: where to send a request and with which key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Prefix prepended to the system message when no agent applies.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Model name sent upstream, when it differs from `id`.
    #[serde(default)]
    pub upstream_model: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub default: bool,
}

impl Model {
    pub fn upstream_model(&self) -> &str {
        self.upstream_model.as_deref().unwrap_or(&self.id)
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn prompt_prefix(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }
}

/// A behaviour profile layered over a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub default: bool,
}

impl Agent {
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Zero is not a usable token limit and counts as unset.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens.filter(|&n| n > 0)
    }
}

fn default_true() -> bool {
    true
}

/// Read access to the catalog.
///
/// Listings are ordered by priority, highest first. Records with equal priority
/// keep a stable order, which also decides between several default-flagged records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_agents(&self, include_inactive: bool) -> Result<Vec<Agent>>;

    async fn list_models(&self, include_inactive: bool) -> Result<Vec<Model>>;

    async fn model_by_id(&self, id: &str) -> Result<Option<Model>>;

    /// Default-flagged active agent, else the highest-priority active one.
    async fn default_agent(&self) -> Result<Option<Agent>> {
        let agents = self.list_agents(false).await?;
        Ok(pick_default(agents, |a| a.default))
    }

    /// Default-flagged active model, else the highest-priority active one.
    async fn default_model(&self) -> Result<Option<Model>> {
        let models = self.list_models(false).await?;
        Ok(pick_default(models, |m| m.default))
    }
}

/// `records` must already be active-only and priority-ordered.
fn pick_default<T>(records: Vec<T>, is_default: impl Fn(&T) -> bool) -> Option<T> {
    let idx = records.iter().position(is_default).unwrap_or(0);
    records.into_iter().nth(idx)
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Vec<Model>,
    #[serde(default)]
    agents: Vec<Agent>,
}

/// Catalog loaded once from a TOML file and held in memory.
#[derive(Debug, Default)]
pub struct FileCatalog {
    models: Vec<Model>,
    agents: Vec<Agent>,
}

impl FileCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read catalog {}: {e}", path.display()))
        })?;
        let file: CatalogFile = toml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse catalog: {e}")))?;
        let catalog = Self::from_records(file.models, file.agents)?;
        info!(
            path = %path.display(),
            models = catalog.models.len(),
            agents = catalog.agents.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Validate, resolve env-sourced keys and order the records.
    pub fn from_records(mut models: Vec<Model>, mut agents: Vec<Agent>) -> Result<Self> {
        ensure_unique(models.iter().map(|m| m.id.as_str()), "model")?;
        ensure_unique(agents.iter().map(|a| a.id.as_str()), "agent")?;

        for model in &mut models {
            if model.base_url.trim().is_empty() {
                return Err(Error::config(format!("model {} has no base_url", model.id)));
            }
            model.api_key = resolve_key(model.api_key.take(), model.api_key_env.as_deref());
        }
        for agent in &mut agents {
            agent.api_key = resolve_key(agent.api_key.take(), agent.api_key_env.as_deref());
            if let Some(model_id) = &agent.model_id
                && !models.iter().any(|m| &m.id == model_id)
            {
                warn!(agent = %agent.id, model = %model_id, "agent is bound to an unknown model");
            }
        }

        models.sort_by_key(|m| Reverse(m.priority));
        agents.sort_by_key(|a| Reverse(a.priority));
        Ok(Self { models, agents })
    }
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>, kind: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(Error::config(format!("{kind} with empty id")));
        }
        if !seen.insert(id) {
            return Err(Error::config(format!("duplicate {kind} id: {id}")));
        }
    }
    Ok(())
}

fn resolve_key(inline: Option<String>, env: Option<&str>) -> Option<String> {
    inline
        .filter(|k| !k.is_empty())
        .or_else(|| env.and_then(|var| std::env::var(var).ok()))
        .filter(|k| !k.is_empty())
}

#[async_trait]
impl CatalogStore for FileCatalog {
    async fn list_agents(&self, include_inactive: bool) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .iter()
            .filter(|a| include_inactive || a.active)
            .cloned()
            .collect())
    }

    async fn list_models(&self, include_inactive: bool) -> Result<Vec<Model>> {
        Ok(self
            .models
            .iter()
            .filter(|m| include_inactive || m.active)
            .cloned()
            .collect())
    }

    async fn model_by_id(&self, id: &str) -> Result<Option<Model>> {
        Ok(self.models.iter().find(|m| m.id == id).cloned())
    }
}
