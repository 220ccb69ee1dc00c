//! Request routing: agent selection → model resolution → adaptation → forward.

use crate::adapter::{self, Credentials};
use crate::catalog::{Agent, CatalogStore, Model};
use crate::chat::ChatRequest;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::forward::{Relay, UpstreamForwarder};
use crate::llm::LlmClient;
use crate::selector::{AgentSelector, HttpClassifier, ModelSelector, SelectionReason};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Everything decided about a request before it is forwarded.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub agent: Option<Agent>,
    pub agent_reason: SelectionReason,
    pub model: Model,
    /// `None` when the model came from the agent binding or the caller.
    pub model_reason: Option<SelectionReason>,
    pub request: ChatRequest,
    pub credentials: Credentials,
}

impl RoutePlan {
    /// Secret-free view of the plan.
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "agent": self.agent.as_ref().map(|a| &a.id),
            "agent_reason": self.agent_reason,
            "model": self.model.id,
            "model_reason": self.model_reason,
            "upstream_model": self.request.model,
            "endpoint": self.credentials.endpoint(),
            "stream": self.request.is_stream(),
            "messages": self.request.messages.len(),
        })
    }
}

pub struct Dispatcher {
    store: Arc<dyn CatalogStore>,
    agents: AgentSelector,
    models: ModelSelector,
    forwarder: UpstreamForwarder,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        agents: AgentSelector,
        models: ModelSelector,
        forwarder: UpstreamForwarder,
    ) -> Self {
        Self {
            store,
            agents,
            models,
            forwarder,
        }
    }

    /// Wire selectors and forwarder from config, classifying through the selector upstream.
    pub fn from_config(config: &Config, store: Arc<dyn CatalogStore>) -> Result<Self> {
        let agent_classifier = HttpClassifier::new(
            LlmClient::from_config(&config.selector)?,
            config.prompts.agent_selector.clone(),
        );
        let model_classifier = HttpClassifier::new(
            LlmClient::from_config(&config.selector)?,
            config.prompts.model_selector.clone(),
        );
        let agents = AgentSelector::new(store.clone(), Arc::new(agent_classifier));
        let models = ModelSelector::new(
            store.clone(),
            Arc::new(model_classifier),
            config.selector.fallback_model_id(),
        );
        let forwarder = UpstreamForwarder::from_config(&config.upstream)?;
        Ok(Self::new(store, agents, models, forwarder))
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Resolve agent and model for `request` and build the effective request.
    /// Fails only when the resolved model id has no catalog record.
    pub async fn plan(&self, request: &ChatRequest) -> Result<RoutePlan> {
        let text = request.user_text();
        let agent_selection = self.agents.select(&text).await;
        let agent = agent_selection.choice;

        let caller_model = request.model.clone().filter(|m| !m.is_empty());
        let bound_model = agent
            .as_ref()
            .and_then(|a| a.model_id.clone())
            .filter(|m| !m.is_empty());

        let (model_id, model_reason) = match (&agent, bound_model, caller_model) {
            (Some(_), Some(bound), _) => (bound, None),
            (Some(_), None, Some(caller)) => (caller, None),
            _ => {
                let (id, reason) = self.models.select(&text).await;
                (id, Some(reason))
            }
        };

        let model = self
            .store
            .model_by_id(&model_id)
            .await?
            .ok_or_else(|| Error::model_not_found(&model_id))?;

        let (effective, credentials) = adapter::adapt(request, agent.as_ref(), &model);
        info!(
            agent = agent.as_ref().map(|a| a.id.as_str()).unwrap_or("-"),
            model = %model.id,
            endpoint = %credentials.endpoint(),
            "route planned"
        );

        Ok(RoutePlan {
            agent,
            agent_reason: agent_selection.reason,
            model,
            model_reason,
            request: effective,
            credentials,
        })
    }

    pub async fn dispatch(&self, request: &ChatRequest) -> Result<Relay> {
        let plan = self.plan(request).await?;
        self.forwarder
            .forward(&plan.request, &plan.credentials)
            .await
    }
}
