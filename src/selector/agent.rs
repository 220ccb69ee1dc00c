use super::{Candidate, Classifier, Selection, SelectionReason};
use crate::catalog::{Agent, CatalogStore};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AgentSelector {
    store: Arc<dyn CatalogStore>,
    classifier: Arc<dyn Classifier>,
}

impl AgentSelector {
    pub fn new(store: Arc<dyn CatalogStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Pick at most one active agent for `text`. Never fails: classifier and
    /// store errors fall back to the store default.
    pub async fn select(&self, text: &str) -> Selection<Agent> {
        let selection = self.resolve(text).await;
        info!(
            agent = selection.choice.as_ref().map(|a| a.id.as_str()).unwrap_or("-"),
            reason = ?selection.reason,
            "agent selection"
        );
        selection
    }

    async fn resolve(&self, text: &str) -> Selection<Agent> {
        let mut agents = match self.store.list_agents(false).await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(error = %e, "failed to list agents");
                return self.fallback().await;
            }
        };

        match agents.len() {
            0 => return Selection::new(None, SelectionReason::NoCandidates),
            1 => return Selection::new(agents.pop(), SelectionReason::OnlyCandidate),
            _ => {}
        }

        let candidates: Vec<Candidate> = agents.iter().map(Candidate::from).collect();
        match self.classifier.classify(&candidates, text).await {
            Ok(id) => match agents.into_iter().find(|a| a.id == id) {
                Some(agent) => Selection::new(Some(agent), SelectionReason::Classified),
                None => {
                    warn!(reply = %id, "selector named an unknown agent");
                    self.fallback().await
                }
            },
            Err(e) => {
                warn!(error = %e, "agent selector failed");
                self.fallback().await
            }
        }
    }

    async fn fallback(&self) -> Selection<Agent> {
        match self.store.default_agent().await {
            Ok(Some(agent)) => Selection::new(Some(agent), SelectionReason::Fallback),
            Ok(None) => Selection::new(None, SelectionReason::Exhausted),
            Err(e) => {
                warn!(error = %e, "failed to load default agent");
                Selection::new(None, SelectionReason::Exhausted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileCatalog;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reply: Result<String>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn answering(id: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(id.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(Error::transport("connection refused")),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(&self, candidates: &[Candidate], _text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(candidates.len() > 1);
            match &self.reply {
                Ok(id) => Ok(id.clone()),
                Err(e) => Err(Error::transport(e.to_string())),
            }
        }
    }

    fn agent(id: &str, priority: i32, default: bool) -> Agent {
        Agent {
            id: id.into(),
            name: id.into(),
            description: format!("{id} agent"),
            capabilities: vec![],
            model_id: None,
            api_key: None,
            api_key_env: None,
            system_prompt: format!("You are {id}."),
            temperature: None,
            top_p: None,
            max_tokens: None,
            priority,
            active: true,
            default,
        }
    }

    fn selector(agents: Vec<Agent>, classifier: Arc<Fixed>) -> AgentSelector {
        let store = FileCatalog::from_records(vec![], agents).unwrap();
        AgentSelector::new(Arc::new(store), classifier)
    }

    #[tokio::test]
    async fn no_agents_selects_nothing() {
        let classifier = Fixed::answering("x");
        let selection = selector(vec![], classifier.clone()).select("hi").await;
        assert_eq!(selection.choice, None);
        assert_eq!(selection.reason, SelectionReason::NoCandidates);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_agent_skips_classifier() {
        let classifier = Fixed::answering("x");
        let mut inactive = agent("off", 100, true);
        inactive.active = false;
        let selection = selector(vec![agent("only", 1, false), inactive], classifier.clone())
            .select("hi")
            .await;
        assert_eq!(selection.choice.unwrap().id, "only");
        assert_eq!(selection.reason, SelectionReason::OnlyCandidate);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn classifier_answer_is_used_when_known() {
        let classifier = Fixed::answering("code-expert");
        let selection = selector(
            vec![agent("code-expert", 8, false), agent("general-assistant", 5, true)],
            classifier.clone(),
        )
        .select("write a parser")
        .await;
        assert_eq!(selection.choice.unwrap().id, "code-expert");
        assert_eq!(selection.reason, SelectionReason::Classified);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_reply_falls_back_to_default() {
        let selection = selector(
            vec![agent("code-expert", 8, false), agent("general-assistant", 5, true)],
            Fixed::answering("foo"),
        )
        .select("hello")
        .await;
        assert_eq!(selection.choice.unwrap().id, "general-assistant");
        assert_eq!(selection.reason, SelectionReason::Fallback);
    }

    #[tokio::test]
    async fn unknown_reply_without_default_takes_highest_priority() {
        let selection = selector(
            vec![agent("low", 1, false), agent("high", 9, false)],
            Fixed::answering("foo"),
        )
        .select("hello")
        .await;
        assert_eq!(selection.choice.unwrap().id, "high");
    }

    #[tokio::test]
    async fn inactive_record_is_not_a_valid_answer() {
        let mut hidden = agent("hidden", 10, false);
        hidden.active = false;
        let selection = selector(
            vec![agent("a", 1, false), agent("b", 2, false), hidden],
            Fixed::answering("hidden"),
        )
        .select("hello")
        .await;
        assert_eq!(selection.choice.unwrap().id, "b");
        assert_eq!(selection.reason, SelectionReason::Fallback);
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_default() {
        let selection = selector(
            vec![agent("code-expert", 8, false), agent("general-assistant", 5, true)],
            Fixed::failing(),
        )
        .select("hello")
        .await;
        assert_eq!(selection.choice.unwrap().id, "general-assistant");
        assert_eq!(selection.reason, SelectionReason::Fallback);
    }
}
