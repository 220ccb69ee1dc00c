use super::{Candidate, Classifier, SelectionReason};
use crate::catalog::CatalogStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Picks a model id when no agent decides the target.
pub struct ModelSelector {
    store: Arc<dyn CatalogStore>,
    classifier: Arc<dyn Classifier>,
    last_resort: String,
}

impl ModelSelector {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        classifier: Arc<dyn Classifier>,
        last_resort: impl Into<String>,
    ) -> Self {
        Self {
            store,
            classifier,
            last_resort: last_resort.into(),
        }
    }

    /// Always yields an id; when the catalog cannot supply one the configured
    /// last-resort id is returned, which may not name a catalog record.
    pub async fn select(&self, text: &str) -> (String, SelectionReason) {
        let (id, reason) = self.resolve(text).await;
        info!(model = %id, reason = ?reason, "model selection");
        (id, reason)
    }

    async fn resolve(&self, text: &str) -> (String, SelectionReason) {
        let models = match self.store.list_models(false).await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "failed to list models");
                return self.fallback().await;
            }
        };

        match models.as_slice() {
            [] => return self.last_resort(),
            [only] => return (only.id.clone(), SelectionReason::OnlyCandidate),
            _ => {}
        }

        let candidates: Vec<Candidate> = models.iter().map(Candidate::from).collect();
        match self.classifier.classify(&candidates, text).await {
            Ok(id) if models.iter().any(|m| m.id == id) => (id, SelectionReason::Classified),
            Ok(id) => {
                warn!(reply = %id, "selector named an unknown model");
                self.fallback().await
            }
            Err(e) => {
                warn!(error = %e, "model selector failed");
                self.fallback().await
            }
        }
    }

    async fn fallback(&self) -> (String, SelectionReason) {
        match self.store.default_model().await {
            Ok(Some(model)) => (model.id, SelectionReason::Fallback),
            Ok(None) => self.last_resort(),
            Err(e) => {
                warn!(error = %e, "failed to load default model");
                self.last_resort()
            }
        }
    }

    fn last_resort(&self) -> (String, SelectionReason) {
        (self.last_resort.clone(), SelectionReason::LastResort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FileCatalog, Model};
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    struct Reply(Option<&'static str>);

    #[async_trait]
    impl Classifier for Reply {
        async fn classify(&self, _candidates: &[Candidate], _text: &str) -> Result<String> {
            self.0
                .map(String::from)
                .ok_or_else(|| Error::selector("selector returned 503"))
        }
    }

    fn model(id: &str, priority: i32, default: bool) -> Model {
        Model {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            capabilities: vec![],
            base_url: "http://localhost:1/v1".into(),
            api_key: None,
            api_key_env: None,
            prompt: None,
            upstream_model: None,
            priority,
            active: true,
            default,
        }
    }

    fn selector(models: Vec<Model>, reply: Option<&'static str>) -> ModelSelector {
        let store = FileCatalog::from_records(models, vec![]).unwrap();
        ModelSelector::new(Arc::new(store), Arc::new(Reply(reply)), "selector-model")
    }

    #[tokio::test]
    async fn empty_catalog_uses_last_resort() {
        let (id, reason) = selector(vec![], Some("x")).select("hi").await;
        assert_eq!(id, "selector-model");
        assert_eq!(reason, SelectionReason::LastResort);
    }

    #[tokio::test]
    async fn single_model_is_returned_without_asking() {
        let (id, reason) = selector(vec![model("only", 0, false)], None).select("hi").await;
        assert_eq!(id, "only");
        assert_eq!(reason, SelectionReason::OnlyCandidate);
    }

    #[tokio::test]
    async fn known_reply_wins() {
        let (id, reason) = selector(
            vec![model("a", 1, true), model("b", 2, false)],
            Some("a"),
        )
        .select("hi")
        .await;
        assert_eq!(id, "a");
        assert_eq!(reason, SelectionReason::Classified);
    }

    #[tokio::test]
    async fn unknown_reply_prefers_default_then_priority() {
        let (with_default, _) = selector(
            vec![model("a", 1, true), model("b", 2, false)],
            Some("zzz"),
        )
        .select("hi")
        .await;
        assert_eq!(with_default, "a");

        let (without_default, reason) = selector(
            vec![model("a", 1, false), model("b", 2, false)],
            Some("zzz"),
        )
        .select("hi")
        .await;
        assert_eq!(without_default, "b");
        assert_eq!(reason, SelectionReason::Fallback);
    }

    #[tokio::test]
    async fn classifier_error_falls_back() {
        let (id, reason) = selector(vec![model("a", 1, false), model("b", 2, false)], None)
            .select("hi")
            .await;
        assert_eq!(id, "b");
        assert_eq!(reason, SelectionReason::Fallback);
    }
}
