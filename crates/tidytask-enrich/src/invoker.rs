//! Enrichment invoker: one prompt, one completion call, one parse.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, instrument, trace, warn};

use tidytask_core::{
    ChatMessage, Completion, CompletionBackend, CompletionRequest, EnrichmentResult, Error,
    FeatureSet, Result, Tier,
};

use crate::config::EnrichConfig;
use crate::{parse, prompt};

/// Builds the consolidated prompt, calls the completion service and parses
/// the reply.
#[derive(Clone)]
pub struct EnrichmentInvoker {
    backend: Arc<dyn CompletionBackend>,
    max_tokens: u32,
    temperature: f32,
    retry_backoff: Duration,
}

impl EnrichmentInvoker {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &EnrichConfig) -> Self {
        Self {
            backend,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry_backoff: config.retry_backoff(),
        }
    }

    /// Run every feature in `features` against `title`/`description`.
    ///
    /// Makes one completion call; a transient failure is retried once after
    /// the configured backoff. Unparseable output is `Error::Parse`.
    #[instrument(
        skip_all,
        fields(subsystem = "enrich", component = "invoker", %tier, %features)
    )]
    pub async fn invoke(
        &self,
        tier: Tier,
        title: &str,
        description: Option<&str>,
        features: &FeatureSet,
    ) -> Result<EnrichmentResult> {
        if features.is_empty() {
            return Err(Error::InvalidInput("No features selected".into()));
        }

        let start = Instant::now();
        let prompt = prompt::build(features, title, description, Utc::now().date_naive());
        trace!(system = %prompt.system, user = %prompt.user, "Enrichment prompt");

        let request = CompletionRequest {
            system: Some(prompt.system),
            messages: vec![ChatMessage::user(prompt.user)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let completion = self.complete_with_retry(request).await?;
        trace!(response = %completion.content, "Enrichment response");

        let result = parse::parse_response(&completion.content, features, title, description)
            .inspect_err(|e| {
                warn!(
                    error = %e,
                    response_len = completion.content.len(),
                    "Unparseable enrichment response"
                )
            })?;

        debug!(
            model = self.backend.model_name(),
            landed = %result.landed_features(),
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            duration_ms = start.elapsed().as_millis() as u64,
            "Enrichment response parsed"
        );

        Ok(result)
    }

    async fn complete_with_retry(&self, request: CompletionRequest) -> Result<Completion> {
        match self.backend.complete(request.clone()).await {
            Err(e) if e.is_transient() => {
                warn!(
                    error = %e,
                    backoff_ms = self.retry_backoff.as_millis() as u64,
                    "Transient completion failure, retrying once"
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.backend.complete(request).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidytask_core::FeatureFlag;
    use tidytask_inference::{MockCompletionBackend, MockReply};

    fn invoker(backend: &MockCompletionBackend) -> EnrichmentInvoker {
        let config = EnrichConfig::default().with_retry_backoff_ms(1);
        EnrichmentInvoker::new(Arc::new(backend.clone()), &config)
    }

    fn all() -> FeatureSet {
        FeatureFlag::ALL.into()
    }

    #[tokio::test]
    async fn test_all_features_in_one_call() {
        let backend = MockCompletionBackend::new().with_reply(MockReply::content(
            r#"```json
{"title":"Email Ana.","title_changed":true,"description":"About the offsite","description_changed":true,
 "entities":[{"type":"person","value":"Ana"}],"complexity":2,"due_date":"2026-10-20"}
```"#,
        ));

        let result = invoker(&backend)
            .invoke(Tier::Premium, "email ana", Some("abt offsite"), &all())
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 1);
        assert_eq!(result.cleaned_title.as_deref(), Some("Email Ana"));
        assert_eq!(result.cleaned_description.as_deref(), Some("About the offsite"));
        assert_eq!(result.entities.map(|e| e.len()), Some(1));
        assert_eq!(result.complexity, Some(2));
        assert!(result.due.is_some());
        assert_eq!(result.features, all());

        let request = &backend.requests()[0];
        assert!(request.system.as_deref().unwrap().contains("\"entities\""));
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let backend = MockCompletionBackend::new()
            .with_reply(MockReply::transient("503"))
            .with_reply(MockReply::content(r#"{"complexity": 3}"#));

        let result = invoker(&backend)
            .invoke(
                Tier::Free,
                "x",
                None,
                &FeatureSet::from([FeatureFlag::Complexity]),
            )
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 2);
        assert_eq!(result.complexity, Some(3));
    }

    #[tokio::test]
    async fn test_second_transient_failure_is_returned() {
        let backend = MockCompletionBackend::new()
            .with_reply(MockReply::transient("503"))
            .with_reply(MockReply::transient("503 again"));

        let err = invoker(&backend)
            .invoke(Tier::Free, "x", None, &all())
            .await
            .unwrap_err();

        assert!(err.is_external());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let backend = MockCompletionBackend::new().with_reply(MockReply::fatal("401"));

        let err = invoker(&backend)
            .invoke(Tier::Free, "x", None, &all())
            .await
            .unwrap_err();

        assert!(err.is_external());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_surfaces_as_parse_error() {
        let backend = MockCompletionBackend::new().with_fixed_response("no json here");
        let err = invoker(&backend)
            .invoke(Tier::Free, "x", None, &all())
            .await
            .unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn test_empty_feature_set_makes_no_call() {
        let backend = MockCompletionBackend::new();
        let err = invoker(&backend)
            .invoke(Tier::Free, "x", None, &FeatureSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(backend.call_count(), 0);
    }
}
