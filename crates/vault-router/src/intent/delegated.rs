//! Delegated intent classification
//!
//! Hands the query to an external [`ClassificationService`] under a timeout.
//! Any failure is absorbed: the rule classifier answers instead and the
//! classification is marked degraded.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::rules::RuleClassifier;
use super::service::{ClassificationService, ServiceReply, ServiceRequest};
use super::{
    Classification, ClassificationMethod, ClassificationMetrics, ClassificationResult, Entities,
    Intent, IntentClassifier, Query,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DelegatedClassifier {
    service: Option<Arc<dyn ClassificationService>>,
    rules: RuleClassifier,
    timeout: Duration,
}

impl DelegatedClassifier {
    pub fn new(service: Arc<dyn ClassificationService>, timeout: Duration) -> Self {
        Self {
            service: Some(service),
            rules: RuleClassifier::new(),
            timeout,
        }
    }

    /// A classifier with the delegated path switched off. It answers with
    /// the rule classifier and reports itself unavailable to the selector.
    pub fn disabled() -> Self {
        Self {
            service: None,
            rules: RuleClassifier::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn degrade(&self, query: &Query, model: &str, started: Instant, error: String) -> Classification {
        let result = self.rules.classify_query(query);
        tracing::warn!(
            model = %model,
            error = %error,
            fallback_intent = %result.intent,
            "Delegated classification failed, using rule-based result"
        );
        Classification {
            result,
            metrics: ClassificationMetrics {
                method: ClassificationMethod::Degraded,
                model: format!("{} -> rule-based", model),
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                prompt_tokens: None,
                completion_tokens: None,
                error: Some(error),
            },
        }
    }
}

/// Validate a service reply and turn it into a classification result.
fn convert_reply(reply: &ServiceReply, query: &Query) -> Result<ClassificationResult> {
    let verdict = &reply.verdict;
    if !verdict.confidence.is_finite() {
        bail!("classification service returned a non-finite confidence");
    }

    let intent = Intent::parse(&verdict.intent).unwrap_or_else(|| {
        tracing::debug!(label = %verdict.intent, "Unrecognized intent label, treating as unknown");
        Intent::Unknown
    });

    let entity = |name: &str| {
        verdict
            .entities
            .get(name)
            .cloned()
            .flatten()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let entities = Entities {
        query: Some(query.text.clone()),
        note: entity("note"),
        section: query.section.clone().or_else(|| entity("section")),
        collection: Some(query.collection.clone())
            .filter(|c| !c.trim().is_empty())
            .or_else(|| entity("collection")),
    };

    Ok(ClassificationResult {
        intent,
        confidence: verdict.confidence.clamp(0.0, 1.0),
        entities,
    })
}

#[async_trait]
impl IntentClassifier for DelegatedClassifier {
    fn name(&self) -> &str {
        "delegated"
    }

    fn is_available(&self) -> bool {
        self.service.is_some()
    }

    async fn classify(&self, query: &Query) -> Classification {
        let started = Instant::now();

        let Some(service) = self.service.as_ref() else {
            let result = self.rules.classify_query(query);
            return Classification {
                result,
                metrics: ClassificationMetrics::rules(started.elapsed().as_secs_f64() * 1000.0),
            };
        };

        let request = ServiceRequest::from_query(query);
        let error = match tokio::time::timeout(self.timeout, service.classify(&request)).await {
            Ok(Ok(reply)) => match convert_reply(&reply, query) {
                Ok(result) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    tracing::info!(
                        intent = %result.intent,
                        confidence = result.confidence,
                        note = ?result.entities.note,
                        latency_ms = latency_ms,
                        "Delegated classification"
                    );
                    return Classification {
                        result,
                        metrics: ClassificationMetrics {
                            method: ClassificationMethod::Delegated,
                            model: service.model().to_string(),
                            latency_ms,
                            prompt_tokens: Some(reply.usage.prompt_tokens),
                            completion_tokens: Some(reply.usage.completion_tokens),
                            error: None,
                        },
                    };
                }
                Err(e) => format!("{:#}", e),
            },
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {} ms", self.timeout.as_millis()),
        };

        self.degrade(query, service.model(), started, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::service::{ServiceVerdict, TokenUsage};
    use anyhow::anyhow;
    use std::collections::HashMap;

    struct FixedService(ServiceVerdict);

    #[async_trait]
    impl ClassificationService for FixedService {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn classify(&self, _request: &ServiceRequest) -> Result<ServiceReply> {
            Ok(ServiceReply {
                verdict: self.0.clone(),
                usage: TokenUsage {
                    prompt_tokens: 120,
                    completion_tokens: 30,
                },
            })
        }
    }

    struct FailingService;

    #[async_trait]
    impl ClassificationService for FailingService {
        fn model(&self) -> &str {
            "failing"
        }

        async fn classify(&self, _request: &ServiceRequest) -> Result<ServiceReply> {
            Err(anyhow!("service unavailable"))
        }
    }

    fn verdict(intent: &str, confidence: f32, note: Option<&str>) -> ServiceVerdict {
        let mut entities = HashMap::new();
        entities.insert("note".to_string(), note.map(str::to_string));
        entities.insert("section".to_string(), Some("Ignored?".to_string()));
        ServiceVerdict {
            intent: intent.into(),
            confidence,
            entities,
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_delegation() {
        let classifier = DelegatedClassifier::new(
            Arc::new(FixedService(verdict("summarize", 0.85, Some("議事録")))),
            Duration::from_secs(1),
        );
        let c = classifier.classify(&Query::new("議事録をざっくり教えて", "Vault")).await;
        assert_eq!(c.result.intent, Intent::Summarize);
        assert_eq!(c.result.entities.note.as_deref(), Some("議事録"));
        assert_eq!(c.result.entities.query.as_deref(), Some("議事録をざっくり教えて"));
        assert_eq!(c.result.entities.collection.as_deref(), Some("Vault"));
        assert_eq!(c.metrics.method, ClassificationMethod::Delegated);
        assert_eq!(c.metrics.prompt_tokens, Some(120));
    }

    #[tokio::test]
    async fn test_request_section_overrides_service_section() {
        let classifier = DelegatedClassifier::new(
            Arc::new(FixedService(verdict("read", 0.9, Some("部品")))),
            Duration::from_secs(1),
        );
        let with_hint = classifier
            .classify(&Query::new("部品を読んで", "Vault").with_section("手順"))
            .await;
        assert_eq!(with_hint.result.entities.section.as_deref(), Some("手順"));

        let without_hint = classifier.classify(&Query::new("部品を読んで", "Vault")).await;
        assert_eq!(without_hint.result.entities.section.as_deref(), Some("Ignored?"));
    }

    #[tokio::test]
    async fn test_unknown_label_and_clamped_confidence() {
        let classifier = DelegatedClassifier::new(
            Arc::new(FixedService(verdict("delete", 1.7, None))),
            Duration::from_secs(1),
        );
        let c = classifier.classify(&Query::new("全部消して", "Vault")).await;
        assert_eq!(c.result.intent, Intent::Unknown);
        assert_eq!(c.result.confidence, 1.0);
        assert!(!c.metrics.is_degraded());
    }

    #[tokio::test]
    async fn test_service_error_degrades_to_rules() {
        let classifier = DelegatedClassifier::new(Arc::new(FailingService), Duration::from_secs(1));
        let query = Query::new("部品を開いて", "Vault");
        let c = classifier.classify(&query).await;
        assert_eq!(c.result, RuleClassifier::new().classify_query(&query));
        assert!(c.metrics.is_degraded());
        assert!(c.metrics.error.as_deref().unwrap().contains("service unavailable"));
    }

    #[tokio::test]
    async fn test_non_finite_confidence_degrades() {
        let classifier = DelegatedClassifier::new(
            Arc::new(FixedService(verdict("open", f32::NAN, Some("部品")))),
            Duration::from_secs(1),
        );
        let c = classifier.classify(&Query::new("部品を開いて", "Vault")).await;
        assert!(c.metrics.is_degraded());
        assert_eq!(c.result.intent, Intent::Open);
    }

    #[tokio::test]
    async fn test_disabled_behaves_as_rules() {
        let classifier = DelegatedClassifier::disabled();
        assert!(!classifier.is_available());
        let query = Query::new("議事録のメモ", "Vault");
        let c = classifier.classify(&query).await;
        assert_eq!(c.result, RuleClassifier::new().classify_query(&query));
        assert_eq!(c.metrics.method, ClassificationMethod::Rules);
    }
}
