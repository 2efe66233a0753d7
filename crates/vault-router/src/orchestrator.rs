//! Request orchestration
//!
//! One pass per query: classify, route, then either execute (primary plus at
//! most one fallback), ask for clarification, or reject. Every step is timed
//! into an [`ExecutionTrace`] and the finished reply goes to a [`TraceSink`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ClassifierConfig, RouterConfig};
use crate::error::ConfigError;
use crate::executor::{ExecutionRequest, ExecutorRegistry, ExecutorReply};
use crate::intent::{
    ClassificationMetrics, ClassificationResult, ClassificationService, ClassifierSelector,
    DelegatedClassifier, Intent, IntentClassifier, OpenAiClassificationService, Query,
    RuleClassifier,
};
use crate::routing::{
    ClarificationGenerator, ClarificationPrompt, FallbackTable, RouteAction, RoutingDecision,
    RoutingPolicy,
};
use crate::trace::{ExecutionTrace, StepStatus, TraceSink};

/// Cooperative cancellation for a single request.
///
/// Checked before each step. A step already running is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Result of the execution phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,

    /// Executor payload, `null` when nothing was produced
    pub payload: serde_json::Value,

    /// User-facing message
    pub message: String,

    /// Intent whose executor produced this outcome
    pub executed_intent: Intent,

    /// Intent chosen by routing
    pub primary_intent: Intent,

    pub fallback_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Executed(ExecutionOutcome),
    Clarification(ClarificationPrompt),
    Rejected { reason: String },
    Cancelled { stage: String },
}

/// Everything one orchestration pass produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub query: Query,
    pub classification: Option<ClassificationResult>,
    pub metrics: Option<ClassificationMetrics>,
    pub decision: Option<RoutingDecision>,
    pub resolution: Resolution,
    pub trace: ExecutionTrace,
}

impl AssistantReply {
    pub fn session_id(&self) -> &str {
        &self.trace.session_id
    }

    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        match &self.resolution {
            Resolution::Executed(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn clarification(&self) -> Option<&ClarificationPrompt> {
        match &self.resolution {
            Resolution::Clarification(prompt) => Some(prompt),
            _ => None,
        }
    }

    /// A failed execution or a rejection. Clarifications and cancellations
    /// are not failures.
    pub fn is_failure(&self) -> bool {
        match &self.resolution {
            Resolution::Executed(outcome) => !outcome.success,
            Resolution::Rejected { .. } => true,
            Resolution::Clarification(_) | Resolution::Cancelled { .. } => false,
        }
    }
}

/// One executor attempt, reduced to what the fallback logic needs.
enum Attempt {
    Found { payload: serde_json::Value, message: String },
    Empty { message: String },
    Failed { message: String },
}

impl Attempt {
    fn message(&self) -> &str {
        match self {
            Attempt::Found { message, .. } | Attempt::Empty { message } | Attempt::Failed { message } => message,
        }
    }
}

pub struct Orchestrator {
    selector: ClassifierSelector,
    policy: RoutingPolicy,
    clarifier: ClarificationGenerator,
    executors: ExecutorRegistry,
    sink: Arc<dyn TraceSink>,
}

impl Orchestrator {
    pub fn new(
        selector: ClassifierSelector,
        policy: RoutingPolicy,
        clarifier: ClarificationGenerator,
        executors: ExecutorRegistry,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            selector,
            policy,
            clarifier,
            executors,
            sink,
        }
    }

    /// Build from configuration. Fails fast on any invalid setting.
    pub fn from_config(
        config: &RouterConfig,
        executors: ExecutorRegistry,
        sink: Arc<dyn TraceSink>,
    ) -> Result<Self, ConfigError> {
        let service = classification_service(&config.classifier)?;
        Self::from_config_with_service(config, service, executors, sink)
    }

    /// Like [`Orchestrator::from_config`] with a caller-supplied
    /// classification service. The service is ignored when the delegated
    /// classifier is disabled.
    pub fn from_config_with_service(
        config: &RouterConfig,
        service: Option<Arc<dyn ClassificationService>>,
        executors: ExecutorRegistry,
        sink: Arc<dyn TraceSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mode = config.classifier.mode()?;
        let fallbacks = FallbackTable::with_overrides(&config.fallback_overrides)?;
        let policy = RoutingPolicy::new(config.thresholds, fallbacks)?;

        let delegated: Option<Arc<dyn IntentClassifier>> = match service {
            Some(service) if config.classifier.delegated_enabled => Some(Arc::new(
                DelegatedClassifier::new(service, config.classifier.timeout()),
            )),
            _ => None,
        };

        tracing::info!(
            mode = %mode,
            delegated = delegated.is_some(),
            high = config.thresholds.high,
            medium = config.thresholds.medium,
            fallbacks = policy.fallbacks().len(),
            executors = ?executors.intents(),
            "Orchestrator configured"
        );

        let selector = ClassifierSelector::new(mode, Arc::new(RuleClassifier::new()), delegated)
            .with_heuristic(config.classifier.heuristic());

        Ok(Self::new(
            selector,
            policy,
            ClarificationGenerator::new(config.locale),
            executors,
            sink,
        ))
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub async fn handle(&self, query: Query) -> AssistantReply {
        self.handle_with_cancel(query, &CancellationToken::new()).await
    }

    pub async fn handle_with_cancel(&self, query: Query, cancel: &CancellationToken) -> AssistantReply {
        let mut trace = ExecutionTrace::start();
        let mut reply_classification = None;
        let mut reply_metrics = None;
        let mut reply_decision = None;

        let resolution = 'pass: {
            // received -> classified
            if cancel.is_cancelled() {
                break 'pass cancelled("classify");
            }
            let started = Instant::now();
            let classifier = self.selector.select(&query.text);
            let classification = classifier.classify(&query).await;
            let result = classification.result;
            let metrics = classification.metrics;

            let (status, detail) = match &metrics.error {
                Some(error) if metrics.is_degraded() => {
                    trace.classification_degraded = true;
                    (
                        StepStatus::Degraded,
                        format!(
                            "{} -> {} ({:.2}), degraded: {}",
                            metrics.model, result.intent, result.confidence, error
                        ),
                    )
                }
                _ => (
                    StepStatus::Ok,
                    format!("{} -> {} ({:.2})", metrics.model, result.intent, result.confidence),
                ),
            };
            trace.record("classify", status, started.elapsed(), detail);
            reply_classification = Some(result.clone());
            reply_metrics = Some(metrics);

            // classified -> routed
            if cancel.is_cancelled() {
                break 'pass cancelled("route");
            }
            let started = Instant::now();
            let decision = self.policy.decide(&result);
            trace.record(
                "route",
                StepStatus::Ok,
                started.elapsed(),
                format!("{:?} {}: {}", decision.action, decision.intent, decision.rationale),
            );
            reply_decision = Some(decision.clone());

            if cancel.is_cancelled() {
                break 'pass cancelled(step_after_routing(&decision));
            }

            match decision.action {
                RouteAction::Reject => {
                    trace.record("reject", StepStatus::Ok, Duration::ZERO, decision.rationale.clone());
                    Resolution::Rejected {
                        reason: decision.rationale.clone(),
                    }
                }
                RouteAction::Clarify => {
                    let started = Instant::now();
                    let prompt = self.clarifier.prompt_for(decision.intent, &result.entities);
                    trace.record(
                        "clarify",
                        StepStatus::Ok,
                        started.elapsed(),
                        format!("{} options", prompt.options.len()),
                    );
                    Resolution::Clarification(prompt)
                }
                RouteAction::Execute | RouteAction::ExecuteWithFallback => {
                    let request = ExecutionRequest {
                        entities: result.entities.clone(),
                        collection: query.collection.clone(),
                        prefer: query.prefer,
                    };
                    self.execute(&decision, &request, &mut trace, cancel).await
                }
            }
        };

        trace.finish();
        let reply = AssistantReply {
            query,
            classification: reply_classification,
            metrics: reply_metrics,
            decision: reply_decision,
            resolution,
            trace,
        };
        self.sink.emit(&reply);
        reply
    }

    /// Primary attempt plus at most one fallback attempt.
    async fn execute(
        &self,
        decision: &RoutingDecision,
        request: &ExecutionRequest,
        trace: &mut ExecutionTrace,
        cancel: &CancellationToken,
    ) -> Resolution {
        let primary_intent = decision.intent;
        let primary = self.attempt("execute", primary_intent, request, trace).await;

        let fallback_intent = match &primary {
            Attempt::Found { .. } => None,
            Attempt::Empty { .. } | Attempt::Failed { .. } => decision
                .fallback
                .or_else(|| self.policy.fallbacks().lookup(primary_intent)),
        };

        let Some(fallback_intent) = fallback_intent else {
            return Resolution::Executed(finalize(primary, primary_intent, primary_intent, false));
        };

        if cancel.is_cancelled() {
            return cancelled("fallback");
        }

        tracing::info!(
            primary = %primary_intent,
            fallback = %fallback_intent,
            reason = %primary.message(),
            "Primary execution produced nothing, trying fallback"
        );

        let secondary = self.attempt("fallback", fallback_intent, request, trace).await;
        let secondary = match (&primary, secondary) {
            (Attempt::Failed { message: first }, Attempt::Failed { message: second }) => Attempt::Failed {
                message: format!("{} failed: {}; {} failed: {}", primary_intent, first, fallback_intent, second),
            },
            (_, other) => other,
        };
        Resolution::Executed(finalize(secondary, fallback_intent, primary_intent, true))
    }

    async fn attempt(
        &self,
        stage: &str,
        intent: Intent,
        request: &ExecutionRequest,
        trace: &mut ExecutionTrace,
    ) -> Attempt {
        let started = Instant::now();
        let step = format!("{}:{}", stage, intent);

        let attempt = match self.executors.get(intent) {
            None => Attempt::Failed {
                message: format!("no executor registered for '{}'", intent),
            },
            Some(executor) => match executor.execute(request).await {
                Ok(reply) if reply.is_empty() => Attempt::Empty {
                    message: reply.message().to_string(),
                },
                Ok(ExecutorReply::Found { payload, message }) => Attempt::Found { payload, message },
                Ok(ExecutorReply::NotFound { message }) => Attempt::Empty { message },
                Err(e) => {
                    tracing::warn!(intent = %intent, error = %e, "Executor failed");
                    Attempt::Failed {
                        message: format!("{:#}", e),
                    }
                }
            },
        };

        let status = match &attempt {
            Attempt::Found { .. } => StepStatus::Ok,
            Attempt::Empty { .. } => StepStatus::Empty,
            Attempt::Failed { .. } => StepStatus::Failed,
        };
        trace.record(step, status, started.elapsed(), attempt.message().to_string());
        attempt
    }
}

fn finalize(attempt: Attempt, executed: Intent, primary: Intent, fallback_used: bool) -> ExecutionOutcome {
    let (success, payload, message) = match attempt {
        Attempt::Found { payload, message } => (true, payload, message),
        Attempt::Empty { message } | Attempt::Failed { message } => (false, serde_json::Value::Null, message),
    };
    ExecutionOutcome {
        success,
        payload,
        message,
        executed_intent: executed,
        primary_intent: primary,
        fallback_used,
    }
}

fn cancelled(stage: &str) -> Resolution {
    tracing::debug!(stage = stage, "Request cancelled");
    Resolution::Cancelled {
        stage: stage.to_string(),
    }
}

fn step_after_routing(decision: &RoutingDecision) -> &'static str {
    match decision.action {
        RouteAction::Execute | RouteAction::ExecuteWithFallback => "execute",
        RouteAction::Clarify => "clarify",
        RouteAction::Reject => "reject",
    }
}

/// The external classification service described by the configuration, if
/// the delegated classifier is enabled and has credentials.
fn classification_service(
    config: &ClassifierConfig,
) -> Result<Option<Arc<dyn ClassificationService>>, ConfigError> {
    if !config.delegated_enabled {
        return Ok(None);
    }
    let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        tracing::warn!("Delegated classifier enabled without an API key, using rules only");
        return Ok(None);
    };

    let service = OpenAiClassificationService::new(
        config.endpoint.clone(),
        api_key,
        config.model.clone(),
        config.timeout(),
    )
    .map_err(|e| ConfigError::InvalidClassifier(format!("{:#}", e)))?
    .with_sampling(config.temperature, config.max_tokens);

    Ok(Some(Arc::new(service)))
}
