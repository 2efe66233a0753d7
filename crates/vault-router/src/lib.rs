//! Voice-command routing for a Markdown vault.
//!
//! A free-text command is classified into an [`Intent`] with a confidence,
//! turned into a [`RoutingDecision`] by a fixed policy, and executed by the
//! [`Orchestrator`] with at most one fallback attempt. Every request yields an
//! auditable [`ExecutionTrace`].

pub mod config;
pub mod error;
pub mod executor;
pub mod intent;
pub mod orchestrator;
pub mod routing;
pub mod trace;
pub mod vault;

pub use config::RouterConfig;
pub use error::ConfigError;
pub use executor::{ExecutionRequest, Executor, ExecutorRegistry, ExecutorReply};
pub use intent::{
    Classification, ClassificationMethod, ClassificationMetrics, ClassificationResult,
    ClassifierMode, ClassifierSelector, DelegatedClassifier, Entities, Intent, IntentClassifier,
    Prefer, Query, RuleClassifier,
};
pub use orchestrator::{AssistantReply, CancellationToken, ExecutionOutcome, Orchestrator, Resolution};
pub use routing::{
    ClarificationGenerator, ClarificationOption, ClarificationPrompt, ConfidenceThresholds,
    FallbackTable, Locale, RouteAction, RoutingDecision, RoutingPolicy,
};
pub use trace::{CollectingTraceSink, ExecutionTrace, StepStatus, TraceSink, TraceStep, TracingTraceSink};
pub use vault::{NoteStore, NoteStoreError};

pub use anyhow::{Error, Result};
