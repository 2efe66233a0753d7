//! Intent classification
//!
//! Two classifier variants share the [`IntentClassifier`] interface:
//! deterministic keyword rules and a delegated classifier that calls an
//! external structured-output service and degrades to the rules on failure.
//! The [`ClassifierSelector`] picks one per query.

pub mod delegated;
pub mod rules;
pub mod selector;
pub mod service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use delegated::DelegatedClassifier;
pub use rules::RuleClassifier;
pub use selector::{ClassifierMode, ClassifierSelector, ComplexityHeuristic};
pub use service::{
    ClassificationService, OpenAiClassificationService, ServiceReply, ServiceRequest,
    ServiceVerdict, TokenUsage,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Open,
    Search,
    Read,
    Summarize,
    Comment,
    Update,
    Table,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::Open,
        Intent::Search,
        Intent::Read,
        Intent::Summarize,
        Intent::Comment,
        Intent::Update,
        Intent::Table,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Open => "open",
            Intent::Search => "search",
            Intent::Read => "read",
            Intent::Summarize => "summarize",
            Intent::Comment => "comment",
            Intent::Update => "update",
            Intent::Table => "table",
            Intent::Unknown => "unknown",
        }
    }

    /// Parse a label as produced by a classifier. Unrecognized labels are `None`.
    pub fn parse(label: &str) -> Option<Intent> {
        let label = label.trim().to_ascii_lowercase();
        Intent::ALL.into_iter().find(|intent| intent.as_str() == label)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to pick among several candidate notes for the same text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prefer {
    #[default]
    MostHits,
    Shortest,
}

impl Prefer {
    /// Lenient parse: anything other than `shortest` means `most_hits`.
    pub fn parse(value: &str) -> Prefer {
        if value.trim().eq_ignore_ascii_case("shortest") {
            Prefer::Shortest
        } else {
            Prefer::MostHits
        }
    }
}

/// One incoming command. Immutable for the duration of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Raw (often voice-transcribed) text.
    pub text: String,

    /// Target collection (vault) identifier.
    pub collection: String,

    /// Explicit sub-section hint, e.g. a heading name.
    #[serde(default)]
    pub section: Option<String>,

    #[serde(default)]
    pub prefer: Prefer,
}

impl Query {
    pub fn new(text: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            collection: collection.into(),
            section: None,
            prefer: Prefer::default(),
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_prefer(mut self, prefer: Prefer) -> Self {
        self.prefer = prefer;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    pub query: Option<String>,
    pub note: Option<String>,
    pub section: Option<String>,
    pub collection: Option<String>,
}

impl Entities {
    /// The text executors should act on: the extracted note, else the raw query.
    pub fn target(&self) -> Option<&str> {
        self.note
            .as_deref()
            .or(self.query.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    pub confidence: f32,
    pub entities: Entities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Rules,
    Delegated,
    /// The delegated call failed and the rule result was used instead.
    Degraded,
}

/// Per-classification metrics. Opaque to routing; surfaced in the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub method: ClassificationMethod,
    pub model: String,
    pub latency_ms: f64,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
    pub error: Option<String>,
}

impl ClassificationMetrics {
    pub fn rules(latency_ms: f64) -> Self {
        Self {
            method: ClassificationMethod::Rules,
            model: "rule-based".to_string(),
            latency_ms,
            prompt_tokens: None,
            completion_tokens: None,
            error: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.method == ClassificationMethod::Degraded
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub result: ClassificationResult,
    pub metrics: ClassificationMetrics,
}

// ---------------------------------------------------------------------------
// Classifier interface
// ---------------------------------------------------------------------------

/// Shared interface of every classifier variant. Implementations never fail:
/// whatever goes wrong internally is folded into the returned classification.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Short identifier used in logs and traces.
    fn name(&self) -> &str;

    /// Whether this classifier can do its own work right now. The selector
    /// never routes to an unavailable classifier.
    fn is_available(&self) -> bool {
        true
    }

    async fn classify(&self, query: &Query) -> Classification;
}
