//! Routing policy
//!
//! Pure mapping from a classification to what should happen next: execute,
//! execute with a fallback armed, ask for clarification, or reject.

pub mod clarify;
pub mod fallback;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::intent::{ClassificationResult, Intent};

pub use clarify::{ClarificationGenerator, ClarificationOption, ClarificationPrompt, Locale};
pub use fallback::FallbackTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Execute,
    ExecuteWithFallback,
    Clarify,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: RouteAction,
    pub intent: Intent,
    /// Only ever set for `ExecuteWithFallback`.
    pub fallback: Option<Intent>,
    /// Confidence after clamping into [0, 1].
    pub confidence: f32,
    pub rationale: String,
}

impl RoutingDecision {
    pub fn executes(&self) -> bool {
        matches!(self.action, RouteAction::Execute | RouteAction::ExecuteWithFallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// At or above: execute directly.
    pub high: f32,
    /// At or above (and below `high`): execute with fallback armed.
    pub medium: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
        }
    }
}

impl ConfidenceThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.high.is_finite() || !self.medium.is_finite() {
            return Err(ConfigError::InvalidThresholds(
                "thresholds must be finite numbers".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.medium) || !(0.0..=1.0).contains(&self.high) {
            return Err(ConfigError::InvalidThresholds(format!(
                "thresholds must be within [0.0, 1.0] (high={}, medium={})",
                self.high, self.medium
            )));
        }
        if self.medium > self.high {
            return Err(ConfigError::InvalidThresholds(format!(
                "medium ({}) must not exceed high ({})",
                self.medium, self.high
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    thresholds: ConfidenceThresholds,
    fallbacks: FallbackTable,
}

impl RoutingPolicy {
    pub fn new(thresholds: ConfidenceThresholds, fallbacks: FallbackTable) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            fallbacks,
        })
    }

    pub fn thresholds(&self) -> ConfidenceThresholds {
        self.thresholds
    }

    pub fn fallbacks(&self) -> &FallbackTable {
        &self.fallbacks
    }

    pub fn decide(&self, classification: &ClassificationResult) -> RoutingDecision {
        let intent = classification.intent;
        let raw = classification.confidence;

        let query_blank = classification
            .entities
            .query
            .as_deref()
            .map_or(true, |q| q.trim().is_empty());

        if !raw.is_finite() || query_blank {
            let rationale = if query_blank {
                "malformed input: empty query"
            } else {
                "malformed input: confidence is not a number"
            };
            return decision(RouteAction::Reject, intent, None, 0.0, rationale);
        }

        let confidence = raw.clamp(0.0, 1.0);

        if intent == Intent::Unknown {
            return decision(
                RouteAction::Clarify,
                intent,
                None,
                confidence,
                "intent could not be determined",
            );
        }

        if confidence >= self.thresholds.high {
            return decision(
                RouteAction::Execute,
                intent,
                None,
                confidence,
                "high confidence execution",
            );
        }

        if confidence >= self.thresholds.medium {
            return match self.fallbacks.lookup(intent) {
                Some(fallback) => decision(
                    RouteAction::ExecuteWithFallback,
                    intent,
                    Some(fallback),
                    confidence,
                    "medium confidence, fallback armed",
                ),
                None => decision(
                    RouteAction::Execute,
                    intent,
                    None,
                    confidence,
                    "medium confidence, no fallback available",
                ),
            };
        }

        decision(
            RouteAction::Clarify,
            intent,
            None,
            confidence,
            "low confidence, clarification needed",
        )
    }
}

fn decision(
    action: RouteAction,
    intent: Intent,
    fallback: Option<Intent>,
    confidence: f32,
    rationale: &str,
) -> RoutingDecision {
    RoutingDecision {
        action,
        intent,
        fallback,
        confidence,
        rationale: rationale.to_string(),
    }
}
