//! Classifier selection
//!
//! Picks the classifier variant for a query. The selector only sees the
//! [`IntentClassifier`] interface and always returns something usable: when
//! the delegated classifier is missing or unavailable it falls back to rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::IntentClassifier;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    #[serde(alias = "rule_based")]
    RuleOnly,
    #[serde(alias = "llm_based")]
    DelegatedOnly,
    #[default]
    Auto,
}

impl FromStr for ClassifierMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rule_only" | "rule_based" | "rules" => Ok(ClassifierMode::RuleOnly),
            "delegated_only" | "llm_based" | "delegated" => Ok(ClassifierMode::DelegatedOnly),
            "auto" => Ok(ClassifierMode::Auto),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassifierMode::RuleOnly => "rule_only",
            ClassifierMode::DelegatedOnly => "delegated_only",
            ClassifierMode::Auto => "auto",
        })
    }
}

/// Words that suggest a query needs real language understanding.
const COMPLEXITY_MARKERS: &[&str] = &[
    "について", "とは", "どう", "なぜ", "なに", "どこ", "いつ", "比較", "違い", "説明", "教えて",
    "わからない", "why", "how", "compare", "explain",
];

/// Auto-mode policy. Tunable without changing any contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplexityHeuristic {
    /// A single token shorter than this is always simple.
    pub min_chars: usize,
    /// More whitespace tokens than this counts as complex (spacing issues
    /// from voice transcription are what the delegated path fixes).
    pub max_simple_words: usize,
}

impl Default for ComplexityHeuristic {
    fn default() -> Self {
        Self {
            min_chars: 5,
            max_simple_words: 2,
        }
    }
}

impl ComplexityHeuristic {
    pub fn is_complex(&self, text: &str) -> bool {
        let lowered = text.trim().to_ascii_lowercase();
        let words = lowered.split_whitespace().count();

        if words <= 1 && lowered.chars().count() < self.min_chars {
            return false;
        }
        if COMPLEXITY_MARKERS.iter().any(|m| lowered.contains(m)) {
            return true;
        }
        words > self.max_simple_words
    }
}

pub struct ClassifierSelector {
    mode: ClassifierMode,
    rules: Arc<dyn IntentClassifier>,
    delegated: Option<Arc<dyn IntentClassifier>>,
    heuristic: ComplexityHeuristic,
}

impl ClassifierSelector {
    pub fn new(
        mode: ClassifierMode,
        rules: Arc<dyn IntentClassifier>,
        delegated: Option<Arc<dyn IntentClassifier>>,
    ) -> Self {
        Self {
            mode,
            rules,
            delegated,
            heuristic: ComplexityHeuristic::default(),
        }
    }

    /// Rules only, regardless of anything else.
    pub fn rules_only(rules: Arc<dyn IntentClassifier>) -> Self {
        Self::new(ClassifierMode::RuleOnly, rules, None)
    }

    pub fn with_heuristic(mut self, heuristic: ComplexityHeuristic) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn mode(&self) -> ClassifierMode {
        self.mode
    }

    pub fn select(&self, text: &str) -> &dyn IntentClassifier {
        let delegated = match self.delegated.as_deref() {
            Some(classifier) if classifier.is_available() => classifier,
            _ => return self.rules.as_ref(),
        };

        match self.mode {
            ClassifierMode::RuleOnly => self.rules.as_ref(),
            ClassifierMode::DelegatedOnly => delegated,
            ClassifierMode::Auto => {
                if self.heuristic.is_complex(text) {
                    delegated
                } else {
                    self.rules.as_ref()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Classification, DelegatedClassifier, Query, RuleClassifier};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl IntentClassifier for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn classify(&self, query: &Query) -> Classification {
            RuleClassifier::new().classify(query).await
        }
    }

    fn selector(mode: ClassifierMode) -> ClassifierSelector {
        ClassifierSelector::new(
            mode,
            Arc::new(RuleClassifier::new()),
            Some(Arc::new(Named("delegated"))),
        )
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("rule_only".parse::<ClassifierMode>().unwrap(), ClassifierMode::RuleOnly);
        assert_eq!("LLM_BASED".parse::<ClassifierMode>().unwrap(), ClassifierMode::DelegatedOnly);
        assert_eq!("auto".parse::<ClassifierMode>().unwrap(), ClassifierMode::Auto);
        assert!(matches!(
            "sometimes".parse::<ClassifierMode>(),
            Err(ConfigError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_fixed_modes() {
        assert_eq!(selector(ClassifierMode::RuleOnly).select("部品 を 開いて 下さい").name(), "rules");
        assert_eq!(selector(ClassifierMode::DelegatedOnly).select("開").name(), "delegated");
    }

    #[test]
    fn test_auto_mode_heuristic() {
        let s = selector(ClassifierMode::Auto);
        assert_eq!(s.select("開く").name(), "rules");
        assert_eq!(s.select("部品を開いて").name(), "rules");
        assert_eq!(s.select("部品について").name(), "delegated");
        assert_eq!(s.select("部品 を 開いて").name(), "delegated");
        assert_eq!(s.select("how do I open").name(), "delegated");
        assert_eq!(s.select("open budget").name(), "rules");
    }

    #[test]
    fn test_unavailable_delegated_falls_back_to_rules() {
        let s = ClassifierSelector::new(
            ClassifierMode::DelegatedOnly,
            Arc::new(RuleClassifier::new()),
            Some(Arc::new(DelegatedClassifier::disabled())),
        );
        assert_eq!(s.select("部品について").name(), "rules");

        let missing = ClassifierSelector::new(ClassifierMode::Auto, Arc::new(RuleClassifier::new()), None);
        assert_eq!(missing.select("部品について").name(), "rules");
    }
}
