//! Clarification prompts for decisions the router will not act on alone.

use serde::{Deserialize, Serialize};

use super::{RouteAction, RoutingDecision};
use crate::intent::{Entities, Intent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Ja,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub label: String,
    pub intent: Intent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationPrompt {
    pub question: String,
    /// Always 2 or 3 entries.
    pub options: Vec<ClarificationOption>,
}

/// Offered when nothing about the request is known.
const COMMON_ACTIONS: [Intent; 3] = [Intent::Open, Intent::Search, Intent::Read];

/// The closest alternative to offer next to a low-confidence intent.
fn neighbour(intent: Intent) -> Intent {
    match intent {
        Intent::Open => Intent::Search,
        Intent::Search => Intent::Open,
        Intent::Read => Intent::Summarize,
        Intent::Summarize => Intent::Read,
        Intent::Table => Intent::Read,
        Intent::Comment => Intent::Search,
        Intent::Update => Intent::Read,
        Intent::Unknown => Intent::Search,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClarificationGenerator {
    locale: Locale,
}

impl ClarificationGenerator {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Build the prompt for a `clarify` decision. Any other action yields `None`.
    pub fn generate(&self, decision: &RoutingDecision, entities: &Entities) -> Option<ClarificationPrompt> {
        if decision.action != RouteAction::Clarify {
            return None;
        }
        Some(self.prompt_for(decision.intent, entities))
    }

    /// Prompt for an intent the router could not act on: the common actions
    /// for `unknown`, otherwise the intent and its nearest neighbour.
    pub fn prompt_for(&self, intent: Intent, entities: &Entities) -> ClarificationPrompt {
        let intents: Vec<Intent> = if intent == Intent::Unknown {
            COMMON_ACTIONS.to_vec()
        } else {
            vec![intent, neighbour(intent)]
        };

        let options = intents
            .into_iter()
            .map(|intent| ClarificationOption {
                label: self.label(intent).to_string(),
                intent,
            })
            .collect();

        let note = entities
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        ClarificationPrompt {
            question: self.question(note),
            options,
        }
    }

    fn question(&self, note: Option<&str>) -> String {
        match (self.locale, note) {
            (Locale::En, Some(note)) => format!("What do you want to do with '{}'?", note),
            (Locale::En, None) => "What do you want to do?".to_string(),
            (Locale::Ja, Some(note)) => format!("「{}」をどうしますか？", note),
            (Locale::Ja, None) => "何をしますか？".to_string(),
        }
    }

    fn label(&self, intent: Intent) -> &'static str {
        match self.locale {
            Locale::En => match intent {
                Intent::Open => "Open the note",
                Intent::Search => "Search the vault",
                Intent::Read => "Read the note",
                Intent::Summarize => "Summarize the note",
                Intent::Comment => "Talk about the note",
                Intent::Update => "Edit the note",
                Intent::Table => "Show its tables",
                Intent::Unknown => "Something else",
            },
            Locale::Ja => match intent {
                Intent::Open => "ノートを開く",
                Intent::Search => "検索する",
                Intent::Read => "内容を読む",
                Intent::Summarize => "要約する",
                Intent::Comment => "コメントする",
                Intent::Update => "編集する",
                Intent::Table => "表を表示する",
                Intent::Unknown => "その他",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::ClassificationResult;
    use crate::routing::RoutingPolicy;
    use proptest::prelude::*;

    fn clarify(intent: Intent) -> RoutingDecision {
        RoutingDecision {
            action: RouteAction::Clarify,
            intent,
            fallback: None,
            confidence: 0.3,
            rationale: "low confidence, clarification needed".into(),
        }
    }

    fn with_note(note: &str) -> Entities {
        Entities {
            query: Some(format!("{}って", note)),
            note: Some(note.to_string()),
            ..Default::default()
        }
    }

    fn intents(prompt: &ClarificationPrompt) -> Vec<Intent> {
        prompt.options.iter().map(|o| o.intent).collect()
    }

    #[test]
    fn test_unknown_offers_common_actions() {
        let prompt = ClarificationGenerator::default()
            .generate(&clarify(Intent::Unknown), &Entities::default())
            .unwrap();
        assert_eq!(intents(&prompt), vec![Intent::Open, Intent::Search, Intent::Read]);
        assert_eq!(prompt.question, "What do you want to do?");
    }

    #[test]
    fn test_low_confidence_pairs_with_neighbour() {
        let generator = ClarificationGenerator::default();
        let open = generator.generate(&clarify(Intent::Open), &with_note("部品")).unwrap();
        assert_eq!(intents(&open), vec![Intent::Open, Intent::Search]);
        assert_eq!(open.question, "What do you want to do with '部品'?");

        let read = generator.generate(&clarify(Intent::Read), &Entities::default()).unwrap();
        assert_eq!(intents(&read), vec![Intent::Read, Intent::Summarize]);
    }

    #[test]
    fn test_japanese_locale() {
        let prompt = ClarificationGenerator::new(Locale::Ja)
            .generate(&clarify(Intent::Open), &with_note("議事録"))
            .unwrap();
        assert_eq!(prompt.question, "「議事録」をどうしますか？");
        assert_eq!(prompt.options[0].label, "ノートを開く");
    }

    #[test]
    fn test_not_generated_for_execution() {
        let generator = ClarificationGenerator::default();
        for action in [RouteAction::Execute, RouteAction::ExecuteWithFallback, RouteAction::Reject] {
            let mut decision = clarify(Intent::Open);
            decision.action = action;
            assert!(generator.generate(&decision, &Entities::default()).is_none());
        }
    }

    #[test]
    fn test_blank_note_uses_generic_question() {
        let prompt = ClarificationGenerator::default()
            .generate(&clarify(Intent::Search), &with_note("  "))
            .unwrap();
        assert_eq!(prompt.question, "What do you want to do?");
    }

    proptest! {
        #[test]
        fn option_count_is_two_or_three(intent in prop::sample::select(Intent::ALL.to_vec()), c in -1.0f32..=2.0) {
            let result = ClassificationResult {
                intent,
                confidence: c,
                entities: with_note("部品"),
            };
            let decision = RoutingPolicy::default().decide(&result);
            let prompt = ClarificationGenerator::default().generate(&decision, &result.entities);
            match prompt {
                Some(prompt) => {
                    prop_assert_eq!(decision.action, RouteAction::Clarify);
                    prop_assert!((2..=3).contains(&prompt.options.len()));
                    let unique: std::collections::HashSet<_> = intents(&prompt).into_iter().collect();
                    prop_assert_eq!(unique.len(), prompt.options.len());
                }
                None => prop_assert_ne!(decision.action, RouteAction::Clarify),
            }
        }
    }
}
