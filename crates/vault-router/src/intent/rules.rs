//! Rule-based intent classification
//!
//! Ordered keyword tiers with fixed confidences. The first matching rule wins,
//! so declaration order is the tie-break inside a tier.

use async_trait::async_trait;
use std::time::Instant;

use super::{Classification, ClassificationMetrics, ClassificationResult, Entities, Intent, IntentClassifier, Query};

struct Rule {
    intent: Intent,
    confidence: f32,
    keywords: &'static [&'static str],
}

const RULES: &[Rule] = &[
    // 0.9 tier: explicit action words
    Rule {
        intent: Intent::Open,
        confidence: 0.9,
        keywords: &["開", "open", "表示"],
    },
    Rule {
        intent: Intent::Search,
        confidence: 0.9,
        keywords: &["検索", "search", "探", "さが", "見つけ", "find"],
    },
    Rule {
        intent: Intent::Summarize,
        confidence: 0.9,
        keywords: &["要約", "summary", "summarize", "まとめ", "概要"],
    },
    Rule {
        intent: Intent::Table,
        confidence: 0.9,
        keywords: &["表", "table", "一覧", "リスト", "list"],
    },
    // 0.7 tier: content words
    Rule {
        intent: Intent::Read,
        confidence: 0.7,
        keywords: &["読", "見", "内容", "本文", "全文", "read"],
    },
    // 0.6 tier: a note is mentioned but the action is not
    Rule {
        intent: Intent::Read,
        confidence: 0.6,
        keywords: &["ノート", "note", "メモ", "文書"],
    },
    // 0.5 tier: ambiguous connectors
    Rule {
        intent: Intent::Comment,
        confidence: 0.5,
        keywords: &["について", "とは", "って", "どう"],
    },
];

/// Verb tails and connectors left behind once the action keyword is removed.
/// Longest first; at most one is stripped.
const VERB_TAILS: &[&str] = &[
    "について", "ください", "下さい", "いて", "して", "せて", "んで", "って", "て", "く",
];

/// Case particles; at most one is stripped, after the verb tail.
const PARTICLES: &[&str] = &["を", "は", "の", "に", "で", "が", "と"];

const FILLER_WORDS: &[&str] = &["please", "the", "a", "an", "me", "my", "for", "about", "of", "to"];

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a query synchronously. Deterministic and infallible.
    pub fn classify_query(&self, query: &Query) -> ClassificationResult {
        let mut result = self.classify_text(&query.text);
        result.entities.section = query.section.clone();
        result.entities.collection = non_empty(&query.collection);
        result
    }

    /// Classify bare text. `section` and `collection` are never inferred.
    pub fn classify_text(&self, text: &str) -> ClassificationResult {
        let trimmed = text.trim();
        let lowered = trimmed.to_ascii_lowercase();

        let matched = RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)));

        let (intent, confidence, note) = match matched {
            Some(rule) => (
                rule.intent,
                rule.confidence,
                extract_note(trimmed, &lowered, rule.keywords),
            ),
            None => (Intent::Unknown, 0.0, None),
        };

        ClassificationResult {
            intent,
            confidence,
            entities: Entities {
                query: Some(text.to_string()),
                note,
                section: None,
                collection: None,
            },
        }
    }
}

#[async_trait]
impl IntentClassifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, query: &Query) -> Classification {
        let start = Instant::now();
        let result = self.classify_query(query);
        Classification {
            result,
            metrics: ClassificationMetrics::rules(start.elapsed().as_secs_f64() * 1000.0),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Best-effort note extraction: drop the matched keywords, then trim filler.
///
/// `lowered` is the ASCII-lowercased `original`, so byte offsets line up.
fn extract_note(original: &str, lowered: &str, keywords: &[&str]) -> Option<String> {
    let mut removed = vec![false; original.len()];
    for keyword in keywords {
        for (start, _) in lowered.match_indices(keyword) {
            removed[start..start + keyword.len()].iter_mut().for_each(|r| *r = true);
        }
    }

    let kept: String = original
        .char_indices()
        .filter(|(i, _)| !removed[*i])
        .map(|(_, c)| c)
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    let note = trim_fillers(&collapsed);
    (!note.is_empty()).then(|| note.to_string())
}

fn trim_fillers(text: &str) -> &str {
    let mut text = trim_filler_words(text);
    if let Some(rest) = VERB_TAILS.iter().find_map(|t| text.strip_suffix(t)) {
        text = rest.trim_end();
    }
    if let Some(rest) = PARTICLES.iter().find_map(|p| text.strip_suffix(p)) {
        text = rest.trim_end();
    }
    trim_filler_words(text)
}

/// Drop whole English filler words from both ends.
fn trim_filler_words(mut text: &str) -> &str {
    loop {
        text = text.trim();
        if let Some((first, rest)) = text.split_once(char::is_whitespace) {
            if is_filler_word(first) {
                text = rest;
                continue;
            }
        }
        if let Some((rest, last)) = text.rsplit_once(char::is_whitespace) {
            if is_filler_word(last) {
                text = rest;
                continue;
            }
        }
        return text;
    }
}

fn is_filler_word(word: &str) -> bool {
    FILLER_WORDS.iter().any(|f| word.eq_ignore_ascii_case(f))
}
