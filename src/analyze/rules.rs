//! Keyword classification table.
//!
//! Rules are evaluated in table order; the first keyword that occurs as a
//! case-insensitive substring of the normalized text decides the category.
//! Matching is substring-based, not token-based ("attacker" matches "attack").
//! No match leaves the event `UNCLASSIFIED`.
//!
//! Default order (earlier entries take priority):
//! `protest` → CIVIL_ACTIVITY, `threat` → SECURITY_ALERT,
//! `outage` → INFRASTRUCTURE, `attack` → CRISIS_EVENT.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ingest::normalize_text;
use crate::ingest::types::{Category, Event, Stage};

pub const KEYWORD_PRODUCER: &str = "keyword_table";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub category: Category,
}

impl KeywordRule {
    pub fn new(keyword: &str, category: Category) -> Self {
        Self {
            keyword: keyword.to_string(),
            category,
        }
    }
}

pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new("protest", Category::CivilActivity),
        KeywordRule::new("threat", Category::SecurityAlert),
        KeywordRule::new("outage", Category::Infrastructure),
        KeywordRule::new("attack", Category::CrisisEvent),
    ]
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl KeywordClassifier {
    /// Keywords are normalized up front; empty keywords are dropped (they would
    /// match everything).
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| KeywordRule {
                keyword: normalize_text(&r.keyword),
                category: r.category,
            })
            .filter(|r| !r.keyword.is_empty())
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First matching rule for already-normalized text.
    pub fn matching_rule(&self, normalized_text: &str) -> Option<&KeywordRule> {
        let text = normalize_text(normalized_text);
        self.rules.iter().find(|r| text.contains(r.keyword.as_str()))
    }

    pub fn category_for(&self, normalized_text: &str) -> Category {
        self.matching_rule(normalized_text)
            .map(|r| r.category)
            .unwrap_or(Category::Unclassified)
    }

    /// Returns the event with `category` set and a classify step recorded.
    pub fn classify(&self, event: Event) -> Event {
        let hit = self.matching_rule(&event.normalized_text);
        let category = hit.map(|r| r.category).unwrap_or(Category::Unclassified);
        let detail = json!({
            "keyword": hit.map(|r| r.keyword.as_str()),
            "category": category,
        });
        Event {
            category,
            provenance: event
                .provenance
                .with_step(Stage::Classify, KEYWORD_PRODUCER, Some(detail)),
            ..event
        }
    }
}
