// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::store::Fingerprint;

/// Bounded label set for event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    CivilActivity,
    SecurityAlert,
    Infrastructure,
    CrisisEvent,
    #[default]
    Unclassified,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::CivilActivity,
        Category::SecurityAlert,
        Category::Infrastructure,
        Category::CrisisEvent,
        Category::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CivilActivity => "CIVIL_ACTIVITY",
            Category::SecurityAlert => "SECURITY_ALERT",
            Category::Infrastructure => "INFRASTRUCTURE",
            Category::CrisisEvent => "CRISIS_EVENT",
            Category::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Parse a wire label (case-insensitive). Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(l))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied metadata: an open, ordered key-value map.
///
/// Keys are trimmed and empty keys are dropped. On `merge`, values from the
/// overlay replace existing values with the same key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meta(BTreeMap<String, serde_json::Value>);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one entry; returns the previous value for the key, if any.
    pub fn insert(
        &mut self,
        key: impl AsRef<str>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        let k = key.as_ref().trim();
        if k.is_empty() {
            return None;
        }
        self.0.insert(k.to_string(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key.trim())
    }

    /// Overlay `other` onto `self`; later keys win.
    pub fn merge(mut self, other: Meta) -> Meta {
        for (k, v) in other.0 {
            self.insert(k, v);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl<K: AsRef<str>, V: Into<serde_json::Value>> FromIterator<(K, V)> for Meta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Meta::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

/// Structured entities attached by the enrichment stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actors: Vec<String>,
}

/// Pipeline stage that produced a provenance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Normalize,
    Validate,
    Classify,
    Enrich,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceStep {
    pub stage: Stage,
    /// Who produced the output, e.g. "api", "keyword_table", "oracle:http".
    pub producer: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Audit trail, in stage order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Provenance(Vec<ProvenanceStep>);

impl Provenance {
    pub fn steps(&self) -> &[ProvenanceStep] {
        &self.0
    }

    pub fn step(&self, stage: Stage) -> Option<&ProvenanceStep> {
        self.0.iter().rev().find(|s| s.stage == stage)
    }

    /// Returns a new trail with one more step appended.
    pub fn with_step(
        mut self,
        stage: Stage,
        producer: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Self {
        self.0.push(ProvenanceStep {
            stage,
            producer: producer.into(),
            at: Utc::now(),
            detail,
        });
        self
    }
}

/// The central record flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub source: String,
    /// Original text, trimmed.
    pub text: String,
    pub normalized_text: String,
    pub received_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub provenance: Provenance,
}

/// An event as persisted, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    #[serde(flatten)]
    pub event: Event,
}
