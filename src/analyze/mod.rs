// src/analyze/mod.rs
//! Analysis stages: validation (dedup + similarity), classification (keyword table
//! or oracle) and enrichment.

pub mod dedup;
pub mod ner;
pub mod oracle;
pub mod rules;
pub mod similarity;

// Re-export convenient types.
pub use crate::analyze::dedup::{DedupParams, DedupVerdict, Deduplicator, RejectReason};
pub use crate::analyze::ner::{Enricher, PlaceholderEnricher};
pub use crate::analyze::oracle::{ClassificationOracle, OracleConfig, OracleVerdict};
pub use crate::analyze::rules::{KeywordClassifier, KeywordRule};
pub use crate::analyze::similarity::Metric;
