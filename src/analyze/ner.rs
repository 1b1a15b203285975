// src/analyze/ner.rs
//! Entity enrichment.
//!
//! [`Enricher`] is the extension point for entity extraction (locations, dates,
//! actors). The pipeline only depends on the trait, so a real extractor can replace
//! [`PlaceholderEnricher`] without touching the orchestrator.

use serde_json::json;

use crate::ingest::types::{Entities, Event, Stage};

pub const UNKNOWN_LOCATION: &str = "unknown";

pub trait Enricher: Send + Sync {
    /// Returns the event with `entities` filled in.
    fn enrich(&self, event: Event) -> Event;
    /// Producer name recorded in provenance.
    fn name(&self) -> &'static str;
}

/// Deterministic stand-in: unknown location, the ingestion time as timestamp,
/// and no actors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEnricher;

impl Enricher for PlaceholderEnricher {
    fn enrich(&self, event: Event) -> Event {
        let entities = Entities {
            location: Some(UNKNOWN_LOCATION.to_string()),
            timestamp: Some(event.received_at),
            actors: Vec::new(),
        };
        Event {
            entities,
            provenance: event.provenance.with_step(
                Stage::Enrich,
                self.name(),
                Some(json!({ "extracted": 0 })),
            ),
            ..event
        }
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}
