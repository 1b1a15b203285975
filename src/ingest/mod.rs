// src/ingest/mod.rs
pub mod types;

use chrono::Utc;
use serde_json::json;

use crate::ingest::types::{Category, Entities, Event, Meta, Provenance, Stage};
use crate::store::fingerprint_of;

/// Producer recorded on the ingest step when the caller does not name a channel.
pub const DIRECT_CHANNEL: &str = "direct";

/// Canonical form used for hashing and comparison: trim, then lower-case.
///
/// Idempotent: `normalize_text(&normalize_text(x)) == normalize_text(x)`.
pub fn normalize_text(s: &str) -> String {
    s.trim().to_lowercase()
}

impl Event {
    /// Build a fresh event from raw input: stamps `received_at`, normalizes the text
    /// and derives the fingerprint. Category starts as `UNCLASSIFIED`.
    pub fn ingest(channel: &str, source: &str, text: &str, meta: Meta) -> Event {
        Self::ingest_from(channel, None, source, text, meta)
    }

    /// Like [`Event::ingest`], also recording the remote client address (if known)
    /// on the ingest step.
    pub fn ingest_from(
        channel: &str,
        client: Option<&str>,
        source: &str,
        text: &str,
        meta: Meta,
    ) -> Event {
        let received_at = Utc::now();
        let text = text.trim().to_string();
        let normalized_text = normalize_text(&text);
        let fingerprint = fingerprint_of(&normalized_text);

        let mut ingest_detail = json!({ "source": source, "received_at": received_at });
        if let Some(client) = client {
            ingest_detail["client"] = json!(client);
        }
        let provenance = Provenance::default()
            .with_step(Stage::Ingest, channel, Some(ingest_detail))
            .with_step(
                Stage::Normalize,
                "normalizer",
                Some(json!({ "chars": normalized_text.chars().count() })),
            );

        Event {
            source: source.trim().to_string(),
            text,
            normalized_text,
            received_at,
            fingerprint,
            meta,
            category: Category::Unclassified,
            entities: Entities::default(),
            provenance,
        }
    }
}
