//! Pipeline orchestrator.
//!
//! Per event, strictly in order:
//! `Ingested → Normalized → {Rejected | Validated} → Classified → Enriched → Stored`.
//!
//! Rejection at validation is terminal and is returned as a value. Only store
//! failures surface as errors. Each stage takes the event by value and hands back
//! a new one; nothing is shared between in-flight events except the store handle.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;
use tracing::{debug, info};

use crate::analytics::{self, Summary};
use crate::analyze::dedup::{commit_reserved, DedupParams, DedupVerdict, Deduplicator, RejectReason, Screening};
use crate::analyze::ner::{Enricher, PlaceholderEnricher};
use crate::analyze::oracle::{classify_or_fallback, DynOracle};
use crate::analyze::rules::{default_rules, KeywordClassifier, KeywordRule};
use crate::ingest::types::{Category, Event, Meta, Stage, StoredEvent};
use crate::ingest::DIRECT_CHANNEL;
use crate::metrics;
use crate::store::{FingerprintStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Final verdict for one event. Serializes with a `status` tag:
/// `{"status":"processed","event_id":1,"category":"CIVIL_ACTIVITY","event":{..}}` or
/// `{"status":"rejected","reason":"duplicate"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessResult {
    Processed {
        event_id: i64,
        category: Category,
        event: Box<Event>,
    },
    Rejected {
        reason: RejectReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        similarity: Option<f64>,
    },
}

impl ProcessResult {
    fn rejected(reason: RejectReason) -> Self {
        ProcessResult::Rejected {
            reason,
            similarity: reason.ratio(),
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, ProcessResult::Processed { .. })
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            ProcessResult::Processed { category, .. } => Some(*category),
            ProcessResult::Rejected { .. } => None,
        }
    }

    pub fn event_id(&self) -> Option<i64> {
        match self {
            ProcessResult::Processed { event_id, .. } => Some(*event_id),
            ProcessResult::Rejected { .. } => None,
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            ProcessResult::Processed { event, .. } => Some(event.as_ref()),
            ProcessResult::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ProcessResult::Rejected { reason, .. } => Some(*reason),
            ProcessResult::Processed { .. } => None,
        }
    }
}

pub struct Pipeline {
    dedup: Deduplicator,
    classifier: KeywordClassifier,
    oracle: Option<DynOracle>,
    enricher: Arc<dyn Enricher>,
}

pub struct PipelineBuilder {
    store: Arc<FingerprintStore>,
    params: DedupParams,
    rules: Vec<KeywordRule>,
    oracle: Option<DynOracle>,
    enricher: Arc<dyn Enricher>,
}

impl PipelineBuilder {
    pub fn dedup(mut self, params: DedupParams) -> Self {
        self.params = params;
        self
    }

    pub fn rules(mut self, rules: Vec<KeywordRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn oracle(mut self, oracle: Option<DynOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            dedup: Deduplicator::new(self.store, self.params),
            classifier: KeywordClassifier::new(self.rules),
            oracle: self.oracle,
            enricher: self.enricher,
        }
    }
}

impl Pipeline {
    /// Default stages over the given store: keyword table, no oracle, placeholder
    /// enrichment.
    pub fn new(store: Arc<FingerprintStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: Arc<FingerprintStore>) -> PipelineBuilder {
        PipelineBuilder {
            store,
            params: DedupParams::default(),
            rules: default_rules(),
            oracle: None,
            enricher: Arc::new(PlaceholderEnricher),
        }
    }

    pub fn store(&self) -> &Arc<FingerprintStore> {
        self.dedup.store()
    }

    pub fn classifier(&self) -> &KeywordClassifier {
        &self.classifier
    }

    pub async fn process_event(
        &self,
        source: &str,
        text: &str,
        meta: Meta,
    ) -> Result<ProcessResult, PipelineError> {
        self.process_event_via(DIRECT_CHANNEL, source, text, meta).await
    }

    /// Like [`Pipeline::process_event`], recording `channel` (e.g. "api") as the
    /// producer of the ingest step.
    pub async fn process_event_via(
        &self,
        channel: &str,
        source: &str,
        text: &str,
        meta: Meta,
    ) -> Result<ProcessResult, PipelineError> {
        self.process_event_from(channel, None, source, text, meta).await
    }

    /// Full form: channel plus the remote client address, when the transport knows it.
    pub async fn process_event_from(
        &self,
        channel: &str,
        client: Option<&str>,
        source: &str,
        text: &str,
        meta: Meta,
    ) -> Result<ProcessResult, PipelineError> {
        metrics::record_received();

        // Ingested → Normalized
        let event = Event::ingest_from(channel, client, source, text, meta);
        let fp = event.fingerprint.short().to_string();

        // → Rejected | Validated
        let reservation = match blocking(|| self.dedup.screen(&event))? {
            Screening::Rejected(reason) => return Ok(self.reject(&fp, source, reason)),
            Screening::Admitted(r) => r,
        };
        let event = Event {
            provenance: event.provenance.with_step(
                Stage::Validate,
                "dedup",
                Some(json!({ "fingerprint": event.fingerprint })),
            ),
            ..event
        };

        // → Classified → Enriched
        let event = self.classify(event).await;
        let event = self.enricher.enrich(event);

        // → Stored
        match blocking(|| commit_reserved(reservation, &event))? {
            DedupVerdict::Accepted { id } => {
                metrics::record_processed();
                info!(
                    target: "intake",
                    fp = %fp,
                    source,
                    id,
                    category = %event.category,
                    "event stored"
                );
                Ok(ProcessResult::Processed {
                    event_id: id,
                    category: event.category,
                    event: Box::new(event),
                })
            }
            DedupVerdict::Rejected(reason) => Ok(self.reject(&fp, source, reason)),
        }
    }

    async fn classify(&self, event: Event) -> Event {
        let Some(oracle) = &self.oracle else {
            return self.classifier.classify(event);
        };
        let (verdict, err) = classify_or_fallback(oracle.as_ref(), &event.text).await;
        let detail = json!({
            "category": verdict.category,
            "confidence": verdict.confidence,
            "error": err.map(|e| e.to_string()),
        });
        Event {
            category: verdict.category,
            provenance: event.provenance.with_step(
                Stage::Classify,
                format!("oracle:{}", oracle.name()),
                Some(detail),
            ),
            ..event
        }
    }

    fn reject(&self, fp: &str, source: &str, reason: RejectReason) -> ProcessResult {
        metrics::record_rejected(reason.as_str());
        debug!(target: "intake", fp = %fp, source, reason = reason.as_str(), "event rejected");
        ProcessResult::rejected(reason)
    }

    /// Category counts over everything stored so far.
    pub fn summarize(&self) -> Result<Summary, PipelineError> {
        let stored = self.store().events()?;
        Ok(analytics::summarize(stored.iter().map(|s| &s.event)))
    }

    /// Newest stored events first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, PipelineError> {
        Ok(self.store().recent(limit)?)
    }
}

/// The admission lock, the near-duplicate scan and SQLite calls block. On a
/// multi-threaded runtime the worker hands its other tasks off while they run;
/// a current-thread runtime has nowhere to hand them, so the call runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::oracle::StubOracle;

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(FingerprintStore::in_memory()))
    }

    #[tokio::test]
    async fn processed_event_has_full_provenance() {
        let p = pipeline();
        let res = p
            .process_event("OSINT", "Peaceful protest observed in Almaty", Meta::new())
            .await
            .unwrap();
        let ev = res.event().expect("processed");
        let stages: Vec<Stage> = ev.provenance.steps().iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Ingest, Stage::Normalize, Stage::Validate, Stage::Classify, Stage::Enrich]
        );
        assert_eq!(ev.entities.location.as_deref(), Some("unknown"));
        assert_eq!(res.event_id(), Some(1));

        // The stored copy is the classified + enriched record.
        let stored = p.recent(1).unwrap();
        assert_eq!(stored[0].event.category, Category::CivilActivity);
        assert_eq!(stored[0].event.entities, ev.entities);
    }

    #[tokio::test]
    async fn rejection_serializes_reason_label() {
        let p = pipeline();
        let res = p.process_event("API", "tiny", Meta::new()).await.unwrap();
        assert_eq!(res.reason(), Some(RejectReason::TooShort));
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            json!({"status": "rejected", "reason": "too_short"})
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn screening_and_commit_run_on_a_multi_thread_runtime() {
        let p = pipeline();
        let res = p
            .process_event_from("api", Some("192.0.2.1"), "SENSOR", "Power outage detected in north sector", Meta::new())
            .await
            .unwrap();
        assert_eq!(res.category(), Some(Category::Infrastructure));
        let again = p
            .process_event("SENSOR", "Power outage detected in north sector", Meta::new())
            .await
            .unwrap();
        assert_eq!(again.reason(), Some(RejectReason::Duplicate));

        let detail = p.recent(1).unwrap()[0]
            .event
            .provenance
            .step(Stage::Ingest)
            .unwrap()
            .detail
            .clone()
            .unwrap();
        assert_eq!(detail["client"], "192.0.2.1");
    }

    #[test]
    fn blocking_runs_inline_outside_a_runtime() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test]
    async fn oracle_overrides_keyword_table() {
        let store = Arc::new(FingerprintStore::in_memory());
        let p = Pipeline::builder(store)
            .oracle(Some(Arc::new(StubOracle)))
            .build();
        // Keyword table would say CRISIS_EVENT; the stub oracle says SECURITY_ALERT.
        let res = p
            .process_event("API", "Attack reported at the depot", Meta::new())
            .await
            .unwrap();
        assert_eq!(res.category(), Some(Category::SecurityAlert));
        let step = res.event().unwrap().provenance.step(Stage::Classify).unwrap().clone();
        assert_eq!(step.producer, "oracle:stub");
    }
}
