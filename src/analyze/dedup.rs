//! Deduplication engine.
//!
//! A candidate is rejected when:
//! 1. its normalized text is shorter than `min_len` characters,
//! 2. its fingerprint is already stored (or admitted and in flight),
//! 3. any stored text has a similarity ratio strictly above `threshold`.
//!
//! Otherwise it is accepted. Steps 2 and 3 run under the store's admission lock,
//! so the check and the reservation act as one unit per candidate.

use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::analyze::similarity::Metric;
use crate::ingest::types::Event;
use crate::store::{Admission, FingerprintStore, Reservation, StoreError};

pub const DEFAULT_MIN_LEN: usize = 5;
pub const DEFAULT_NEAR_DUP_THRESHOLD: f64 = 0.9;

/// Dedup parameters (`[dedup]` in the config file).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupParams {
    /// Minimum normalized length, in characters.
    pub min_len: usize,
    /// Ratios strictly above this value are near-duplicates.
    pub threshold: f64,
    pub metric: Metric,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_LEN,
            threshold: DEFAULT_NEAR_DUP_THRESHOLD,
            metric: Metric::SequenceMatcher,
        }
    }
}

impl DedupParams {
    /// Clamp threshold into `[0, 1]`; non-finite values fall back to the default.
    pub fn sanitized(mut self) -> Self {
        self.threshold = if self.threshold.is_finite() {
            self.threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_NEAR_DUP_THRESHOLD
        };
        self
    }
}

/// Why a candidate was not stored. Serializes as its snake_case label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    TooShort,
    Duplicate,
    NearDuplicate { ratio: f64 },
    /// Lost a commit race on the same fingerprint.
    Conflict,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooShort => "too_short",
            RejectReason::Duplicate => "duplicate",
            RejectReason::NearDuplicate { .. } => "near_duplicate",
            RejectReason::Conflict => "conflict",
        }
    }

    /// Similarity ratio for near-duplicates.
    pub fn ratio(&self) -> Option<f64> {
        match self {
            RejectReason::NearDuplicate { ratio } => Some(*ratio),
            _ => None,
        }
    }
}

impl Serialize for RejectReason {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Result of [`Deduplicator::validate_and_store`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupVerdict {
    Accepted { id: i64 },
    Rejected(RejectReason),
}

impl DedupVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DedupVerdict::Accepted { .. })
    }
}

/// Outcome of screening without committing.
pub enum Screening<'a> {
    Admitted(Reservation<'a>),
    Rejected(RejectReason),
}

pub struct Deduplicator {
    store: Arc<FingerprintStore>,
    params: DedupParams,
}

impl Deduplicator {
    pub fn new(store: Arc<FingerprintStore>, params: DedupParams) -> Self {
        Self {
            store,
            params: params.sanitized(),
        }
    }

    pub fn params(&self) -> &DedupParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    /// Run all rejection checks. On acceptance the candidate is reserved: concurrent
    /// screens see it as stored until the reservation is committed or dropped.
    pub fn screen(&self, event: &Event) -> Result<Screening<'_>, StoreError> {
        let text = event.normalized_text.as_str();
        if text.chars().count() < self.params.min_len {
            return Ok(Screening::Rejected(RejectReason::TooShort));
        }

        let metric = self.params.metric;
        let threshold = self.params.threshold;
        let admission = self.store.admit(&event.fingerprint, text, |corpus| {
            if corpus.exists(&event.fingerprint)? {
                return Ok(Some(RejectReason::Duplicate));
            }

            let started = Instant::now();
            let mut scanned = 0usize;
            let mut hit: Option<f64> = None;
            corpus.all_texts(&mut |existing: &str| {
                scanned += 1;
                let ratio = metric.ratio(text, existing);
                if ratio > threshold {
                    hit = Some(ratio);
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            })?;
            crate::metrics::record_scan(started.elapsed(), scanned);
            debug!(
                target: "intake",
                fp = event.fingerprint.short(),
                scanned,
                near_dup = hit.is_some(),
                "near-duplicate scan"
            );

            Ok(hit.map(|ratio| RejectReason::NearDuplicate { ratio }))
        })?;

        Ok(match admission {
            Admission::Reserved(r) => Screening::Admitted(r),
            Admission::Rejected(reason) => Screening::Rejected(reason),
        })
    }

    /// Screen and, if accepted, commit `event` as is. A commit that loses a
    /// fingerprint race is reported as `Rejected(Conflict)`.
    pub fn validate_and_store(&self, event: &Event) -> Result<DedupVerdict, StoreError> {
        match self.screen(event)? {
            Screening::Rejected(reason) => Ok(DedupVerdict::Rejected(reason)),
            Screening::Admitted(reservation) => commit_reserved(reservation, event),
        }
    }
}

/// Commit a reserved event, folding a lost race into a rejection.
pub fn commit_reserved(reservation: Reservation<'_>, event: &Event) -> Result<DedupVerdict, StoreError> {
    match reservation.commit(event) {
        Ok(id) => Ok(DedupVerdict::Accepted { id }),
        Err(StoreError::Conflict(_)) => Ok(DedupVerdict::Rejected(RejectReason::Conflict)),
        Err(e) => Err(e),
    }
}
