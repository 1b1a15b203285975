//! Fingerprint store: durable set of accepted events keyed by the digest of their
//! normalized text.
//!
//! Backends implement [`EventStore`]. Pipelines share a [`FingerprintStore`] handle,
//! which serializes admission (existence check + near-duplicate scan + reservation)
//! so that two concurrent near-identical candidates cannot both pass.

pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ingest::types::{Event, StoredEvent};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// SHA-256 digest of normalized text, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars; enough to correlate log lines without leaking text.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Fingerprint(s)
    }
}

/// Deterministic digest of the normalized text bytes.
pub fn fingerprint_of(normalized_text: &str) -> Fingerprint {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Fingerprint(out)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another writer committed the same fingerprint first.
    #[error("fingerprint {0} already committed")]
    Conflict(Fingerprint),
    #[error("event store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Narrow interface over the durable event store.
pub trait EventStore: Send + Sync {
    /// True iff an event with this fingerprint was committed.
    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError>;

    /// Visit every stored normalized text in insertion order. The visitor may stop
    /// the scan early by returning `ControlFlow::Break`. Each call starts over.
    fn all_texts(&self, visit: &mut dyn FnMut(&str) -> ControlFlow<()>) -> Result<(), StoreError>;

    /// Insert one event; fails with `StoreError::Conflict` if the fingerprint exists.
    /// Returns the store-assigned id.
    fn commit(&self, event: &Event) -> Result<i64, StoreError>;

    /// All stored events in insertion order.
    fn events(&self) -> Result<Vec<StoredEvent>, StoreError>;

    /// Number of stored events.
    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.events()?.len())
    }

    /// Newest `limit` events, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let mut all = self.events()?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }
}

#[derive(Debug, Clone)]
struct Pending {
    fingerprint: Fingerprint,
    text: String,
}

/// Shared store handle: backend + admission lock + in-flight reservations.
pub struct FingerprintStore {
    backend: Arc<dyn EventStore>,
    pending: Mutex<Vec<Pending>>,
}

impl FingerprintStore {
    pub fn new(backend: Arc<dyn EventStore>) -> Self {
        Self {
            backend,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &dyn EventStore {
        self.backend.as_ref()
    }

    pub fn events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        self.backend.events()
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        self.backend.recent(limit)
    }

    /// Run `screen` under the admission lock against a view that includes both
    /// committed and in-flight texts. If `screen` returns `None`, the candidate is
    /// reserved and a [`Reservation`] is handed back.
    pub fn admit<R>(
        &self,
        fingerprint: &Fingerprint,
        normalized_text: &str,
        screen: impl FnOnce(&Corpus<'_>) -> Result<Option<R>, StoreError>,
    ) -> Result<Admission<'_, R>, StoreError> {
        let mut pending = self.lock_pending()?;
        let corpus = Corpus {
            backend: self.backend.as_ref(),
            pending: pending.as_slice(),
        };
        if let Some(rejection) = screen(&corpus)? {
            return Ok(Admission::Rejected(rejection));
        }
        pending.push(Pending {
            fingerprint: fingerprint.clone(),
            text: normalized_text.to_string(),
        });
        Ok(Admission::Reserved(Reservation {
            store: self,
            fingerprint: fingerprint.clone(),
            released: false,
        }))
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, Vec<Pending>>, StoreError> {
        self.pending
            .lock()
            .map_err(|_| StoreError::Unavailable("admission lock poisoned".to_string()))
    }

    fn release(&self, fingerprint: &Fingerprint) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(pos) = pending.iter().position(|p| &p.fingerprint == fingerprint) {
                pending.swap_remove(pos);
            }
        }
    }
}

/// Read view used while screening a candidate: committed texts first, then texts
/// that are admitted but not yet committed.
pub struct Corpus<'a> {
    backend: &'a dyn EventStore,
    pending: &'a [Pending],
}

impl Corpus<'_> {
    pub fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        if self.pending.iter().any(|p| &p.fingerprint == fingerprint) {
            return Ok(true);
        }
        self.backend.exists(fingerprint)
    }

    pub fn all_texts(
        &self,
        visit: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<(), StoreError> {
        let mut stopped = false;
        self.backend.all_texts(&mut |t: &str| {
            let flow = visit(t);
            stopped = flow.is_break();
            flow
        })?;
        if stopped {
            return Ok(());
        }
        for p in self.pending {
            if visit(&p.text).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Outcome of [`FingerprintStore::admit`].
pub enum Admission<'a, R> {
    Reserved(Reservation<'a>),
    Rejected(R),
}

/// An admitted candidate that is not yet committed. Dropping it without calling
/// [`Reservation::commit`] releases the slot.
pub struct Reservation<'a> {
    store: &'a FingerprintStore,
    fingerprint: Fingerprint,
    released: bool,
}

impl Reservation<'_> {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Persist the final record. The event must carry the reserved fingerprint.
    pub fn commit(mut self, event: &Event) -> Result<i64, StoreError> {
        if event.fingerprint != self.fingerprint {
            return Err(StoreError::Corrupt(format!(
                "reservation {} committed with fingerprint {}",
                self.fingerprint.short(),
                event.fingerprint.short()
            )));
        }
        let out = self.store.backend.commit(event);
        self.store.release(&self.fingerprint);
        self.released = true;
        out
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.store.release(&self.fingerprint);
        }
    }
}
