//! In-process event store. Used by tests and as the default backend.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{RwLock, RwLockReadGuard};

use crate::ingest::types::{Event, StoredEvent};
use crate::store::{EventStore, Fingerprint, StoreError};

#[derive(Debug, Default)]
struct Inner {
    events: Vec<StoredEvent>,
    by_fingerprint: HashMap<Fingerprint, usize>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl EventStore for MemoryStore {
    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.read()?.by_fingerprint.contains_key(fingerprint))
    }

    fn all_texts(&self, visit: &mut dyn FnMut(&str) -> ControlFlow<()>) -> Result<(), StoreError> {
        let guard = self.read()?;
        for stored in &guard.events {
            if visit(&stored.event.normalized_text).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn commit(&self, event: &Event) -> Result<i64, StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        if guard.by_fingerprint.contains_key(&event.fingerprint) {
            return Err(StoreError::Conflict(event.fingerprint.clone()));
        }
        let id = guard.events.len() as i64 + 1;
        let idx = guard.events.len();
        guard.events.push(StoredEvent {
            id,
            event: event.clone(),
        });
        guard.by_fingerprint.insert(event.fingerprint.clone(), idx);
        Ok(id)
    }

    fn events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(self.read()?.events.clone())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.events.len())
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let guard = self.read()?;
        Ok(guard.events.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{types::Meta, DIRECT_CHANNEL};

    fn ev(text: &str) -> Event {
        Event::ingest(DIRECT_CHANNEL, "OSINT", text, Meta::new())
    }

    #[test]
    fn commit_assigns_sequential_ids_and_rejects_conflicts() {
        let s = MemoryStore::new();
        assert_eq!(s.commit(&ev("first event")).unwrap(), 1);
        assert_eq!(s.commit(&ev("second event")).unwrap(), 2);
        let err = s.commit(&ev("FIRST EVENT")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(s.len().unwrap(), 2);
    }

    #[test]
    fn all_texts_is_ordered_restartable_and_stoppable() {
        let s = MemoryStore::new();
        for t in ["one event", "two event", "three event"] {
            s.commit(&ev(t)).unwrap();
        }
        let mut seen = Vec::new();
        s.all_texts(&mut |t: &str| {
            seen.push(t.to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(seen, vec!["one event", "two event", "three event"]);

        let mut count = 0;
        s.all_texts(&mut |_: &str| {
            count += 1;
            if count == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn recent_is_newest_first() {
        let s = MemoryStore::new();
        for t in ["one event", "two event", "three event"] {
            s.commit(&ev(t)).unwrap();
        }
        let ids: Vec<i64> = s.recent(2).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
