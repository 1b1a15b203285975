//! Embedded SQLite event store.
//!
//! The `fingerprint` column is `UNIQUE`, so a commit racing another writer on the
//! same database file surfaces as `StoreError::Conflict` instead of a duplicate row.
//! Meta, entities and provenance are stored as JSON text.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use crate::ingest::types::{Category, Event, StoredEvent};
use crate::store::{EventStore, Fingerprint, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    source          TEXT NOT NULL,
    text            TEXT NOT NULL,
    normalized_text TEXT NOT NULL,
    fingerprint     TEXT NOT NULL UNIQUE,
    received_at     TEXT NOT NULL,
    meta            TEXT NOT NULL,
    category        TEXT NOT NULL,
    entities        TEXT NOT NULL,
    provenance      TEXT NOT NULL
);
";

const SELECT_EVENTS: &str = "SELECT id, source, text, normalized_text, fingerprint, received_at, \
     meta, category, entities, provenance FROM events";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                StoreError::Unavailable(format!("creating {}: {e}", dir.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let store = Self::init(conn)?;
        info!(target: "intake", path = %path.display(), "sqlite event store opened");
        Ok(store)
    }

    /// Private in-memory database (tests, ephemeral runs).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

fn to_json<T: serde::Serialize>(v: &T) -> Result<String, StoreError> {
    serde_json::to_string(v).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::Corrupt(e.to_string()))
}

struct Row {
    id: i64,
    source: String,
    text: String,
    normalized_text: String,
    fingerprint: String,
    received_at: String,
    meta: String,
    category: String,
    entities: String,
    provenance: String,
}

impl Row {
    fn into_stored(self) -> Result<StoredEvent, StoreError> {
        let received_at = DateTime::parse_from_rfc3339(&self.received_at)
            .map_err(|e| StoreError::Corrupt(format!("received_at: {e}")))?
            .with_timezone(&Utc);
        let category = Category::from_label(&self.category)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown category {}", self.category)))?;
        Ok(StoredEvent {
            id: self.id,
            event: Event {
                source: self.source,
                text: self.text,
                normalized_text: self.normalized_text,
                received_at,
                fingerprint: Fingerprint::from(self.fingerprint),
                meta: from_json(&self.meta)?,
                category,
                entities: from_json(&self.entities)?,
                provenance: from_json(&self.provenance)?,
            },
        })
    }
}

fn read_rows(conn: &Connection, sql: &str, limit: Option<usize>) -> Result<Vec<StoredEvent>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let map = |r: &rusqlite::Row<'_>| {
        Ok(Row {
            id: r.get(0)?,
            source: r.get(1)?,
            text: r.get(2)?,
            normalized_text: r.get(3)?,
            fingerprint: r.get(4)?,
            received_at: r.get(5)?,
            meta: r.get(6)?,
            category: r.get(7)?,
            entities: r.get(8)?,
            provenance: r.get(9)?,
        })
    };
    let rows = match limit {
        Some(n) => stmt
            .query_map(params![n as i64], map)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
    };
    rows.into_iter().map(Row::into_stored).collect()
}

impl EventStore for SqliteStore {
    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE fingerprint = ?1)",
            params![fingerprint.as_str()],
            |r| r.get(0),
        )?;
        Ok(found)
    }

    fn all_texts(&self, visit: &mut dyn FnMut(&str) -> ControlFlow<()>) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT normalized_text FROM events ORDER BY id")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            if visit(&text).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn commit(&self, event: &Event) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let res = conn.execute(
            "INSERT INTO events (source, text, normalized_text, fingerprint, received_at, \
             meta, category, entities, provenance) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.source,
                event.text,
                event.normalized_text,
                event.fingerprint.as_str(),
                event.received_at.to_rfc3339(),
                to_json(&event.meta)?,
                event.category.as_str(),
                to_json(&event.entities)?,
                to_json(&event.provenance)?,
            ],
        );
        match res {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Conflict(event.fingerprint.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn()?;
        read_rows(&conn, &format!("{SELECT_EVENTS} ORDER BY id"), None)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        Ok(n.max(0) as usize)
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn()?;
        read_rows(
            &conn,
            &format!("{SELECT_EVENTS} ORDER BY id DESC LIMIT ?1"),
            Some(limit),
        )
    }
}
