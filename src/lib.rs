// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analytics;
pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod store;

// Validation, classification and enrichment stages
pub mod analyze;

// ---- Re-exports for stable public API ----
pub use crate::analytics::{summarize, Summary};
pub use crate::api::{create_router, router, AppState};
pub use crate::config::IntakeConfig;
pub use crate::ingest::types::{Category, Event, Meta, StoredEvent};
pub use crate::pipeline::{Pipeline, PipelineError, ProcessResult};
pub use crate::store::{EventStore, Fingerprint, FingerprintStore, StoreError};
