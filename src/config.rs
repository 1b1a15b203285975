// src/config.rs
//! Service configuration.
//!
//! Resolution order: `$INTAKE_CONFIG_PATH` → `config/intake.toml` → built-in defaults.
//! After the file is read, a few env vars override single fields:
//! `INTAKE_DB_PATH`, `INTAKE_ORACLE_URL`, `INTAKE_NEAR_DUP_THRESHOLD`.
//!
//! ```toml
//! [store]
//! backend = "sqlite"
//! path = "data/events.db"
//!
//! [dedup]
//! min_len = 5
//! threshold = 0.9
//! metric = "sequence_matcher"
//!
//! [[classifier.rules]]
//! keyword = "protest"
//! category = "CIVIL_ACTIVITY"
//!
//! [oracle]
//! enabled = true
//! provider = "http"
//! url = "http://127.0.0.1:5000/classify"
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::analyze::dedup::DedupParams;
use crate::analyze::oracle::{build_oracle, OracleConfig};
use crate::analyze::rules::{default_rules, KeywordRule};
use crate::pipeline::Pipeline;
use crate::store::{EventStore, FingerprintStore, MemoryStore, SqliteStore};

pub const DEFAULT_CONFIG_PATH: &str = "config/intake.toml";
pub const DEFAULT_DB_PATH: &str = "data/events.db";

pub const ENV_CONFIG_PATH: &str = "INTAKE_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "INTAKE_DB_PATH";
pub const ENV_ORACLE_URL: &str = "INTAKE_ORACLE_URL";
pub const ENV_NEAR_DUP_THRESHOLD: &str = "INTAKE_NEAR_DUP_THRESHOLD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// SQLite file; ignored by the memory backend.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub rules: Vec<KeywordRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub store: StoreConfig,
    pub dedup: DedupParams,
    pub classifier: ClassifierConfig,
    pub oracle: OracleConfig,
}

impl IntakeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: IntakeConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading intake config from {}", path.display()))?;
        let cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing intake config {}", path.display()))?;
        Ok(cfg.with_env_overrides())
    }

    /// Load using env var + fallbacks:
    /// 1) $INTAKE_CONFIG_PATH (must exist)
    /// 2) config/intake.toml
    /// 3) defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default().with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(p) = non_empty_env(ENV_DB_PATH) {
            self.store.path = PathBuf::from(p);
        }
        if let Some(url) = non_empty_env(ENV_ORACLE_URL) {
            self.oracle.url = Some(url);
        }
        if let Some(t) = parse_threshold_env(std::env::var(ENV_NEAR_DUP_THRESHOLD).ok()) {
            self.dedup.threshold = t;
        }
        self.dedup = self.dedup.sanitized();
        self
    }

    /// Open the configured backend and wrap it in a shared store handle.
    pub fn open_store(&self) -> Result<Arc<FingerprintStore>> {
        let backend: Arc<dyn EventStore> = match self.store.backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::Sqlite => Arc::new(
                SqliteStore::open(&self.store.path)
                    .with_context(|| format!("opening sqlite store {}", self.store.path.display()))?,
            ),
        };
        info!(target: "intake", backend = ?self.store.backend, "event store ready");
        Ok(Arc::new(FingerprintStore::new(backend)))
    }

    /// Wire a pipeline over `store` with this config's dedup, rules and oracle.
    pub fn build_pipeline(&self, store: Arc<FingerprintStore>) -> Result<Pipeline> {
        let oracle = build_oracle(&self.oracle)?;
        if let Some(o) = &oracle {
            info!(target: "intake", oracle = o.name(), "classification oracle enabled");
        }
        Ok(Pipeline::builder(store)
            .dedup(self.dedup.clone())
            .rules(self.classifier.rules.clone())
            .oracle(oracle)
            .build())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}
