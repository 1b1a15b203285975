//! Classification oracle: an optional external classifier that overrides the
//! keyword table.
//!
//! The pipeline never fails because of the oracle. Unreachable endpoints, non-2xx
//! statuses and malformed bodies all degrade to `UNCLASSIFIED` with confidence 0.0
//! (see [`classify_or_fallback`]).

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::ingest::types::Category;

pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub category: Category,
    pub confidence: f32,
}

impl OracleVerdict {
    pub fn unclassified() -> Self {
        Self {
            category: Category::Unclassified,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unreachable: {0}")]
    Unreachable(String),
    #[error("oracle returned status {0}")]
    Status(u16),
    #[error("oracle response malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, text: &str) -> Result<OracleVerdict, OracleError>;
    /// Provider name for provenance and logs.
    fn name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynOracle = Arc<dyn ClassificationOracle>;

/// Ask the oracle; on any error log it, count it, and return `UNCLASSIFIED`/0.0
/// together with the error for provenance.
pub async fn classify_or_fallback(
    oracle: &dyn ClassificationOracle,
    text: &str,
) -> (OracleVerdict, Option<OracleError>) {
    match oracle.classify(text).await {
        Ok(v) => (v, None),
        Err(e) => {
            warn!(target: "intake", oracle = oracle.name(), error = %e, "oracle failed; falling back");
            crate::metrics::record_oracle_fallback();
            (OracleVerdict::unclassified(), Some(e))
        }
    }
}

/// `[oracle]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    /// "http" | "stub"
    pub provider: String,
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "http".to_string(),
            url: None,
            timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
        }
    }
}

/// Factory: `None` when the oracle is disabled (keyword table only).
pub fn build_oracle(cfg: &OracleConfig) -> anyhow::Result<Option<DynOracle>> {
    if !cfg.enabled {
        return Ok(None);
    }
    match cfg.provider.to_ascii_lowercase().as_str() {
        "stub" => Ok(Some(Arc::new(StubOracle))),
        "http" => {
            let url = cfg
                .url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("oracle enabled but no url configured"))?;
            let oracle = HttpOracle::new(url, Duration::from_millis(cfg.timeout_ms.max(1)))?;
            Ok(Some(Arc::new(oracle)))
        }
        other => anyhow::bail!("unsupported oracle provider: {other}"),
    }
}

// ------------------------------------------------------------
// HTTP oracle
// ------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

/// Wire shape of an oracle answer; validated before it becomes a verdict.
#[derive(Deserialize)]
struct ClassifyResponse {
    category: Option<String>,
    confidence: Option<f32>,
}

/// Posts `{"text": ...}` and expects `{"category": ..., "confidence": ...}`.
pub struct HttpOracle {
    http: reqwest::Client,
    url: String,
}

impl HttpOracle {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("event-intake/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ClassificationOracle for HttpOracle {
    async fn classify(&self, text: &str) -> Result<OracleVerdict, OracleError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&ClassifyRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OracleError::Status(resp.status().as_u16()));
        }
        let body: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        parse_response(body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn parse_response(body: ClassifyResponse) -> Result<OracleVerdict, OracleError> {
    let label = body
        .category
        .ok_or_else(|| OracleError::Malformed("missing category".to_string()))?;
    let category = Category::from_label(&label)
        .ok_or_else(|| OracleError::Malformed(format!("unknown category {label:?}")))?;
    let confidence = match body.confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        Some(_) => return Err(OracleError::Malformed("non-finite confidence".to_string())),
        None => 0.0,
    };
    Ok(OracleVerdict {
        category,
        confidence,
    })
}

// ------------------------------------------------------------
// Local rule-based stub (also served by the `classifier-stub` binary)
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct StubOracle;

/// Fixed rule cascade with canned confidences. Checks Latin and Cyrillic keywords.
pub fn stub_verdict(text: &str) -> OracleVerdict {
    let t = text.to_lowercase();
    let any = |kws: &[&str]| kws.iter().any(|k| t.contains(k));
    let (category, confidence) = if any(&["protest", "митинг"]) {
        (Category::CivilActivity, 0.92)
    } else if any(&["threat", "attack", "угроза"]) {
        (Category::SecurityAlert, 0.95)
    } else if any(&["outage", "power", "отключение"]) {
        (Category::Infrastructure, 0.88)
    } else {
        (Category::Unclassified, 0.2)
    };
    OracleVerdict {
        category,
        confidence,
    }
}

#[async_trait]
impl ClassificationOracle for StubOracle {
    async fn classify(&self, text: &str) -> Result<OracleVerdict, OracleError> {
        Ok(stub_verdict(text))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Router exposing `POST /classify` backed by [`stub_verdict`].
pub fn stub_router() -> Router {
    Router::new().route(
        "/classify",
        post(|Json(req): Json<ClassifyRequest>| async move { Json(stub_verdict(&req.text)) }),
    )
}
