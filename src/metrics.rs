use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("intake_events_total", "Events received by the pipeline.");
        describe_counter!("intake_processed_total", "Events classified, enriched and stored.");
        describe_counter!(
            "intake_rejected_total",
            "Events rejected by validation, labelled by reason."
        );
        describe_counter!(
            "intake_oracle_fallback_total",
            "Oracle failures recovered as UNCLASSIFIED."
        );
        describe_histogram!(
            "intake_near_dup_scan_ms",
            "Near-duplicate scan time in milliseconds."
        );
        describe_histogram!(
            "intake_near_dup_scan_size",
            "Stored texts compared per near-duplicate scan."
        );
    });
}

pub(crate) fn record_received() {
    ensure_described();
    counter!("intake_events_total").increment(1);
}

pub(crate) fn record_processed() {
    counter!("intake_processed_total").increment(1);
}

pub(crate) fn record_rejected(reason: &'static str) {
    counter!("intake_rejected_total", "reason" => reason).increment(1);
}

pub(crate) fn record_oracle_fallback() {
    counter!("intake_oracle_fallback_total").increment(1);
}

pub(crate) fn record_scan(elapsed: Duration, scanned: usize) {
    histogram!("intake_near_dup_scan_ms").record(elapsed.as_secs_f64() * 1000.0);
    histogram!("intake_near_dup_scan_size").record(scanned as f64);
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
