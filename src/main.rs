//! Event intake service: binary entrypoint.
//! Loads config, opens the event store, wires the pipeline and serves the Axum router.

use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_intake::api::{self, AppState};
use event_intake::config::IntakeConfig;
use event_intake::metrics::Metrics;

/// Compact logs by default; JSON lines when INTAKE_LOG_JSON=1.
/// RUST_LOG overrides the default filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("intake=info,warn"));

    let json = std::env::var("INTAKE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    // Shuttle may already have installed a global subscriber; try_init keeps ours optional.
    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = IntakeConfig::load_default()?;
    let store = cfg.open_store()?;
    let pipeline = cfg.build_pipeline(store)?;
    info!(
        target: "intake",
        threshold = cfg.dedup.threshold,
        rules = pipeline.classifier().rules().len(),
        "pipeline ready"
    );

    let metrics = Metrics::init()?;
    let router = api::create_router(AppState::new(pipeline)).merge(metrics.router());

    Ok(router.into())
}
