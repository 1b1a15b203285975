//! Local stand-in for the external classification oracle: serves `POST /classify`
//! with the fixed rule cascade. Point `INTAKE_ORACLE_URL` at it during development.

use event_intake::analyze::oracle::stub_router;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:5000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let addr = std::env::var("CLASSIFIER_STUB_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "classifier stub listening");

    axum::serve(listener, stub_router()).await?;
    Ok(())
}
