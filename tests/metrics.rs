// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use event_intake::api::{self, AppState};
use event_intake::metrics::Metrics;
use event_intake::{FingerprintStore, Pipeline};

// One recorder per process; this file holds a single test on purpose.
#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init().expect("install recorder");
    let pipeline = Pipeline::new(Arc::new(FingerprintStore::in_memory()));
    let app: Router = api::create_router(AppState::new(pipeline)).merge(metrics.router());

    for _ in 0..2 {
        let req = Request::post("/ingest")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"source":"OSINT","text":"Peaceful protest observed in Almaty"}"#,
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "intake_events_total 2",
        "intake_processed_total 1",
        r#"intake_rejected_total{reason="duplicate"} 1"#,
        "intake_near_dup_scan_ms",
    ] {
        assert!(text.contains(needle), "missing `{needle}` in:\n{text}");
    }
}
