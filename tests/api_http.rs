// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /ingest (processed, duplicate, too short, bad payload)
// - GET /events?limit=N
// - GET /analytics/summary
// - client address from connect info

use std::sync::Arc;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use event_intake::api::{self, AppState};
use event_intake::{FingerprintStore, Pipeline};

const BODY_LIMIT: usize = 1024 * 1024;

/// Build the same Router the binary uses, over a fresh in-memory store.
fn test_router() -> Router {
    let pipeline = Pipeline::new(Arc::new(FingerprintStore::in_memory()));
    api::router(AppState::new(pipeline))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn post_json(uri: &str, payload: &Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap().trim(), "OK");
}

#[tokio::test]
async fn api_ingest_flow_and_summary() {
    let app = test_router();

    let payload = json!({
        "source": "OSINT",
        "text": "Peaceful protest observed in Almaty",
        "meta": { "lang": "en" }
    });
    let (status, body) = send(&app, post_json("/ingest", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "processed");
    assert_eq!(v["event_id"], 1);
    assert_eq!(v["category"], "CIVIL_ACTIVITY");
    assert_eq!(v["event"]["meta"]["lang"], "en");
    assert_eq!(v["event"]["entities"]["location"], "unknown");
    assert_eq!(v["event"]["provenance"][0]["producer"], "api");

    // Same text again -> rejected as duplicate, still 200.
    let (status, body) = send(&app, post_json("/ingest", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v, json!({ "status": "rejected", "reason": "duplicate" }));

    let outage = json!({ "source": "SENSOR", "text": "Power outage detected in north sector" });
    let (_, body) = send(&app, post_json("/ingest", &outage)).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["category"], "INFRASTRUCTURE");

    let (status, body) = send(&app, get("/analytics/summary")).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v, json!({ "CIVIL_ACTIVITY": 1, "INFRASTRUCTURE": 1 }));

    let (status, body) = send(&app, get("/events?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    let arr = v.as_array().expect("array");
    assert_eq!(arr.len(), 1);
    // newest first
    assert_eq!(arr[0]["id"], 2);
    assert_eq!(arr[0]["source"], "SENSOR");

    let (_, body) = send(&app, get("/events")).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn api_near_duplicate_reports_similarity() {
    let app = test_router();
    let first = json!({ "source": "OSINT", "text": "Peaceful protest observed in Almaty" });
    send(&app, post_json("/ingest", &first)).await;

    let near = json!({ "source": "OSINT", "text": "Peaceful protest observed today in Almaty" });
    let (status, body) = send(&app, post_json("/ingest", &near)).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "rejected");
    assert_eq!(v["reason"], "near_duplicate");
    assert!(v["similarity"].as_f64().unwrap() > 0.9);
}

#[tokio::test]
async fn api_short_text_is_a_rejection_not_an_error() {
    let app = test_router();
    let (status, body) = send(&app, post_json("/ingest", &json!({ "source": "API", "text": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v, json!({ "status": "rejected", "reason": "too_short" }));
}

#[tokio::test]
async fn api_rejects_malformed_payload() {
    let app = test_router();
    let (status, _) = send(&app, post_json("/ingest", &json!({ "text": "no source given" }))).await;
    assert!(status.is_client_error(), "got {status}");
}

#[tokio::test]
async fn api_records_client_address_when_connect_info_is_present() {
    use shuttle_axum::axum::extract::ConnectInfo;
    use std::net::SocketAddr;

    let app = test_router();
    let payload = json!({ "source": "API", "text": "Outage reported at the rail depot" });
    let mut req = post_json("/ingest", &payload);
    let peer: SocketAddr = "203.0.113.9:51000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["event"]["provenance"][0]["detail"]["client"], "203.0.113.9");

    // Without connect info the field is simply absent.
    let other = json!({ "source": "API", "text": "Protest announced for the weekend" });
    let (_, body) = send(&app, post_json("/ingest", &other)).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert!(v["event"]["provenance"][0]["detail"].get("client").is_none());
}
