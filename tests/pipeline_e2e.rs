// tests/pipeline_e2e.rs
//
// End-to-end behaviour of the pipeline over the in-memory store:
// - the reference scenario (protest, re-ingest, outage, summary)
// - near-duplicate rejection and the strict threshold boundary
// - classification priority through the full pipeline
// - short-text rejection and meta passthrough

use std::sync::Arc;

use serde_json::json;

use event_intake::analyze::dedup::{DedupParams, RejectReason};
use event_intake::analyze::rules::KeywordRule;
use event_intake::ingest::types::Stage;
use event_intake::{Category, EventStore, FingerprintStore, Meta, Pipeline, ProcessResult};

fn pipeline() -> Pipeline {
    Pipeline::new(Arc::new(FingerprintStore::in_memory()))
}

#[tokio::test]
async fn reference_scenario() {
    let p = pipeline();

    let first = p
        .process_event("OSINT", "Peaceful protest observed in Almaty", Meta::new())
        .await
        .unwrap();
    assert!(first.is_processed());
    assert_eq!(first.category(), Some(Category::CivilActivity));

    let again = p
        .process_event("OSINT", "Peaceful protest observed in Almaty", Meta::new())
        .await
        .unwrap();
    assert_eq!(again.reason(), Some(RejectReason::Duplicate));

    let outage = p
        .process_event("SENSOR", "Power outage detected in north sector", Meta::new())
        .await
        .unwrap();
    assert_eq!(outage.category(), Some(Category::Infrastructure));

    let summary = p.summarize().unwrap();
    assert_eq!(
        serde_json::to_value(&summary).unwrap(),
        json!({"CIVIL_ACTIVITY": 1, "INFRASTRUCTURE": 1})
    );
    assert_eq!(p.store().backend().len().unwrap(), 2);
}

#[tokio::test]
async fn duplicate_detection_ignores_case_and_outer_whitespace() {
    let p = pipeline();
    assert!(p
        .process_event("NEWS", "Threat reported near the bridge", Meta::new())
        .await
        .unwrap()
        .is_processed());
    let res = p
        .process_event("OTHER", "   THREAT reported near the BRIDGE\n", Meta::new())
        .await
        .unwrap();
    assert_eq!(res.reason(), Some(RejectReason::Duplicate));
}

#[tokio::test]
async fn near_duplicate_is_rejected_with_ratio() {
    let p = pipeline();
    p.process_event("OSINT", "Peaceful protest observed in Almaty", Meta::new())
        .await
        .unwrap();

    let res = p
        .process_event("OSINT", "Peaceful protest observed today in Almaty", Meta::new())
        .await
        .unwrap();
    match res {
        ProcessResult::Rejected {
            reason: RejectReason::NearDuplicate { ratio },
            similarity,
        } => {
            assert!((ratio - 70.0 / 76.0).abs() < 1e-9, "ratio {ratio}");
            assert_eq!(similarity, Some(ratio));
        }
        other => panic!("expected near duplicate, got {other:?}"),
    }
    // Nothing was stored for the rejected candidate.
    assert_eq!(p.recent(10).unwrap().len(), 1);
}

#[tokio::test]
async fn ratio_exactly_at_threshold_is_kept() {
    let p = pipeline();
    assert!(p.process_event("X", "abcdefghij", Meta::new()).await.unwrap().is_processed());
    // 18/20 == 0.9, not strictly above
    assert!(p.process_event("X", "abcdefghiz", Meta::new()).await.unwrap().is_processed());
}

#[tokio::test]
async fn lower_threshold_rejects_more() {
    let store = Arc::new(FingerprintStore::in_memory());
    let p = Pipeline::builder(store)
        .dedup(DedupParams {
            threshold: 0.3,
            ..Default::default()
        })
        .build();
    p.process_event("S", "peaceful protest observed in almaty", Meta::new())
        .await
        .unwrap();
    // ratio 22/72 ~ 0.306 against the first text
    let res = p
        .process_event("S", "power outage detected in north sector", Meta::new())
        .await
        .unwrap();
    assert!(matches!(
        res.reason(),
        Some(RejectReason::NearDuplicate { .. })
    ));
}

#[tokio::test]
async fn classification_priority_through_pipeline() {
    let p = pipeline();
    let cases = [
        ("Threat of unrest at the protest site", Category::CivilActivity),
        ("Attack threat against the depot", Category::SecurityAlert),
        ("Attack on the outage crews", Category::Infrastructure),
        ("Attackers seen near the harbour", Category::CrisisEvent),
        ("Nothing notable happened today", Category::Unclassified),
    ];
    for (text, want) in cases {
        let res = p.process_event("OSINT", text, Meta::new()).await.unwrap();
        assert_eq!(res.category(), Some(want), "{text}");
    }
}

#[tokio::test]
async fn custom_rules_replace_the_default_table() {
    let store = Arc::new(FingerprintStore::in_memory());
    let p = Pipeline::builder(store)
        .rules(vec![KeywordRule::new("blackout", Category::Infrastructure)])
        .build();
    let res = p
        .process_event("SENSOR", "Blackout across the east district", Meta::new())
        .await
        .unwrap();
    assert_eq!(res.category(), Some(Category::Infrastructure));
    let res = p
        .process_event("OSINT", "Large protest downtown this evening", Meta::new())
        .await
        .unwrap();
    assert_eq!(res.category(), Some(Category::Unclassified));
}

#[tokio::test]
async fn short_text_is_rejected_before_anything_is_stored() {
    let p = pipeline();
    for text in ["", "   ", "ok", "  abcd  "] {
        let res = p.process_event("API", text, Meta::new()).await.unwrap();
        assert_eq!(res.reason(), Some(RejectReason::TooShort), "{text:?}");
    }
    assert!(p.summarize().unwrap().is_empty());
}

#[tokio::test]
async fn meta_and_provenance_are_carried_to_the_store() {
    let p = pipeline();
    let meta: Meta = [("lang", json!("en")), ("priority", json!(2))].into_iter().collect();
    let res = p
        .process_event_via("api", "OSINT", "Outage reported at the rail depot", meta.clone())
        .await
        .unwrap();
    let id = res.event_id().unwrap();

    let stored = p.recent(1).unwrap().remove(0);
    assert_eq!(stored.id, id);
    assert_eq!(stored.event.meta, meta);
    assert_eq!(stored.event.provenance.step(Stage::Ingest).unwrap().producer, "api");
    assert_eq!(
        stored.event.provenance.step(Stage::Classify).unwrap().producer,
        "keyword_table"
    );
}

#[tokio::test]
async fn summary_grows_monotonically() {
    let p = pipeline();
    let texts = [
        "Protest announced for the weekend",
        "Water outage in the old town",
        "Second protest planned at the university campus",
        "Protest announced for the weekend",
    ];
    let mut last_total = 0u64;
    for t in texts {
        p.process_event("NEWS", t, Meta::new()).await.unwrap();
        let s = p.summarize().unwrap();
        let total: u64 = s.values().sum();
        assert!(total >= last_total);
        assert_eq!(total as usize, p.store().events().unwrap().len());
        last_total = total;
    }
    assert_eq!(last_total, 3);
}
