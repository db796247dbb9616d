//! E2E tests for HTTP push delivery against a mock endpoint.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use emapulse_core::{
    Label, LabelKind, Notifier, StateDb, SweepConfig, Sweeper, WebPushSink,
};
use mockito::Matcher;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn seed(db: &StateDb, user_id: &str, endpoint: &str) {
    db.upsert_label(&Label {
        id: "anxious".into(),
        form_id: "form-1".into(),
        name: "anxious".into(),
        kind: LabelKind::Ema,
        decay_seconds: None,
        ema_interval_seconds: Some(300),
        prompt_text: None,
        created_at: t(0),
    })
    .unwrap();
    db.set_subscription(user_id, endpoint, None, t(0)).unwrap();
    db.start(user_id, "form-1", "anxious", 300, t(0)).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn posts_payload_json_to_subscription_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/push/u1")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "title": "Behavior Check",
            "body": "Are you still feeling anxious?",
        })))
        .with_status(201)
        .create_async()
        .await;

    let db = StateDb::open_memory().unwrap();
    seed(&db, "u1", &format!("{}/push/u1", server.url()));

    let sweeper = Sweeper::new(
        db,
        Notifier::new(Arc::new(WebPushSink::new(5)), "Behavior Check"),
        SweepConfig::default(),
    );

    let report = sweeper.run_once(t(400)).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_delivery_is_counted_and_retried_next_sweep() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/push/u1")
        .with_status(410)
        .expect(2)
        .create_async()
        .await;

    let db = StateDb::open_memory().unwrap();
    seed(&db, "u1", &format!("{}/push/u1", server.url()));

    let sweeper = Sweeper::new(
        db,
        Notifier::new(Arc::new(WebPushSink::new(5)), "Behavior Check"),
        SweepConfig::default(),
    );

    // Failure is isolated and the state stays due, so the next sweep
    // attempts delivery again.
    let report = sweeper.run_once(t(400)).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 0);

    let report = sweeper.run_once(t(460)).await.unwrap();
    assert_eq!(report.failed, 1);
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_endpoint_does_not_poison_other_deliveries() {
    let mut server = mockito::Server::new_async().await;
    let healthy = server
        .mock("POST", "/push/u2")
        .with_status(200)
        .create_async()
        .await;

    let db = StateDb::open_memory().unwrap();
    seed(&db, "u1", "http://127.0.0.1:9/push/u1");
    db.upsert_label(&Label {
        id: "tense".into(),
        form_id: "form-1".into(),
        name: "tense".into(),
        kind: LabelKind::Ema,
        decay_seconds: None,
        ema_interval_seconds: Some(300),
        prompt_text: None,
        created_at: t(0),
    })
    .unwrap();
    db.set_subscription("u2", &format!("{}/push/u2", server.url()), None, t(0))
        .unwrap();
    db.start("u2", "form-1", "tense", 300, t(0)).unwrap();

    let sweeper = Sweeper::new(
        db,
        Notifier::new(Arc::new(WebPushSink::new(5)), "Behavior Check"),
        SweepConfig::default(),
    );

    let report = sweeper.run_once(t(400)).await.unwrap();
    assert_eq!(report.due, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    healthy.assert_async().await;
}
