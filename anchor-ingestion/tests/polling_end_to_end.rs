//! End-to-end exercise of the polling-diff driver against the in-memory
//! fake adapter: capture via `PollingDiffSource`, replay via
//! `apply_cdc_event`, and confirm the replayed target converges on the
//! same state the source snapshot reached (§4.5.2, §8).
//!
//! Grounded on the teacher's `ConnectorTest`-style integration suites
//! (`dozer-ingestion-connector`'s `tests/` directory), adapted to this
//! crate's `testing::test-util` feature rather than a live backend.

use std::sync::Arc;
use std::time::Duration;

use anchor_connector::{CallContext, CallTarget, DataOperator, ReplicationSource};
use anchor_ingestion::apply::apply_cdc_event;
use anchor_ingestion::cdc::PollingDiffSource;
use anchor_ingestion::testing::{FakeDataOperator, FakeSnapshotSource, RecordingCdcHandler};
use anchor_types::{BackendId, PortableValue, Row};

fn row(id: i64, value: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), PortableValue::Int(id));
    row.insert("value".to_string(), PortableValue::String(value.to_string()));
    row
}

#[tokio::test]
async fn capture_and_replay_converge_on_the_same_state() {
    let source = FakeSnapshotSource::new(vec!["id".to_string()]);
    let driver = PollingDiffSource::new(BackendId::Cassandra, "demo_ks", vec!["widgets".to_string()], Arc::new(source.clone()), Duration::from_millis(15));
    let handler = Arc::new(RecordingCdcHandler::new());
    driver.clone().start(handler.clone()).await.unwrap();

    source.set_row("widgets", "1", row(1, "first"));
    source.set_row("widgets", "2", row(2, "second"));
    tokio::time::sleep(Duration::from_millis(60)).await;

    source.set_row("widgets", "1", row(1, "first-updated"));
    tokio::time::sleep(Duration::from_millis(60)).await;

    source.remove_row("widgets", "2");
    tokio::time::sleep(Duration::from_millis(60)).await;

    driver.stop().await.unwrap();

    let events = handler.events();
    assert!(!events.is_empty(), "polling-diff driver should have captured at least one event");

    let target = FakeDataOperator::new();
    let ctx = CallContext::for_test(CallTarget::Database("demo_ks".to_string()));
    for event in &events {
        apply_cdc_event(&ctx, BackendId::Cassandra, &target, "widgets", event, None).await.unwrap();
    }

    let rows = target.fetch(&ctx, "widgets", None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("value"), Some(&PortableValue::String("first-updated".to_string())));
}

#[tokio::test]
async fn a_table_with_no_changes_produces_no_events() {
    let source = FakeSnapshotSource::new(vec!["id".to_string()]);
    source.set_row("widgets", "1", row(1, "steady"));

    let driver = PollingDiffSource::new(BackendId::Cassandra, "demo_ks", vec!["widgets".to_string()], Arc::new(source), Duration::from_millis(15));
    let handler = Arc::new(RecordingCdcHandler::new());
    driver.clone().start(handler.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    driver.stop().await.unwrap();

    assert_eq!(handler.events().len(), 0, "the baseline tick establishes the snapshot and should not itself emit events");
}
