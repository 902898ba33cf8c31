//! §4.5.2 — the polling-diff driver: CDC emulation by periodic full-table
//! snapshot comparison. Shared by any backend without native CDC
//! (Cassandra, EdgeDB, Pinot, …). One worker task per table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anchor_connector::{CallContext, CallTarget, CdcHandler, CheckpointFn, ReplicationLag, ReplicationSource, ReplicationStatus};
use anchor_types::{AnchorError, AnchorResult, BackendId, CdcEvent, Row};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default tick interval (§4.5.2, §9 open question: whether this should be
/// per-table configurable is undecided — this build makes it per-source).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// EdgeDB ticks faster than the general default (§4.5.2).
pub const EDGEDB_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the polling-diff driver needs from an adapter: the primary/
/// clustering key columns for a table, and a full current snapshot. Any
/// adapter can implement this trivially on top of its own `DataOperator`
/// (`get_table_schema` + `fetch`).
#[async_trait]
pub trait PollingSnapshotSource: Send + Sync {
    async fn primary_key_columns(&self, ctx: &CallContext, table: &str) -> AnchorResult<Vec<String>>;
    async fn fetch_snapshot(&self, ctx: &CallContext, table: &str) -> AnchorResult<Vec<Row>>;
}

/// The row_key -> row_snapshot map for one table (§4.5.2 "Per-table
/// state"), guarded by a mutex held only during the swap.
struct TableState {
    pk_columns: Vec<String>,
    rows: SyncMutex<IndexMap<String, Row>>,
}

fn row_key(row: &Row, pk_columns: &[String]) -> String {
    pk_columns
        .iter()
        .map(|col| row.get(col).map(|v| v.key_fragment()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(":")
}

/// One emitted event plus the ordering-significant key it was derived
/// from, so tests can assert per-key causal order (§8).
#[derive(Debug, Clone)]
pub struct DiffEvent {
    pub key: String,
    pub event: CdcEvent,
}

/// Implements the soundness property from §8: the emitted set is exactly
/// `{Delete k | k in old\new} u {Insert k | k in new\old} u {Update k | k
/// in old n new and old[k] != new[k]}`.
fn diff_snapshots(schema_name: &str, table_name: &str, old: &IndexMap<String, Row>, new: &IndexMap<String, Row>, now: chrono::DateTime<chrono::Utc>) -> Vec<DiffEvent> {
    let mut events = Vec::new();
    for (key, old_row) in old {
        match new.get(key) {
            None => events.push(DiffEvent {
                key: key.clone(),
                event: CdcEvent::delete(schema_name, table_name, old_row.clone(), now),
            }),
            Some(new_row) => {
                if new_row != old_row {
                    events.push(DiffEvent {
                        key: key.clone(),
                        event: CdcEvent::update(schema_name, table_name, old_row.clone(), new_row.clone(), now),
                    });
                }
            }
        }
    }
    for (key, new_row) in new {
        if !old.contains_key(key) {
            events.push(DiffEvent {
                key: key.clone(),
                event: CdcEvent::insert(schema_name, table_name, new_row.clone(), now),
            });
        }
    }
    events
}

struct Worker {
    handle: JoinHandle<()>,
}

/// A `ReplicationSource` backed entirely by periodic snapshot comparison.
/// `get_position` always returns the empty string: there is no resumable
/// position, the snapshot on startup is the baseline (§4.5, §4.5.2).
pub struct PollingDiffSource {
    backend: BackendId,
    schema_name: String,
    tables: Vec<String>,
    source: Arc<dyn PollingSnapshotSource>,
    tick_interval: Duration,
    table_states: SyncMutex<HashMap<String, Arc<TableState>>>,
    started: AtomicBool,
    stop_token: CancellationToken,
    workers: AsyncMutex<Vec<Worker>>,
    checkpoint_fn: SyncMutex<Option<CheckpointFn>>,
}

impl PollingDiffSource {
    pub fn new(backend: BackendId, schema_name: impl Into<String>, tables: Vec<String>, source: Arc<dyn PollingSnapshotSource>, tick_interval: Duration) -> Arc<Self> {
        Arc::new(PollingDiffSource {
            backend,
            schema_name: schema_name.into(),
            tables,
            source,
            tick_interval,
            table_states: SyncMutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            stop_token: CancellationToken::new(),
            workers: AsyncMutex::new(Vec::new()),
            checkpoint_fn: SyncMutex::new(None),
        })
    }

    async fn run_table(self: Arc<Self>, table: String, handler: Arc<dyn CdcHandler>) {
        let ctx = CallContext::for_test(CallTarget::Database(table.clone()));

        // Startup (§4.5.2): learn the primary key, take the baseline
        // snapshot. The baseline emits no events.
        let pk_columns = match self.source.primary_key_columns(&ctx, &table).await {
            Ok(cols) => cols,
            Err(err) => {
                warn!(%table, error = %err, "polling-diff: failed to load primary key, worker exiting");
                return;
            }
        };
        let baseline = match self.source.fetch_snapshot(&ctx, &table).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%table, error = %err, "polling-diff: failed initial snapshot, worker exiting");
                return;
            }
        };
        let mut snapshot: IndexMap<String, Row> = IndexMap::new();
        for row in baseline {
            snapshot.insert(row_key(&row, &pk_columns), row);
        }
        let state = Arc::new(TableState {
            pk_columns: pk_columns.clone(),
            rows: SyncMutex::new(snapshot),
        });
        self.table_states.lock().insert(table.clone(), state.clone());

        loop {
            // Every tick checks the stop channel before the fetch (§4.5.2
            // "Cancellation").
            if self.stop_token.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.stop_token.cancelled() => break,
                _ = tokio::time::sleep(self.tick_interval) => {}
            }
            // ...and after, before acting on what may be a stale fetch.
            if self.stop_token.is_cancelled() {
                break;
            }

            let current = match self.source.fetch_snapshot(&ctx, &table).await {
                Ok(rows) => rows,
                Err(err) => {
                    // Transient polling failures: log and continue (§7).
                    warn!(%table, error = %err, "polling-diff: tick fetch failed, will retry next tick");
                    continue;
                }
            };
            let mut new_snapshot: IndexMap<String, Row> = IndexMap::new();
            for row in current {
                new_snapshot.insert(row_key(&row, &pk_columns), row);
            }

            let now = chrono::Utc::now();
            let diff = {
                let mut guard = state.rows.lock();
                let events = diff_snapshots(&self.schema_name, &table, &guard, &new_snapshot, now);
                *guard = new_snapshot;
                events
            };

            for diff_event in diff {
                if let Err(err) = handler.handle(diff_event.event).await {
                    warn!(%table, key = %diff_event.key, error = %err, "polling-diff: handler returned an error, continuing");
                }
            }
        }
    }
}

#[async_trait]
impl ReplicationSource for PollingDiffSource {
    async fn start(self: Arc<Self>, handler: Arc<dyn CdcHandler>) -> AnchorResult<()> {
        if self.started.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(AnchorError::invalid_data(
                self.backend,
                "replication_start",
                "source is already started",
            ));
        }

        let mut workers = self.workers.lock().await;
        for table in &self.tables {
            let this = self.clone();
            let table = table.clone();
            let handler = handler.clone();
            workers.push(Worker {
                handle: tokio::spawn(this.run_table(table, handler)),
            });
        }
        info!(backend = %self.backend, tables = self.tables.len(), "polling-diff source started");
        Ok(())
    }

    async fn stop(&self) -> AnchorResult<()> {
        self.stop_token.cancel();
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            let _ = worker.handle.await;
        }
        Ok(())
    }

    async fn close(&self) -> AnchorResult<()> {
        if self.started.load(Ordering::Acquire) {
            self.stop().await?;
        }
        Ok(())
    }

    fn get_position(&self) -> String {
        String::new()
    }

    fn set_position(&self, _position: String) {
        // No-op: polling sources have no resumable position (§4.5).
    }

    async fn save_checkpoint(&self, _ctx: &CallContext, _position: String) -> AnchorResult<()> {
        Ok(())
    }

    fn set_checkpoint_func(&self, f: CheckpointFn) {
        *self.checkpoint_fn.lock() = Some(f);
    }

    fn get_status(&self) -> ReplicationStatus {
        ReplicationStatus {
            active: self.started.load(Ordering::Acquire) && !self.stop_token.is_cancelled(),
            mechanism: "polling".to_string(),
            position: String::new(),
        }
    }

    fn get_lag(&self) -> ReplicationLag {
        ReplicationLag { millis: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_cdc_event;
    use crate::testing::{FakeSnapshotSource, RecordingCdcHandler};
    use anchor_connector::{CallTarget, DataOperator};
    use anchor_types::{CdcOperation, PortableValue};

    fn row(id: i64, v: &str) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), PortableValue::Int(id));
        r.insert("v".into(), PortableValue::String(v.to_string()));
        r
    }

    #[tokio::test]
    async fn insert_update_delete_round_trip_emits_exactly_three_events_in_order() {
        let source = FakeSnapshotSource::new(vec!["id".into()]);
        let driver = PollingDiffSource::new(
            BackendId::Cassandra,
            "ks1",
            vec!["t".into()],
            Arc::new(source.clone()),
            Duration::from_millis(20),
        );
        let handler = Arc::new(RecordingCdcHandler::new());
        driver.clone().start(handler.clone()).await.unwrap();

        // Baseline tick with an empty table: no events.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(handler.events().len(), 0);

        source.set_row("t", "1", row(1, "a"));
        tokio::time::sleep(Duration::from_millis(60)).await;

        source.set_row("t", "1", row(1, "b"));
        tokio::time::sleep(Duration::from_millis(60)).await;

        source.remove_row("t", "1");
        tokio::time::sleep(Duration::from_millis(60)).await;

        driver.stop().await.unwrap();

        let events = handler.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].operation, CdcOperation::Insert);
        assert_eq!(events[1].operation, CdcOperation::Update);
        assert!(events[1].old_data.is_some());
        assert_eq!(events[2].operation, CdcOperation::Delete);
        assert!(events[2].old_data.is_some());
    }

    #[tokio::test]
    async fn replaying_events_reproduces_final_snapshot() {
        let source = FakeSnapshotSource::new(vec!["id".into()]);
        let driver = PollingDiffSource::new(
            BackendId::Cassandra,
            "ks1",
            vec!["t".into()],
            Arc::new(source.clone()),
            Duration::from_millis(20),
        );
        let handler = Arc::new(RecordingCdcHandler::new());
        driver.clone().start(handler.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        source.set_row("t", "1", row(1, "a"));
        source.set_row("t", "2", row(2, "x"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        source.set_row("t", "1", row(1, "b"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        source.remove_row("t", "2");
        tokio::time::sleep(Duration::from_millis(60)).await;
        driver.stop().await.unwrap();

        let target = crate::testing::FakeDataOperator::new();
        let ctx = CallContext::for_test(CallTarget::Database("t".into()));
        for event in handler.events() {
            apply_cdc_event(&ctx, BackendId::Cassandra, &target, "t", &event, None)
                .await
                .unwrap();
        }

        let rows = target.fetch(&ctx, "t", None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("v"), Some(&PortableValue::String("b".to_string())));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let source = FakeSnapshotSource::new(vec!["id".into()]);
        let driver = PollingDiffSource::new(BackendId::Cassandra, "ks1", vec!["t".into()], Arc::new(source), Duration::from_millis(20));
        let handler = Arc::new(RecordingCdcHandler::new());
        driver.clone().start(handler.clone()).await.unwrap();
        let err = driver.clone().start(handler).await.unwrap_err();
        assert!(matches!(err, AnchorError::InvalidData { .. }));
        driver.stop().await.unwrap();
    }
}
