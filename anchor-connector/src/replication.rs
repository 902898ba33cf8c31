//! The Replication operator facet (§4.5) and the `ReplicationSource`
//! lifecycle (`Start -> Running -> Stop -> Close`). Two families of
//! implementation share this contract: native log/changefeed drivers
//! (§4.5.1) and the polling-diff driver (§4.5.2), chosen at `connect`
//! time based on capability + config (§9 "Pluggable replication").

use std::sync::Arc;

use anchor_types::{AnchorResult, CdcEvent, ReplicationConfig};
use async_trait::async_trait;

use crate::context::CallContext;

/// Invoked synchronously on the poller/driver task for every event — the
/// backpressure mechanism described in §4.5.2: a slow handler delays the
/// next tick rather than growing an internal queue.
#[async_trait]
pub trait CdcHandler: Send + Sync {
    async fn handle(&self, event: CdcEvent) -> AnchorResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationStatus {
    pub active: bool,
    pub mechanism: String,
    pub position: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationLag {
    /// `None` when the backend gives no basis for a lag estimate (§9: a
    /// CockroachDB source with no events has no watermark to lag against).
    pub millis: Option<i64>,
}

pub type CheckpointFn = Arc<dyn Fn(&str) + Send + Sync>;

/// A connected-but-not-yet-streaming replication source (§3 "Ownership":
/// owned by the caller of `replication.connect`, with a stop lifecycle
/// independent of the underlying `DatabaseConnection`).
#[async_trait]
pub trait ReplicationSource: Send + Sync {
    /// Begins streaming and invoking `handler` for each event. Calling
    /// `start` twice on an already-started source is an error (§4.5).
    /// Takes `self: Arc<Self>` because per-table/per-partition worker
    /// tasks must outlive this call and need a clonable owner.
    async fn start(self: Arc<Self>, handler: Arc<dyn CdcHandler>) -> AnchorResult<()>;

    /// Closes the internal stop channel and waits for worker tasks to
    /// drain; synchronous — returns only once every worker has exited
    /// (§4.5, §5).
    async fn stop(&self) -> AnchorResult<()>;

    /// Safe to call in any state. If the source is active, triggers
    /// `stop` first (§4.5).
    async fn close(&self) -> AnchorResult<()>;

    fn get_position(&self) -> String;

    fn set_position(&self, position: String);

    async fn save_checkpoint(&self, ctx: &CallContext, position: String) -> AnchorResult<()>;

    fn set_checkpoint_func(&self, f: CheckpointFn);

    fn get_status(&self) -> ReplicationStatus;

    fn get_lag(&self) -> ReplicationLag;
}

/// The Replication operator facet of the Adapter Contract (§4.1, §4.5).
#[async_trait]
pub trait ReplicationOperator: Send + Sync {
    fn is_supported(&self) -> bool;

    fn supported_mechanisms(&self) -> Vec<&'static str>;

    async fn check_prerequisites(&self, ctx: &CallContext) -> AnchorResult<()>;

    /// Opens the source but does not start streaming.
    async fn connect(&self, ctx: &CallContext, config: ReplicationConfig) -> AnchorResult<Arc<dyn ReplicationSource>>;

    async fn list_slots(&self, ctx: &CallContext) -> AnchorResult<Vec<String>>;

    async fn drop_slot(&self, ctx: &CallContext, name: &str) -> AnchorResult<()>;

    async fn list_publications(&self, ctx: &CallContext) -> AnchorResult<Vec<String>>;

    async fn drop_publication(&self, ctx: &CallContext, name: &str) -> AnchorResult<()>;
}
