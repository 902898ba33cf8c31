use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anchor_types::{AnchorResult, BackendId, CapabilitySet, ConnectionConfig, InstanceConfig};
use async_trait::async_trait;

use crate::context::CallContext;
use crate::data::DataOperator;
use crate::metadata::MetadataOperator;
use crate::replication::ReplicationOperator;
use crate::schema::SchemaOperator;

/// A database-scoped session (§3 "Connection entities"). `connected_flag`
/// may only transition 1->0; a subsequent open creates a new entity
/// (enforced here with an `AtomicBool` rather than a richer state machine,
/// matching the spec's "atomic 0/1").
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    fn id(&self) -> &str;

    fn backend(&self) -> BackendId;

    fn is_connected(&self) -> bool;

    async fn ping(&self, ctx: &CallContext) -> AnchorResult<()>;

    /// Idempotent: closing an already-closed connection returns `Ok(())`
    /// (§8 "Registry idempotence").
    async fn close(&self) -> AnchorResult<()>;

    fn schema_operations(&self) -> &dyn SchemaOperator;

    fn data_operations(&self) -> &dyn DataOperator;

    fn replication_operations(&self) -> &dyn ReplicationOperator;

    fn metadata_operations(&self) -> &dyn MetadataOperator;
}

/// A server-scoped session with no default database bound (§3).
#[async_trait]
pub trait InstanceConnection: Send + Sync {
    fn id(&self) -> &str;

    fn backend(&self) -> BackendId;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> AnchorResult<()>;

    async fn list_databases(&self, ctx: &CallContext) -> AnchorResult<Vec<String>>;

    async fn create_database(&self, ctx: &CallContext, name: &str) -> AnchorResult<()>;

    async fn drop_database(&self, ctx: &CallContext, name: &str) -> AnchorResult<()>;

    fn metadata_operations(&self) -> &dyn MetadataOperator;
}

/// Every backend implements this (C3/C4). `connect`/`connect_instance` are
/// the only entry points the Connection Registry (C5) calls.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn backend(&self) -> BackendId;

    fn capabilities(&self) -> &'static CapabilitySet {
        CapabilitySet::for_backend(self.backend())
    }

    async fn connect(&self, ctx: &CallContext, config: ConnectionConfig) -> AnchorResult<Arc<dyn DatabaseConnection>>;

    async fn connect_instance(&self, ctx: &CallContext, config: InstanceConfig) -> AnchorResult<Arc<dyn InstanceConnection>>;
}

/// Helper state every concrete `DatabaseConnection`/`InstanceConnection`
/// embeds for the `connected_flag` (§3, §5 "`connected_flag` is atomic").
#[derive(Debug)]
pub struct ConnectedFlag(AtomicBool);

impl Default for ConnectedFlag {
    fn default() -> Self {
        ConnectedFlag(AtomicBool::new(true))
    }
}

impl ConnectedFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Attempts the 1->0 transition. Returns `true` if this call performed
    /// the transition (i.e. this caller owns the close), `false` if a
    /// racing caller already closed it (§4.2 "Close is serialized via the
    /// flag's compare-and-set").
    pub fn close(&self) -> bool {
        self.0
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
