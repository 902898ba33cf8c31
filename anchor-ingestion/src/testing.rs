//! In-memory fakes shared by the test modules in this crate. Grounded on
//! the teacher's `dozer-ingestion-connector::test_util` pattern of small,
//! dependency-free stand-ins for adapter traits rather than mocking
//! frameworks.

use std::sync::Arc;

use anchor_connector::{
    Adapter, CallContext, CdcHandler, ConnectedFlag, DatabaseConnection, InstanceConnection, MetadataOperator,
    ReplicationLag, ReplicationOperator, ReplicationSource, ReplicationStatus, SchemaOperator, StreamParams,
    StreamResult,
};
use anchor_connector::DataOperator;
use anchor_types::{
    AnchorError, AnchorResult, BackendId, CdcEvent, ConnectionConfig, InstanceConfig, PortableValue, Row, Table,
    UnifiedModel,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex as SyncMutex;
use std::collections::BTreeMap;

use crate::cdc::polling::PollingSnapshotSource;

/// Collects handled events in order, for assertions against §8's concrete
/// scenarios.
#[derive(Default)]
pub struct RecordingCdcHandler {
    events: SyncMutex<Vec<CdcEvent>>,
}

impl RecordingCdcHandler {
    pub fn new() -> Self {
        RecordingCdcHandler::default()
    }

    pub fn events(&self) -> Vec<CdcEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl CdcHandler for RecordingCdcHandler {
    async fn handle(&self, event: CdcEvent) -> AnchorResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// A `PollingSnapshotSource` test double: tables are plain
/// `row_key -> row` maps a test can mutate between ticks with `set_row`/
/// `remove_row`. Clones share the underlying state, so a test can hand one
/// clone to the driver and keep driving the other.
#[derive(Clone)]
pub struct FakeSnapshotSource {
    pk_columns: Vec<String>,
    tables: Arc<SyncMutex<IndexMap<String, IndexMap<String, Row>>>>,
}

impl FakeSnapshotSource {
    pub fn new(pk_columns: Vec<String>) -> Self {
        FakeSnapshotSource {
            pk_columns,
            tables: Arc::new(SyncMutex::new(IndexMap::new())),
        }
    }

    pub fn set_row(&self, table: &str, key: &str, row: Row) {
        self.tables.lock().entry(table.to_string()).or_default().insert(key.to_string(), row);
    }

    pub fn remove_row(&self, table: &str, key: &str) {
        if let Some(rows) = self.tables.lock().get_mut(table) {
            rows.shift_remove(key);
        }
    }
}

#[async_trait]
impl PollingSnapshotSource for FakeSnapshotSource {
    async fn primary_key_columns(&self, _ctx: &CallContext, _table: &str) -> AnchorResult<Vec<String>> {
        Ok(self.pk_columns.clone())
    }

    async fn fetch_snapshot(&self, _ctx: &CallContext, table: &str) -> AnchorResult<Vec<Row>> {
        Ok(self.tables.lock().get(table).map(|rows| rows.values().cloned().collect()).unwrap_or_default())
    }
}

/// A minimal in-memory `DataOperator`: one `Vec<Row>` per table, matched by
/// column equality rather than a real query planner. Enough to exercise
/// the apply path (§4.6) and the polling-diff replay property (§8).
#[derive(Default)]
pub struct FakeDataOperator {
    tables: SyncMutex<IndexMap<String, Vec<Row>>>,
}

impl FakeDataOperator {
    pub fn new() -> Self {
        FakeDataOperator::default()
    }
}

fn row_matches(row: &Row, predicate: &Row) -> bool {
    predicate.iter().all(|(column, value)| row.get(column) == Some(value))
}

#[async_trait]
impl DataOperator for FakeDataOperator {
    async fn fetch(&self, _ctx: &CallContext, table: &str, limit: Option<u64>) -> AnchorResult<Vec<Row>> {
        let rows = self.tables.lock().get(table).cloned().unwrap_or_default();
        Ok(match limit {
            Some(n) => rows.into_iter().take(n as usize).collect(),
            None => rows,
        })
    }

    async fn fetch_with_columns(&self, ctx: &CallContext, table: &str, columns: &[String], limit: Option<u64>) -> AnchorResult<Vec<Row>> {
        let rows = self.fetch(ctx, table, limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| columns.iter().filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone()))).collect())
            .collect())
    }

    async fn insert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>) -> AnchorResult<u64> {
        let n = rows.len() as u64;
        self.tables.lock().entry(table.to_string()).or_default().extend(rows);
        Ok(n)
    }

    async fn update(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, where_columns: &[String]) -> AnchorResult<u64> {
        let mut guard = self.tables.lock();
        let stored = guard.entry(table.to_string()).or_default();
        let mut updated = 0u64;
        for new_row in rows {
            let predicate: Row = where_columns.iter().filter_map(|c| new_row.get(c).map(|v| (c.clone(), v.clone()))).collect();
            if let Some(slot) = stored.iter_mut().find(|existing| row_matches(existing, &predicate)) {
                *slot = new_row;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn upsert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, unique_columns: &[String]) -> AnchorResult<u64> {
        let mut guard = self.tables.lock();
        let stored = guard.entry(table.to_string()).or_default();
        let mut n = 0u64;
        for new_row in rows {
            let predicate: Row = unique_columns.iter().filter_map(|c| new_row.get(c).map(|v| (c.clone(), v.clone()))).collect();
            match stored.iter_mut().find(|existing| row_matches(existing, &predicate)) {
                Some(slot) => *slot = new_row,
                None => stored.push(new_row),
            }
            n += 1;
        }
        Ok(n)
    }

    async fn delete(&self, _ctx: &CallContext, table: &str, where_: &Row) -> AnchorResult<u64> {
        let mut guard = self.tables.lock();
        let Some(stored) = guard.get_mut(table) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|row| !row_matches(row, where_));
        Ok((before - stored.len()) as u64)
    }

    async fn stream(&self, ctx: &CallContext, params: StreamParams) -> AnchorResult<StreamResult> {
        let limit = if params.batch_size == 0 { None } else { Some(params.batch_size) };
        let data = self.fetch(ctx, &params.table, limit).await?;
        Ok(StreamResult {
            data,
            has_more: false,
            next_cursor: None,
        })
    }

    async fn execute_query(&self, _ctx: &CallContext, _query: &str, _args: &[PortableValue]) -> AnchorResult<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn execute_count_query(&self, _ctx: &CallContext, _query: &str) -> AnchorResult<i64> {
        Ok(0)
    }

    async fn get_row_count(&self, _ctx: &CallContext, table: &str, _where_clause: Option<&str>) -> AnchorResult<(i64, bool)> {
        let count = self.tables.lock().get(table).map(|rows| rows.len()).unwrap_or(0);
        Ok((count as i64, true))
    }

    async fn wipe(&self, _ctx: &CallContext, table: &str) -> AnchorResult<()> {
        self.tables.lock().shift_remove(table);
        Ok(())
    }
}

struct FakeSchemaOperator;

#[async_trait]
impl SchemaOperator for FakeSchemaOperator {
    async fn discover(&self, _ctx: &CallContext) -> AnchorResult<UnifiedModel> {
        Ok(UnifiedModel::new())
    }

    async fn create_structure(&self, _ctx: &CallContext, _model: &UnifiedModel) -> AnchorResult<()> {
        Ok(())
    }

    async fn list_tables(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_table_schema(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<Option<Table>> {
        Ok(None)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{name}\"")
    }
}

struct FakeMetadataOperator;

#[async_trait]
impl MetadataOperator for FakeMetadataOperator {
    async fn collect_database_metadata(&self) -> AnchorResult<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    async fn collect_instance_metadata(&self) -> AnchorResult<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    async fn get_version(&self) -> AnchorResult<String> {
        Ok("fake-1.0".to_string())
    }

    async fn get_unique_identifier(&self) -> AnchorResult<String> {
        Ok("fake".to_string())
    }

    async fn get_database_size(&self) -> AnchorResult<u64> {
        Ok(0)
    }

    async fn get_table_count(&self) -> AnchorResult<u64> {
        Ok(0)
    }

    async fn execute_command(&self, _command: &str) -> AnchorResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

struct FakeReplicationOperator {
    backend: BackendId,
}

#[async_trait]
impl ReplicationOperator for FakeReplicationOperator {
    fn is_supported(&self) -> bool {
        false
    }

    fn supported_mechanisms(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn check_prerequisites(&self, _ctx: &CallContext) -> AnchorResult<()> {
        Ok(())
    }

    async fn connect(&self, _ctx: &CallContext, _config: anchor_types::ReplicationConfig) -> AnchorResult<Arc<dyn ReplicationSource>> {
        Err(AnchorError::unsupported(self.backend, "replication_connect", "fake adapter has no replication source"))
    }

    async fn list_slots(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn drop_slot(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Ok(())
    }

    async fn list_publications(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn drop_publication(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Ok(())
    }
}

/// A `DatabaseConnection` backed entirely by the fakes above, enough to
/// exercise the Connection Registry (§4.2, §8 "Registry idempotence")
/// without a real driver.
pub struct FakeDatabaseConnection {
    id: String,
    backend: BackendId,
    connected: ConnectedFlag,
    data: FakeDataOperator,
    schema: FakeSchemaOperator,
    metadata: FakeMetadataOperator,
    replication: FakeReplicationOperator,
}

#[async_trait]
impl DatabaseConnection for FakeDatabaseConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        self.backend
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn ping(&self, _ctx: &CallContext) -> AnchorResult<()> {
        Ok(())
    }

    async fn close(&self) -> AnchorResult<()> {
        self.connected.close();
        Ok(())
    }

    fn schema_operations(&self) -> &dyn SchemaOperator {
        &self.schema
    }

    fn data_operations(&self) -> &dyn DataOperator {
        &self.data
    }

    fn replication_operations(&self) -> &dyn ReplicationOperator {
        &self.replication
    }

    fn metadata_operations(&self) -> &dyn MetadataOperator {
        &self.metadata
    }
}

pub struct FakeInstanceConnection {
    id: String,
    backend: BackendId,
    connected: ConnectedFlag,
    metadata: FakeMetadataOperator,
}

#[async_trait]
impl InstanceConnection for FakeInstanceConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        self.backend
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn close(&self) -> AnchorResult<()> {
        self.connected.close();
        Ok(())
    }

    async fn list_databases(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn create_database(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Ok(())
    }

    async fn drop_database(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Ok(())
    }

    fn metadata_operations(&self) -> &dyn MetadataOperator {
        &self.metadata
    }
}

/// An `Adapter` that hands out `FakeDatabaseConnection`/
/// `FakeInstanceConnection` instead of opening a real session.
pub struct FakeAdapter {
    backend: BackendId,
}

impl FakeAdapter {
    pub fn new(backend: BackendId) -> Self {
        FakeAdapter { backend }
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn backend(&self) -> BackendId {
        self.backend
    }

    async fn connect(&self, _ctx: &CallContext, config: ConnectionConfig) -> AnchorResult<Arc<dyn DatabaseConnection>> {
        Ok(Arc::new(FakeDatabaseConnection {
            id: config.database_id,
            backend: self.backend,
            connected: ConnectedFlag::default(),
            data: FakeDataOperator::new(),
            schema: FakeSchemaOperator,
            metadata: FakeMetadataOperator,
            replication: FakeReplicationOperator { backend: self.backend },
        }))
    }

    async fn connect_instance(&self, _ctx: &CallContext, config: InstanceConfig) -> AnchorResult<Arc<dyn InstanceConnection>> {
        Ok(Arc::new(FakeInstanceConnection {
            id: config.instance_id,
            backend: self.backend,
            connected: ConnectedFlag::default(),
            metadata: FakeMetadataOperator,
        }))
    }
}

/// An in-memory `ConfigStore` (§4.3), used by the config watcher tests.
#[derive(Default)]
pub struct FakeConfigStore {
    databases: SyncMutex<IndexMap<String, ConnectionConfig>>,
    instances: SyncMutex<IndexMap<String, InstanceConfig>>,
    database_metadata: SyncMutex<IndexMap<String, BTreeMap<String, String>>>,
    instance_metadata: SyncMutex<IndexMap<String, BTreeMap<String, String>>>,
    database_status: SyncMutex<IndexMap<String, String>>,
    instance_status: SyncMutex<IndexMap<String, String>>,
}

impl FakeConfigStore {
    pub fn new() -> Self {
        FakeConfigStore::default()
    }

    pub fn add_database(&self, config: ConnectionConfig) {
        self.databases.lock().insert(config.database_id.clone(), config);
    }

    pub fn add_instance(&self, config: InstanceConfig) {
        self.instances.lock().insert(config.instance_id.clone(), config);
    }

    pub fn remove_database(&self, database_id: &str) {
        self.databases.lock().shift_remove(database_id);
    }

    pub fn database_status(&self, database_id: &str) -> Option<String> {
        self.database_status.lock().get(database_id).cloned()
    }

    pub fn instance_status(&self, instance_id: &str) -> Option<String> {
        self.instance_status.lock().get(instance_id).cloned()
    }
}

#[async_trait]
impl crate::watcher::ConfigStore for FakeConfigStore {
    async fn list_enabled_databases(&self) -> AnchorResult<Vec<ConnectionConfig>> {
        Ok(self.databases.lock().values().cloned().collect())
    }

    async fn list_enabled_instances(&self) -> AnchorResult<Vec<InstanceConfig>> {
        Ok(self.instances.lock().values().cloned().collect())
    }

    async fn get_database_config(&self, database_id: &str) -> AnchorResult<Option<ConnectionConfig>> {
        Ok(self.databases.lock().get(database_id).cloned())
    }

    async fn get_instance_config(&self, instance_id: &str) -> AnchorResult<Option<InstanceConfig>> {
        Ok(self.instances.lock().get(instance_id).cloned())
    }

    async fn upsert_database_status(&self, database_id: &str, status: &str) -> AnchorResult<()> {
        self.database_status.lock().insert(database_id.to_string(), status.to_string());
        Ok(())
    }

    async fn upsert_instance_status(&self, instance_id: &str, status: &str) -> AnchorResult<()> {
        self.instance_status.lock().insert(instance_id.to_string(), status.to_string());
        Ok(())
    }

    async fn upsert_database_metadata(&self, database_id: &str, metadata: BTreeMap<String, String>) -> AnchorResult<()> {
        self.database_metadata.lock().insert(database_id.to_string(), metadata);
        Ok(())
    }

    async fn upsert_instance_metadata(&self, instance_id: &str, metadata: BTreeMap<String, String>) -> AnchorResult<()> {
        self.instance_metadata.lock().insert(instance_id.to_string(), metadata);
        Ok(())
    }
}
