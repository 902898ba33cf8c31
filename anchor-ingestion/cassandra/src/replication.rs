//! The Replication operator facet for Cassandra (§4.5). Cassandra has no
//! native changefeed this driver speaks (CDC commitlog segments are a
//! per-node on-disk format, not a wire protocol `scylla` exposes), so
//! every source connects through the shared polling-diff driver
//! (§4.5.2, §9 `requires_polling_cdc`).

use std::sync::Arc;

use anchor_connector::{CallContext, DataOperator, ReplicationOperator, ReplicationSource, SchemaOperator};
use anchor_ingestion::cdc::{PollingDiffSource, PollingSnapshotSource, DEFAULT_POLL_INTERVAL};
use anchor_types::{AnchorError, AnchorResult, BackendId, ReplicationConfig, Row};
use async_trait::async_trait;

use crate::data::CassandraDataOperator;
use crate::schema::CassandraSchemaOperator;

pub struct CassandraReplicationOperator {
    schema: Arc<CassandraSchemaOperator>,
    data: Arc<CassandraDataOperator>,
}

impl CassandraReplicationOperator {
    pub fn new(schema: Arc<CassandraSchemaOperator>, data: Arc<CassandraDataOperator>) -> Self {
        CassandraReplicationOperator { schema, data }
    }
}

struct CassandraSnapshotSource {
    schema: Arc<CassandraSchemaOperator>,
    data: Arc<CassandraDataOperator>,
}

#[async_trait]
impl PollingSnapshotSource for CassandraSnapshotSource {
    async fn primary_key_columns(&self, ctx: &CallContext, table: &str) -> AnchorResult<Vec<String>> {
        let schema = self.schema.get_table_schema(ctx, table).await?.ok_or_else(|| AnchorError::not_found(BackendId::Cassandra, "table", table))?;
        let columns: Vec<String> = schema.columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect();
        if columns.is_empty() {
            return Err(AnchorError::invalid_data(BackendId::Cassandra, "primary_key_columns", format!("table {table} has no partition/clustering key")));
        }
        Ok(columns)
    }

    async fn fetch_snapshot(&self, ctx: &CallContext, table: &str) -> AnchorResult<Vec<Row>> {
        self.data.fetch(ctx, table, None).await
    }
}

#[async_trait]
impl ReplicationOperator for CassandraReplicationOperator {
    fn is_supported(&self) -> bool {
        true
    }

    fn supported_mechanisms(&self) -> Vec<&'static str> {
        vec!["polling"]
    }

    async fn check_prerequisites(&self, _ctx: &CallContext) -> AnchorResult<()> {
        Ok(())
    }

    async fn connect(&self, _ctx: &CallContext, config: ReplicationConfig) -> AnchorResult<Arc<dyn ReplicationSource>> {
        let snapshot_source = Arc::new(CassandraSnapshotSource {
            schema: self.schema.clone(),
            data: self.data.clone(),
        });
        let tick_interval = config.poll_interval_ms.map(std::time::Duration::from_millis).unwrap_or(DEFAULT_POLL_INTERVAL);
        Ok(PollingDiffSource::new(BackendId::Cassandra, config.source_id, config.tables, snapshot_source, tick_interval))
    }

    async fn list_slots(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Err(AnchorError::unsupported(BackendId::Cassandra, "list_slots", "Cassandra has no replication slot concept; it is a SQL-family notion"))
    }

    async fn drop_slot(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Err(AnchorError::unsupported(BackendId::Cassandra, "drop_slot", "Cassandra has no replication slot concept; it is a SQL-family notion"))
    }

    async fn list_publications(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Err(AnchorError::unsupported(BackendId::Cassandra, "list_publications", "Cassandra has no publication concept; it is a SQL-family notion"))
    }

    async fn drop_publication(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Err(AnchorError::unsupported(BackendId::Cassandra, "drop_publication", "Cassandra has no publication concept; it is a SQL-family notion"))
    }
}

