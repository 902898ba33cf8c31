//! The Replication operator facet for MySQL (§4.5). The capability
//! registry marks MySQL `native_cdc: true` (binlog row-based replication
//! exists as a protocol), but this build does not ship a binlog driver —
//! every source runs through the shared polling-diff driver instead,
//! the same as a backend with no native mechanism at all. See the design
//! notes for why the native path was left out of this build's scope.

use std::sync::Arc;

use anchor_connector::{CallContext, DataOperator, ReplicationOperator, ReplicationSource, SchemaOperator};
use anchor_ingestion::cdc::{PollingDiffSource, PollingSnapshotSource, DEFAULT_POLL_INTERVAL};
use anchor_types::{AnchorError, AnchorResult, BackendId, ReplicationConfig, Row};
use async_trait::async_trait;

use crate::data::MysqlDataOperator;
use crate::schema::MysqlSchemaOperator;

pub struct MysqlReplicationOperator {
    schema: Arc<MysqlSchemaOperator>,
    data: Arc<MysqlDataOperator>,
}

impl MysqlReplicationOperator {
    pub fn new(schema: Arc<MysqlSchemaOperator>, data: Arc<MysqlDataOperator>) -> Self {
        MysqlReplicationOperator { schema, data }
    }
}

struct MysqlSnapshotSource {
    schema: Arc<MysqlSchemaOperator>,
    data: Arc<MysqlDataOperator>,
}

#[async_trait]
impl PollingSnapshotSource for MysqlSnapshotSource {
    async fn primary_key_columns(&self, ctx: &CallContext, table: &str) -> AnchorResult<Vec<String>> {
        let schema = self.schema.get_table_schema(ctx, table).await?.ok_or_else(|| AnchorError::not_found(BackendId::MySql, "table", table))?;
        let columns: Vec<String> = schema.columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect();
        if columns.is_empty() {
            return Err(AnchorError::invalid_data(BackendId::MySql, "primary_key_columns", format!("table {table} has no primary key")));
        }
        Ok(columns)
    }

    async fn fetch_snapshot(&self, ctx: &CallContext, table: &str) -> AnchorResult<Vec<Row>> {
        self.data.fetch(ctx, table, None).await
    }
}

#[async_trait]
impl ReplicationOperator for MysqlReplicationOperator {
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
        let snapshot_source = Arc::new(MysqlSnapshotSource {
            schema: self.schema.clone(),
            data: self.data.clone(),
        });
        let tick_interval = config.poll_interval_ms.map(std::time::Duration::from_millis).unwrap_or(DEFAULT_POLL_INTERVAL);
        Ok(PollingDiffSource::new(BackendId::MySql, config.source_id, config.tables, snapshot_source, tick_interval))
    }

    async fn list_slots(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Err(AnchorError::unsupported(BackendId::MySql, "list_slots", "this build has no binlog driver; there is no slot to list"))
    }

    async fn drop_slot(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Err(AnchorError::unsupported(BackendId::MySql, "drop_slot", "this build has no binlog driver; there is no slot to drop"))
    }

    async fn list_publications(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        Err(AnchorError::unsupported(BackendId::MySql, "list_publications", "MySQL has no publication concept; it is a Postgres-family notion"))
    }

    async fn drop_publication(&self, _ctx: &CallContext, _name: &str) -> AnchorResult<()> {
        Err(AnchorError::unsupported(BackendId::MySql, "drop_publication", "MySQL has no publication concept; it is a Postgres-family notion"))
    }
}
