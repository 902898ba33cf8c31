//! The Metadata operator facet (§4.1) against `system.local`/`system.peers`
//! and `system_schema`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anchor_connector::MetadataOperator;
use anchor_types::{AnchorError, AnchorResult, BackendId};
use async_trait::async_trait;
use scylla::Session;

pub struct CassandraMetadataOperator {
    session: Arc<Session>,
}

impl CassandraMetadataOperator {
    pub fn new(session: Arc<Session>) -> Self {
        CassandraMetadataOperator { session }
    }
}

fn wrap(operation: &'static str, err: impl std::error::Error + Send + Sync + 'static) -> AnchorError {
    AnchorError::wrapped(BackendId::Cassandra, operation, err)
}

#[async_trait]
impl MetadataOperator for CassandraMetadataOperator {
    async fn collect_database_metadata(&self) -> AnchorResult<BTreeMap<String, String>> {
        let mut metadata = BTreeMap::new();
        metadata.insert("version".to_string(), self.get_version().await?);
        metadata.insert("table_count".to_string(), self.get_table_count().await?.to_string());
        metadata.insert("unique_identifier".to_string(), self.get_unique_identifier().await?);
        Ok(metadata)
    }

    async fn collect_instance_metadata(&self) -> AnchorResult<BTreeMap<String, String>> {
        let mut metadata = BTreeMap::new();
        metadata.insert("version".to_string(), self.get_version().await?);
        let result = self
            .session
            .query_unpaged("SELECT count(*) FROM system.peers", &[])
            .await
            .map_err(|e| wrap("collect_instance_metadata", e))?;
        let peers = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|v| v.as_bigint())
            .unwrap_or(0);
        metadata.insert("node_count".to_string(), (peers + 1).to_string());
        Ok(metadata)
    }

    async fn get_version(&self) -> AnchorResult<String> {
        let result = self
            .session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
            .map_err(|e| wrap("get_version", e))?;
        Ok(result
            .rows
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|v| v.as_text().cloned())
            .unwrap_or_default())
    }

    async fn get_unique_identifier(&self) -> AnchorResult<String> {
        let result = self
            .session
            .query_unpaged("SELECT cluster_name FROM system.local", &[])
            .await
            .map_err(|e| wrap("get_unique_identifier", e))?;
        Ok(result
            .rows
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|v| v.as_text().cloned())
            .unwrap_or_default())
    }

    async fn get_database_size(&self) -> AnchorResult<u64> {
        // Cassandra exposes no catalog-level keyspace size; only per-node
        // SSTable metrics via JMX, which this driver does not expose.
        Err(AnchorError::unsupported(BackendId::Cassandra, "get_database_size", "no catalog-level size statistic is exposed over CQL"))
    }

    async fn get_table_count(&self) -> AnchorResult<u64> {
        let result = self
            .session
            .query_unpaged("SELECT keyspace_name FROM system_schema.tables", &[])
            .await
            .map_err(|e| wrap("get_table_count", e))?;
        let count = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .filter(|row| {
                !row.columns[0]
                    .as_ref()
                    .and_then(|v| v.as_text())
                    .map(|name| name.starts_with("system"))
                    .unwrap_or(false)
            })
            .count();
        Ok(count as u64)
    }

    async fn execute_command(&self, command: &str) -> AnchorResult<Vec<u8>> {
        self.session.query_unpaged(command, &[]).await.map_err(|e| wrap("execute_command", e))?;
        Ok(Vec::new())
    }
}
