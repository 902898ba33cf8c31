//! The Metadata operator facet (§4.1) against `pg_catalog`/
//! `pg_stat_database`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anchor_connector::MetadataOperator;
use anchor_types::{AnchorError, AnchorResult, BackendId};
use async_trait::async_trait;

pub struct PostgresMetadataOperator {
    client: Arc<tokio_postgres::Client>,
}

impl PostgresMetadataOperator {
    pub fn new(client: Arc<tokio_postgres::Client>) -> Self {
        PostgresMetadataOperator { client }
    }
}

fn wrap(operation: &'static str, err: tokio_postgres::Error) -> AnchorError {
    AnchorError::wrapped(BackendId::Postgres, operation, err)
}

#[async_trait]
impl MetadataOperator for PostgresMetadataOperator {
    async fn collect_database_metadata(&self) -> AnchorResult<BTreeMap<String, String>> {
        let mut metadata = BTreeMap::new();
        metadata.insert("version".to_string(), self.get_version().await?);
        metadata.insert("size_bytes".to_string(), self.get_database_size().await?.to_string());
        metadata.insert("table_count".to_string(), self.get_table_count().await?.to_string());
        metadata.insert("unique_identifier".to_string(), self.get_unique_identifier().await?);
        Ok(metadata)
    }

    async fn collect_instance_metadata(&self) -> AnchorResult<BTreeMap<String, String>> {
        let mut metadata = BTreeMap::new();
        metadata.insert("version".to_string(), self.get_version().await?);
        let row = self
            .client
            .query_one("SELECT count(*) FROM pg_database WHERE datistemplate = false", &[])
            .await
            .map_err(|e| wrap("collect_instance_metadata", e))?;
        let database_count: i64 = row.get(0);
        metadata.insert("database_count".to_string(), database_count.to_string());
        Ok(metadata)
    }

    async fn get_version(&self) -> AnchorResult<String> {
        let row = self.client.query_one("SHOW server_version", &[]).await.map_err(|e| wrap("get_version", e))?;
        Ok(row.get(0))
    }

    async fn get_unique_identifier(&self) -> AnchorResult<String> {
        let row = self
            .client
            .query_one("SELECT system_identifier::text FROM pg_control_system()", &[])
            .await
            .map_err(|e| wrap("get_unique_identifier", e))?;
        Ok(row.get(0))
    }

    async fn get_database_size(&self) -> AnchorResult<u64> {
        let row = self
            .client
            .query_one("SELECT pg_database_size(current_database())", &[])
            .await
            .map_err(|e| wrap("get_database_size", e))?;
        let size: i64 = row.get(0);
        Ok(size.max(0) as u64)
    }

    async fn get_table_count(&self) -> AnchorResult<u64> {
        let row = self
            .client
            .query_one(
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema')",
                &[],
            )
            .await
            .map_err(|e| wrap("get_table_count", e))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn execute_command(&self, command: &str) -> AnchorResult<Vec<u8>> {
        let rows = self.client.simple_query(command).await.map_err(|e| wrap("execute_command", e))?;
        let mut out = Vec::new();
        for message in rows {
            if let tokio_postgres::SimpleQueryMessage::Row(row) = message {
                for i in 0..row.len() {
                    if let Some(value) = row.get(i) {
                        out.extend_from_slice(value.as_bytes());
                        out.push(b'\t');
                    }
                }
                out.push(b'\n');
            }
        }
        Ok(out)
    }
}
