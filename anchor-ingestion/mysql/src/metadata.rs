//! The Metadata operator facet (§4.1) against `information_schema` and a
//! handful of `SHOW`/`@@` server variables.

use std::collections::BTreeMap;
use std::sync::Arc;

use anchor_connector::MetadataOperator;
use anchor_types::{AnchorError, AnchorResult, BackendId};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::Pool;

pub struct MysqlMetadataOperator {
    pool: Arc<Pool>,
    database: String,
}

impl MysqlMetadataOperator {
    pub fn new(pool: Arc<Pool>, database: String) -> Self {
        MysqlMetadataOperator { pool, database }
    }
}

fn wrap(operation: &'static str, err: mysql_async::Error) -> AnchorError {
    AnchorError::wrapped(BackendId::MySql, operation, err)
}

#[async_trait]
impl MetadataOperator for MysqlMetadataOperator {
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
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("collect_instance_metadata", e))?;
        let count: Option<i64> = conn
            .query_first("SELECT count(*) FROM information_schema.schemata")
            .await
            .map_err(|e| wrap("collect_instance_metadata", e))?;
        metadata.insert("database_count".to_string(), count.unwrap_or(0).to_string());
        Ok(metadata)
    }

    async fn get_version(&self) -> AnchorResult<String> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("get_version", e))?;
        let version: Option<String> = conn.query_first("SELECT VERSION()").await.map_err(|e| wrap("get_version", e))?;
        Ok(version.unwrap_or_default())
    }

    async fn get_unique_identifier(&self) -> AnchorResult<String> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("get_unique_identifier", e))?;
        let uuid: Option<String> = conn.query_first("SELECT @@server_uuid").await.map_err(|e| wrap("get_unique_identifier", e))?;
        Ok(uuid.unwrap_or_default())
    }

    async fn get_database_size(&self) -> AnchorResult<u64> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("get_database_size", e))?;
        let size: Option<i64> = conn
            .exec_first(
                "SELECT COALESCE(SUM(data_length + index_length), 0) FROM information_schema.tables WHERE table_schema = ?",
                (&self.database,),
            )
            .await
            .map_err(|e| wrap("get_database_size", e))?;
        Ok(size.unwrap_or(0).max(0) as u64)
    }

    async fn get_table_count(&self) -> AnchorResult<u64> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("get_table_count", e))?;
        let count: Option<i64> = conn
            .exec_first("SELECT count(*) FROM information_schema.tables WHERE table_schema = ?", (&self.database,))
            .await
            .map_err(|e| wrap("get_table_count", e))?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn execute_command(&self, command: &str) -> AnchorResult<Vec<u8>> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("execute_command", e))?;
        conn.query_drop(command).await.map_err(|e| wrap("execute_command", e))?;
        Ok(Vec::new())
    }
}
