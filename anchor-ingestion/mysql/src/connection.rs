//! The MySQL `Adapter` and `DatabaseConnection`/`InstanceConnection`.
//! `mysql_async::Pool` is itself the shareable unit — operators each pull
//! their own `Conn` per call rather than holding one open connection
//! (§5 "Shared-resource policy": pool backends are safe to fan out).

use std::sync::Arc;

use anchor_connector::{Adapter, CallContext, ConnectedFlag, DatabaseConnection, DataOperator, InstanceConnection, MetadataOperator, ReplicationOperator, SchemaOperator};
use anchor_types::{AnchorError, AnchorResult, BackendId, ConnectionConfig, InstanceConfig};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{OptsBuilder, Pool};
use tracing::{info, warn};

use crate::data::MysqlDataOperator;
use crate::metadata::MysqlMetadataOperator;
use crate::replication::MysqlReplicationOperator;
use crate::schema::MysqlSchemaOperator;

fn build_pool(config: &ConnectionConfig) -> Pool {
    let opts = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.username.clone()))
        .pass(Some(config.password.0.clone()))
        .db_name(if config.database.is_empty() { None } else { Some(config.database.clone()) });
    Pool::new(opts)
}

async fn ping_pool(pool: &Pool, backend: BackendId, host: &str, port: u16) -> AnchorResult<()> {
    let mut conn = pool.get_conn().await.map_err(|err| {
        warn!(host, port, error = %err, "mysql pool checkout failed");
        AnchorError::Connection {
            backend,
            host: host.to_string(),
            port,
            cause: Box::new(err),
        }
    })?;
    conn.ping().await.map_err(|err| {
        warn!(host, port, error = %err, "mysql ping failed");
        AnchorError::Connection {
            backend,
            host: host.to_string(),
            port,
            cause: Box::new(err),
        }
    })?;
    info!(host, port, "mysql connection established");
    Ok(())
}

pub struct MysqlDatabaseConnection {
    id: String,
    connected: ConnectedFlag,
    schema: Arc<MysqlSchemaOperator>,
    data: Arc<MysqlDataOperator>,
    metadata: MysqlMetadataOperator,
    replication: MysqlReplicationOperator,
}

#[async_trait]
impl DatabaseConnection for MysqlDatabaseConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        BackendId::MySql
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn ping(&self, ctx: &CallContext) -> AnchorResult<()> {
        self.data.execute_count_query(ctx, "SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) -> AnchorResult<()> {
        self.connected.close();
        Ok(())
    }

    fn schema_operations(&self) -> &dyn SchemaOperator {
        self.schema.as_ref()
    }

    fn data_operations(&self) -> &dyn DataOperator {
        self.data.as_ref()
    }

    fn replication_operations(&self) -> &dyn ReplicationOperator {
        &self.replication
    }

    fn metadata_operations(&self) -> &dyn MetadataOperator {
        &self.metadata
    }
}

pub struct MysqlInstanceConnection {
    id: String,
    connected: ConnectedFlag,
    pool: Arc<Pool>,
    metadata: MysqlMetadataOperator,
}

#[async_trait]
impl InstanceConnection for MysqlInstanceConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        BackendId::MySql
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn close(&self) -> AnchorResult<()> {
        self.connected.close();
        Ok(())
    }

    async fn list_databases(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        let mut conn = self.pool.get_conn().await.map_err(|e| AnchorError::wrapped(BackendId::MySql, "list_databases", e))?;
        let names: Vec<String> = conn.query("SHOW DATABASES").await.map_err(|e| AnchorError::wrapped(BackendId::MySql, "list_databases", e))?;
        Ok(names
            .into_iter()
            .filter(|name| !matches!(name.as_str(), "information_schema" | "mysql" | "performance_schema" | "sys"))
            .collect())
    }

    async fn create_database(&self, _ctx: &CallContext, name: &str) -> AnchorResult<()> {
        let quoted = format!("`{}`", name.replace('`', "``"));
        let mut conn = self.pool.get_conn().await.map_err(|e| AnchorError::wrapped(BackendId::MySql, "create_database", e))?;
        conn.query_drop(format!("CREATE DATABASE IF NOT EXISTS {quoted}")).await.map_err(|e| AnchorError::wrapped(BackendId::MySql, "create_database", e))
    }

    async fn drop_database(&self, _ctx: &CallContext, name: &str) -> AnchorResult<()> {
        let quoted = format!("`{}`", name.replace('`', "``"));
        let mut conn = self.pool.get_conn().await.map_err(|e| AnchorError::wrapped(BackendId::MySql, "drop_database", e))?;
        conn.query_drop(format!("DROP DATABASE IF EXISTS {quoted}")).await.map_err(|e| AnchorError::wrapped(BackendId::MySql, "drop_database", e))
    }

    fn metadata_operations(&self) -> &dyn MetadataOperator {
        &self.metadata
    }
}

#[derive(Default)]
pub struct MysqlAdapter;

#[async_trait]
impl Adapter for MysqlAdapter {
    fn backend(&self) -> BackendId {
        BackendId::MySql
    }

    async fn connect(&self, _ctx: &CallContext, config: ConnectionConfig) -> AnchorResult<Arc<dyn DatabaseConnection>> {
        let pool = build_pool(&config);
        ping_pool(&pool, BackendId::MySql, &config.host, config.port).await?;
        let pool = Arc::new(pool);
        let schema = Arc::new(MysqlSchemaOperator::new(pool.clone(), config.database.clone()));
        let data = Arc::new(MysqlDataOperator::new(pool.clone()));

        Ok(Arc::new(MysqlDatabaseConnection {
            id: config.database_id,
            connected: ConnectedFlag::default(),
            metadata: MysqlMetadataOperator::new(pool, config.database),
            replication: MysqlReplicationOperator::new(schema.clone(), data.clone()),
            schema,
            data,
        }))
    }

    async fn connect_instance(&self, _ctx: &CallContext, config: InstanceConfig) -> AnchorResult<Arc<dyn InstanceConnection>> {
        let conn_config = ConnectionConfig {
            database_id: String::new(),
            backend: BackendId::MySql,
            host: config.host.clone(),
            port: config.port,
            database: String::new(),
            username: config.username.clone(),
            password: config.password.clone(),
            tls: config.tls.clone(),
            tenant_id: config.tenant_id.clone(),
            workspace_id: config.workspace_id.clone(),
            node_id: config.node_id.clone(),
            options: config.options.clone(),
        };
        let pool = build_pool(&conn_config);
        ping_pool(&pool, BackendId::MySql, &config.host, config.port).await?;
        let pool = Arc::new(pool);

        Ok(Arc::new(MysqlInstanceConnection {
            id: config.instance_id,
            connected: ConnectedFlag::default(),
            metadata: MysqlMetadataOperator::new(pool.clone(), String::new()),
            pool,
        }))
    }
}
