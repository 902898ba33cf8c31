//! The Cassandra `Adapter` and `DatabaseConnection`/`InstanceConnection`.
//! A `scylla::Session` is itself a connection pool over the cluster's
//! nodes, so one `Session` is shared across every operator the same way
//! a pooled Postgres client is (§5 "Shared-resource policy").

use std::sync::Arc;

use anchor_connector::{Adapter, CallContext, ConnectedFlag, DatabaseConnection, DataOperator, InstanceConnection, MetadataOperator, ReplicationOperator, SchemaOperator};
use anchor_types::{AnchorError, AnchorResult, BackendId, ConnectionConfig, InstanceConfig};
use async_trait::async_trait;
use scylla::{Session, SessionBuilder};
use tracing::{info, warn};

use crate::data::CassandraDataOperator;
use crate::metadata::CassandraMetadataOperator;
use crate::replication::CassandraReplicationOperator;
use crate::schema::CassandraSchemaOperator;

async fn connect_session(config: &ConnectionConfig) -> AnchorResult<Session> {
    let node = format!("{}:{}", config.host, config.port);
    let mut builder = SessionBuilder::new().known_node(&node);
    if !config.username.is_empty() {
        builder = builder.user(&config.username, &config.password.0);
    }
    if !config.database.is_empty() {
        builder = builder.use_keyspace(&config.database, false);
    }
    let session = builder.build().await.map_err(|err| {
        warn!(host = %config.host, port = config.port, error = %err, "cassandra session build failed");
        AnchorError::Connection {
            backend: BackendId::Cassandra,
            host: config.host.clone(),
            port: config.port,
            cause: Box::new(err),
        }
    })?;
    info!(host = %config.host, keyspace = %config.database, "cassandra session established");
    Ok(session)
}

pub struct CassandraDatabaseConnection {
    id: String,
    connected: ConnectedFlag,
    schema: Arc<CassandraSchemaOperator>,
    data: Arc<CassandraDataOperator>,
    metadata: CassandraMetadataOperator,
    replication: CassandraReplicationOperator,
}

#[async_trait]
impl DatabaseConnection for CassandraDatabaseConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        BackendId::Cassandra
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn ping(&self, ctx: &CallContext) -> AnchorResult<()> {
        self.data.execute_count_query(ctx, "SELECT release_version FROM system.local").await?;
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

pub struct CassandraInstanceConnection {
    id: String,
    connected: ConnectedFlag,
    session: Arc<Session>,
    metadata: CassandraMetadataOperator,
}

#[async_trait]
impl InstanceConnection for CassandraInstanceConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        BackendId::Cassandra
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn close(&self) -> AnchorResult<()> {
        self.connected.close();
        Ok(())
    }

    async fn list_databases(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        let result = self
            .session
            .query_unpaged("SELECT keyspace_name FROM system_schema.keyspaces", &[])
            .await
            .map_err(|e| AnchorError::wrapped(BackendId::Cassandra, "list_databases", e))?;
        Ok(result
            .rows
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.columns.into_iter().next().flatten().and_then(|v| v.as_text().cloned()))
            .filter(|name| !name.starts_with("system"))
            .collect())
    }

    async fn create_database(&self, _ctx: &CallContext, name: &str) -> AnchorResult<()> {
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        self.session
            .query_unpaged(format!("CREATE KEYSPACE IF NOT EXISTS {quoted} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}"), &[])
            .await
            .map_err(|e| AnchorError::wrapped(BackendId::Cassandra, "create_database", e))?;
        Ok(())
    }

    async fn drop_database(&self, _ctx: &CallContext, name: &str) -> AnchorResult<()> {
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        self.session
            .query_unpaged(format!("DROP KEYSPACE IF EXISTS {quoted}"), &[])
            .await
            .map_err(|e| AnchorError::wrapped(BackendId::Cassandra, "drop_database", e))?;
        Ok(())
    }

    fn metadata_operations(&self) -> &dyn MetadataOperator {
        &self.metadata
    }
}

#[derive(Default)]
pub struct CassandraAdapter;

#[async_trait]
impl Adapter for CassandraAdapter {
    fn backend(&self) -> BackendId {
        BackendId::Cassandra
    }

    async fn connect(&self, _ctx: &CallContext, config: ConnectionConfig) -> AnchorResult<Arc<dyn DatabaseConnection>> {
        let session = Arc::new(connect_session(&config).await?);
        let schema = Arc::new(CassandraSchemaOperator::new(session.clone()));
        let data = Arc::new(CassandraDataOperator::new(session.clone()));

        Ok(Arc::new(CassandraDatabaseConnection {
            id: config.database_id,
            connected: ConnectedFlag::default(),
            metadata: CassandraMetadataOperator::new(session),
            replication: CassandraReplicationOperator::new(schema.clone(), data.clone()),
            schema,
            data,
        }))
    }

    async fn connect_instance(&self, _ctx: &CallContext, config: InstanceConfig) -> AnchorResult<Arc<dyn InstanceConnection>> {
        let conn_config = ConnectionConfig {
            database_id: String::new(),
            backend: BackendId::Cassandra,
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
        let session = Arc::new(connect_session(&conn_config).await?);

        Ok(Arc::new(CassandraInstanceConnection {
            id: config.instance_id,
            connected: ConnectedFlag::default(),
            metadata: CassandraMetadataOperator::new(session.clone()),
            session,
        }))
    }
}
