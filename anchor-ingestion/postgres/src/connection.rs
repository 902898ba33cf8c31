//! The Postgres `Adapter` and `DatabaseConnection`/`InstanceConnection`.
//! `tokio_postgres::Client` is safe to share across operators on one
//! connection without extra serialization (§5 "Shared-resource policy":
//! pool backends — Postgres, CockroachDB — are safe).

use std::sync::Arc;

use anchor_connector::{Adapter, CallContext, ConnectedFlag, DatabaseConnection, DataOperator, InstanceConnection, MetadataOperator, ReplicationOperator, SchemaOperator};
use anchor_types::{AnchorError, AnchorResult, BackendId, ConnectionConfig, InstanceConfig, TlsMode};
use async_trait::async_trait;
use tracing::warn;

use crate::data::PostgresDataOperator;
use crate::metadata::PostgresMetadataOperator;
use crate::replication::PostgresReplicationOperator;
use crate::schema::PostgresSchemaOperator;

/// Builds a `tokio_postgres::Config` from the portable config shape.
/// `config.password.0` is expected to already carry plaintext by the time
/// it reaches an adapter — unsealing is an external collaborator's
/// concern (§6).
pub fn build_pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .dbname(&config.database)
        .user(&config.username)
        .password(&config.password.0);
    if config.tls.ssl {
        pg_config.ssl_mode(match config.tls.ssl_mode {
            TlsMode::Disable => tokio_postgres::config::SslMode::Prefer,
            TlsMode::VerifyCa => tokio_postgres::config::SslMode::Require,
            TlsMode::VerifyFull => tokio_postgres::config::SslMode::Require,
        });
    }
    pg_config
}

async fn connect_and_spawn(pg_config: &tokio_postgres::Config, backend: BackendId, host: &str, port: u16) -> AnchorResult<tokio_postgres::Client> {
    let (client, connection) = pg_config.connect(tokio_postgres::NoTls).await.map_err(|err| AnchorError::Connection {
        backend,
        host: host.to_string(),
        port,
        cause: Box::new(err),
    })?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            warn!(error = %err, "postgres connection driver task exited with an error");
        }
    });
    Ok(client)
}

pub struct PostgresDatabaseConnection {
    id: String,
    connected: ConnectedFlag,
    schema: PostgresSchemaOperator,
    data: PostgresDataOperator,
    metadata: PostgresMetadataOperator,
    replication: PostgresReplicationOperator,
}

#[async_trait]
impl DatabaseConnection for PostgresDatabaseConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        BackendId::Postgres
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

pub struct PostgresInstanceConnection {
    id: String,
    connected: ConnectedFlag,
    client: Arc<tokio_postgres::Client>,
    metadata: PostgresMetadataOperator,
}

#[async_trait]
impl InstanceConnection for PostgresInstanceConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> BackendId {
        BackendId::Postgres
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    async fn close(&self) -> AnchorResult<()> {
        self.connected.close();
        Ok(())
    }

    async fn list_databases(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        let rows = self
            .client
            .query("SELECT datname FROM pg_database WHERE datistemplate = false", &[])
            .await
            .map_err(|err| AnchorError::wrapped(BackendId::Postgres, "list_databases", err))?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn create_database(&self, _ctx: &CallContext, name: &str) -> AnchorResult<()> {
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        self.client
            .batch_execute(&format!("CREATE DATABASE {quoted}"))
            .await
            .map_err(|err| AnchorError::wrapped(BackendId::Postgres, "create_database", err))
    }

    async fn drop_database(&self, _ctx: &CallContext, name: &str) -> AnchorResult<()> {
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        self.client
            .batch_execute(&format!("DROP DATABASE IF EXISTS {quoted}"))
            .await
            .map_err(|err| AnchorError::wrapped(BackendId::Postgres, "drop_database", err))
    }

    fn metadata_operations(&self) -> &dyn MetadataOperator {
        &self.metadata
    }
}

#[derive(Default)]
pub struct PostgresAdapter;

#[async_trait]
impl Adapter for PostgresAdapter {
    fn backend(&self) -> BackendId {
        BackendId::Postgres
    }

    async fn connect(&self, _ctx: &CallContext, config: ConnectionConfig) -> AnchorResult<Arc<dyn DatabaseConnection>> {
        let pg_config = build_pg_config(&config);
        let client = Arc::new(connect_and_spawn(&pg_config, BackendId::Postgres, &config.host, config.port).await?);

        Ok(Arc::new(PostgresDatabaseConnection {
            id: config.database_id,
            connected: ConnectedFlag::default(),
            schema: PostgresSchemaOperator::new(client.clone()),
            data: PostgresDataOperator::new(client.clone()),
            metadata: PostgresMetadataOperator::new(client.clone()),
            replication: PostgresReplicationOperator::new(client, pg_config),
        }))
    }

    async fn connect_instance(&self, _ctx: &CallContext, config: InstanceConfig) -> AnchorResult<Arc<dyn InstanceConnection>> {
        let mut conn_config = ConnectionConfig {
            database_id: String::new(),
            backend: BackendId::Postgres,
            host: config.host.clone(),
            port: config.port,
            database: "postgres".to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            tls: config.tls.clone(),
            tenant_id: config.tenant_id.clone(),
            workspace_id: config.workspace_id.clone(),
            node_id: config.node_id.clone(),
            options: config.options.clone(),
        };
        conn_config.database_id = format!("{}-instance", config.instance_id);
        let pg_config = build_pg_config(&conn_config);
        let client = Arc::new(connect_and_spawn(&pg_config, BackendId::Postgres, &config.host, config.port).await?);

        Ok(Arc::new(PostgresInstanceConnection {
            id: config.instance_id,
            connected: ConnectedFlag::default(),
            metadata: PostgresMetadataOperator::new(client.clone()),
            client,
        }))
    }
}
