//! C5 — the Connection Registry: a process-wide `{database_id ->
//! connection}` / `{instance_id -> instance connection}` map. A singleton
//! for the lifetime of the service; torn down by closing every entry in
//! reverse registration order on shutdown (§9).

use std::sync::Arc;

use anchor_connector::{Adapter, CallContext, DatabaseConnection, InstanceConnection};
use anchor_types::{AnchorError, AnchorResult, BackendId, ConnectionConfig, InstanceConfig};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{info, warn};

/// Map access is guarded by a reader-preferring lock; each connection's own
/// `connected_flag` is atomic so read paths (`is_connected`) never need
/// this lock at all (§4.2).
pub struct ConnectionRegistry {
    adapters: IndexMap<BackendId, Arc<dyn Adapter>>,
    databases: RwLock<IndexMap<String, Arc<dyn DatabaseConnection>>>,
    instances: RwLock<IndexMap<String, Arc<dyn InstanceConnection>>>,
}

impl ConnectionRegistry {
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.backend(), a)).collect();
        ConnectionRegistry {
            adapters,
            databases: RwLock::new(IndexMap::new()),
            instances: RwLock::new(IndexMap::new()),
        }
    }

    fn adapter_for(&self, backend: BackendId) -> AnchorResult<Arc<dyn Adapter>> {
        self.adapters.get(&backend).cloned().ok_or_else(|| {
            AnchorError::Configuration {
                backend,
                field: "backend".to_string(),
                reason: "no adapter registered for this backend".to_string(),
            }
        })
    }

    /// Idempotent attach (§8 "Registry idempotence"): `connect(C);
    /// connect(C)` yields exactly one live session. If a racing caller won
    /// the insert first, this call's freshly opened connection is closed
    /// rather than leaked.
    pub async fn connect_database(&self, ctx: &CallContext, config: ConnectionConfig) -> AnchorResult<Arc<dyn DatabaseConnection>> {
        if let Some(existing) = self.databases.read().get(&config.database_id).cloned() {
            return Ok(existing);
        }

        let adapter = self.adapter_for(config.backend)?;
        let database_id = config.database_id.clone();
        let connection = adapter.connect(ctx, config).await?;

        let mut guard = self.databases.write();
        if let Some(existing) = guard.get(&database_id).cloned() {
            drop(guard);
            if let Err(err) = connection.close().await {
                warn!(%database_id, error = %err, "failed to close redundant connection opened during a registry race");
            }
            return Ok(existing);
        }
        guard.insert(database_id.clone(), connection.clone());
        drop(guard);
        info!(%database_id, backend = %connection.backend(), "database connection registered");
        Ok(connection)
    }

    pub async fn connect_instance(&self, ctx: &CallContext, config: InstanceConfig) -> AnchorResult<Arc<dyn InstanceConnection>> {
        if let Some(existing) = self.instances.read().get(&config.instance_id).cloned() {
            return Ok(existing);
        }

        let adapter = self.adapter_for(config.backend)?;
        let instance_id = config.instance_id.clone();
        let connection = adapter.connect_instance(ctx, config).await?;

        let mut guard = self.instances.write();
        if let Some(existing) = guard.get(&instance_id).cloned() {
            drop(guard);
            if let Err(err) = connection.close().await {
                warn!(%instance_id, error = %err, "failed to close redundant instance connection opened during a registry race");
            }
            return Ok(existing);
        }
        guard.insert(instance_id.clone(), connection.clone());
        drop(guard);
        info!(%instance_id, backend = %connection.backend(), "instance connection registered");
        Ok(connection)
    }

    pub fn get_database(&self, database_id: &str) -> Option<Arc<dyn DatabaseConnection>> {
        self.databases.read().get(database_id).cloned()
    }

    pub fn get_instance(&self, instance_id: &str) -> Option<Arc<dyn InstanceConnection>> {
        self.instances.read().get(instance_id).cloned()
    }

    pub fn list_database_ids(&self) -> Vec<String> {
        self.databases.read().keys().cloned().collect()
    }

    pub fn list_instance_ids(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    /// Tolerant of double-disconnect: removing an absent key is a no-op,
    /// not an error (§8 "Registry idempotence").
    pub async fn disconnect_database(&self, database_id: &str) -> AnchorResult<()> {
        let connection = self.databases.write().shift_remove(database_id);
        if let Some(connection) = connection {
            connection.close().await?;
            info!(%database_id, "database connection disconnected");
        }
        Ok(())
    }

    pub async fn disconnect_instance(&self, instance_id: &str) -> AnchorResult<()> {
        let connection = self.instances.write().shift_remove(instance_id);
        if let Some(connection) = connection {
            connection.close().await?;
            info!(%instance_id, "instance connection disconnected");
        }
        Ok(())
    }

    /// Closes every entry in reverse registration order (§9).
    pub async fn shutdown(&self) {
        let database_ids: Vec<String> = self.databases.read().keys().rev().cloned().collect();
        for id in database_ids {
            if let Err(err) = self.disconnect_database(&id).await {
                warn!(database_id = %id, error = %err, "error while closing connection during shutdown");
            }
        }
        let instance_ids: Vec<String> = self.instances.read().keys().rev().cloned().collect();
        for id in instance_ids {
            if let Err(err) = self.disconnect_instance(&id).await {
                warn!(instance_id = %id, error = %err, "error while closing instance connection during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAdapter;
    use anchor_connector::CallTarget;
    use anchor_types::{BackendId, SealedSecret, TlsConfig};

    fn config(database_id: &str) -> ConnectionConfig {
        ConnectionConfig {
            database_id: database_id.to_string(),
            backend: BackendId::Postgres,
            host: "localhost".into(),
            port: 5432,
            database: "db".into(),
            username: "user".into(),
            password: SealedSecret::default(),
            tls: TlsConfig::default(),
            tenant_id: "t".into(),
            workspace_id: "w".into(),
            node_id: "n".into(),
            options: Default::default(),
        }
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let registry = ConnectionRegistry::new(vec![Arc::new(FakeAdapter::new(BackendId::Postgres))]);
        let ctx = CallContext::for_test(CallTarget::Database("db1".into()));

        let first = registry.connect_database(&ctx, config("db1")).await.unwrap();
        let second = registry.connect_database(&ctx, config("db1")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.list_database_ids(), vec!["db1".to_string()]);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let registry = ConnectionRegistry::new(vec![Arc::new(FakeAdapter::new(BackendId::Postgres))]);
        let ctx = CallContext::for_test(CallTarget::Database("db1".into()));
        registry.connect_database(&ctx, config("db1")).await.unwrap();

        registry.disconnect_database("db1").await.unwrap();
        // Second disconnect must not error.
        registry.disconnect_database("db1").await.unwrap();
        assert!(registry.get_database("db1").is_none());
    }

    #[tokio::test]
    async fn unknown_backend_is_a_configuration_error() {
        let registry = ConnectionRegistry::new(vec![]);
        let ctx = CallContext::for_test(CallTarget::Database("db1".into()));
        let err = registry.connect_database(&ctx, config("db1")).await.unwrap_err();
        assert!(matches!(err, AnchorError::Configuration { .. }));
    }

    #[tokio::test]
    async fn connected_flag_reflects_close() {
        let registry = ConnectionRegistry::new(vec![Arc::new(FakeAdapter::new(BackendId::Postgres))]);
        let ctx = CallContext::for_test(CallTarget::Database("db1".into()));
        registry.connect_database(&ctx, config("db1")).await.unwrap();
        let connection = registry.get_database("db1").unwrap();
        assert!(connection.is_connected());
        registry.disconnect_database("db1").await.unwrap();
        assert!(!connection.is_connected());
    }
}
