//! C6 — the Config Watcher: a single cooperative task, period 30 s,
//! reconciling the Connection Registry against the external config store
//! (§4.3).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anchor_connector::{CallContext, CallTarget};
use anchor_types::{AnchorResult, ConnectionConfig, InstanceConfig};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

pub const DEFAULT_RECONCILE_PERIOD: Duration = Duration::from_secs(30);
const CONNECT_RETRY_ATTEMPTS: u32 = 3;
const CONNECT_RETRY_GAP: Duration = Duration::from_secs(2);

/// The external configuration store (§6 "Inbound: configuration store").
/// `list_enabled_*` is expected to already be filtered by this node's
/// `node_id` by the store implementation.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list_enabled_databases(&self) -> AnchorResult<Vec<ConnectionConfig>>;

    async fn list_enabled_instances(&self) -> AnchorResult<Vec<InstanceConfig>>;

    async fn get_database_config(&self, database_id: &str) -> AnchorResult<Option<ConnectionConfig>>;

    async fn get_instance_config(&self, instance_id: &str) -> AnchorResult<Option<InstanceConfig>>;

    async fn upsert_database_status(&self, database_id: &str, status: &str) -> AnchorResult<()>;

    async fn upsert_instance_status(&self, instance_id: &str, status: &str) -> AnchorResult<()>;

    async fn upsert_database_metadata(&self, database_id: &str, metadata: BTreeMap<String, String>) -> AnchorResult<()>;

    async fn upsert_instance_metadata(&self, instance_id: &str, metadata: BTreeMap<String, String>) -> AnchorResult<()>;
}

/// Drives one tick of the reconcile loop against a registry and a store.
/// A free function rather than a method so tests can call it directly
/// without the cooperative-task scaffolding.
pub async fn reconcile_once(registry: &ConnectionRegistry, store: &dyn ConfigStore, cancellation: &CancellationToken) -> AnchorResult<()> {
    // Step 1: pull enabled configs (§4.3 body, step 1).
    let enabled_databases = store.list_enabled_databases().await?;
    if cancellation.is_cancelled() {
        return Ok(());
    }

    // Step 2: connect anything new, retrying the initial attempt.
    for config in &enabled_databases {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        if registry.get_database(&config.database_id).is_some() {
            continue;
        }
        connect_new_database(registry, store, config.clone(), cancellation).await;
    }

    // Step 3: ping and refresh every live connection; disconnect anything
    // that vanished from the store.
    for database_id in registry.list_database_ids() {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        reconcile_live_database(registry, store, &database_id).await;
    }

    let enabled_instances = store.list_enabled_instances().await?;
    for config in &enabled_instances {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        if registry.get_instance(&config.instance_id).is_some() {
            continue;
        }
        connect_new_instance(registry, store, config.clone(), cancellation).await;
    }

    for instance_id in registry.list_instance_ids() {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        reconcile_live_instance(registry, store, &instance_id).await;
    }

    Ok(())
}

async fn connect_new_database(registry: &ConnectionRegistry, store: &dyn ConfigStore, config: ConnectionConfig, cancellation: &CancellationToken) {
    let database_id = config.database_id.clone();
    let ctx = CallContext::new(config.tenant_id.clone(), config.workspace_id.clone(), CallTarget::Database(database_id.clone())).with_cancellation(cancellation.clone());

    let mut attempt = 0;
    loop {
        attempt += 1;
        match registry.connect_database(&ctx, config.clone()).await {
            Ok(connection) => {
                let status_result = store.upsert_database_status(&database_id, "connected").await;
                if let Err(err) = status_result {
                    warn!(%database_id, error = %err, "config watcher: failed to push connected status");
                }
                if let Ok(metadata) = connection.metadata_operations().collect_database_metadata().await {
                    if let Err(err) = store.upsert_database_metadata(&database_id, metadata).await {
                        warn!(%database_id, error = %err, "config watcher: failed to push initial metadata");
                    }
                }
                info!(%database_id, "config watcher: connected new database");
                return;
            }
            Err(err) if attempt < CONNECT_RETRY_ATTEMPTS => {
                warn!(%database_id, attempt, error = %err, "config watcher: initial connect failed, retrying");
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(CONNECT_RETRY_GAP) => {}
                }
            }
            Err(err) => {
                // Steady-state failures are expected (unreachable user
                // databases) and never fatal (§4.3 "Retry policy").
                warn!(%database_id, error = %err, "config watcher: connect failed after retries");
                let _ = store.upsert_database_status(&database_id, &format!("connect failed: {err}")).await;
                return;
            }
        }
    }
}

async fn connect_new_instance(registry: &ConnectionRegistry, store: &dyn ConfigStore, config: InstanceConfig, cancellation: &CancellationToken) {
    let instance_id = config.instance_id.clone();
    let ctx = CallContext::new(config.tenant_id.clone(), config.workspace_id.clone(), CallTarget::Instance(instance_id.clone())).with_cancellation(cancellation.clone());

    let mut attempt = 0;
    loop {
        attempt += 1;
        match registry.connect_instance(&ctx, config.clone()).await {
            Ok(connection) => {
                if let Err(err) = store.upsert_instance_status(&instance_id, "connected").await {
                    warn!(%instance_id, error = %err, "config watcher: failed to push connected status");
                }
                if let Ok(metadata) = connection.metadata_operations().collect_instance_metadata().await {
                    if let Err(err) = store.upsert_instance_metadata(&instance_id, metadata).await {
                        warn!(%instance_id, error = %err, "config watcher: failed to push initial metadata");
                    }
                }
                info!(%instance_id, "config watcher: connected new instance");
                return;
            }
            Err(err) if attempt < CONNECT_RETRY_ATTEMPTS => {
                warn!(%instance_id, attempt, error = %err, "config watcher: initial connect failed, retrying");
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(CONNECT_RETRY_GAP) => {}
                }
            }
            Err(err) => {
                warn!(%instance_id, error = %err, "config watcher: connect failed after retries");
                let _ = store.upsert_instance_status(&instance_id, &format!("connect failed: {err}")).await;
                return;
            }
        }
    }
}

async fn reconcile_live_database(registry: &ConnectionRegistry, store: &dyn ConfigStore, database_id: &str) {
    let Some(connection) = registry.get_database(database_id) else {
        return;
    };
    match store.get_database_config(database_id).await {
        Ok(None) => {
            // Config vanished from the store: disconnect (§4.3 step 3).
            if let Err(err) = registry.disconnect_database(database_id).await {
                warn!(%database_id, error = %err, "config watcher: failed to disconnect orphaned database connection");
            }
            return;
        }
        Err(err) => {
            warn!(%database_id, error = %err, "config watcher: failed to re-read database config, skipping this tick");
            return;
        }
        Ok(Some(_)) => {}
    }

    match connection.metadata_operations().execute_command("SELECT 1").await {
        Ok(_) => {
            if let Ok(metadata) = connection.metadata_operations().collect_database_metadata().await {
                let _ = store.upsert_database_metadata(database_id, metadata).await;
            }
            let _ = store.upsert_database_status(database_id, "connected").await;
        }
        Err(err) => {
            warn!(%database_id, error = %err, "config watcher: ping failed");
            let _ = store.upsert_database_status(database_id, &format!("ping failed: {err}")).await;
        }
    }
}

async fn reconcile_live_instance(registry: &ConnectionRegistry, store: &dyn ConfigStore, instance_id: &str) {
    let Some(connection) = registry.get_instance(instance_id) else {
        return;
    };
    match store.get_instance_config(instance_id).await {
        Ok(None) => {
            if let Err(err) = registry.disconnect_instance(instance_id).await {
                warn!(%instance_id, error = %err, "config watcher: failed to disconnect orphaned instance connection");
            }
            return;
        }
        Err(err) => {
            warn!(%instance_id, error = %err, "config watcher: failed to re-read instance config, skipping this tick");
            return;
        }
        Ok(Some(_)) => {}
    }

    match connection.metadata_operations().collect_instance_metadata().await {
        Ok(metadata) => {
            let _ = store.upsert_instance_metadata(instance_id, metadata).await;
            let _ = store.upsert_instance_status(instance_id, "connected").await;
        }
        Err(err) => {
            warn!(%instance_id, error = %err, "config watcher: metadata refresh failed");
            let _ = store.upsert_instance_status(instance_id, &format!("refresh failed: {err}")).await;
        }
    }
}

/// Owns the periodic task; `spawn` returns a handle whose `stop` cancels
/// the loop and waits for the in-flight tick to finish.
pub struct ConfigWatcher {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ConfigStore>,
    period: Duration,
    cancellation: CancellationToken,
}

impl ConfigWatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn ConfigStore>) -> Self {
        ConfigWatcher {
            registry,
            store,
            period: DEFAULT_RECONCILE_PERIOD,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs one tick on demand (§4.3 "also runnable on-demand").
    pub async fn tick(&self) -> AnchorResult<()> {
        reconcile_once(&self.registry, self.store.as_ref(), &self.cancellation).await
    }

    /// Runs the periodic loop until cancelled. Intended to be
    /// `tokio::spawn`ed by the caller.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.cancellation.is_cancelled() {
                break;
            }
            if let Err(err) = self.tick().await {
                warn!(error = %err, "config watcher: tick failed");
            }
            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }

    pub fn stop(&self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAdapter, FakeConfigStore};
    use anchor_types::{BackendId, SealedSecret, TlsConfig};

    fn database_config(id: &str) -> ConnectionConfig {
        ConnectionConfig {
            database_id: id.to_string(),
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
    async fn reconcile_connects_newly_enabled_databases() {
        let registry = ConnectionRegistry::new(vec![Arc::new(FakeAdapter::new(BackendId::Postgres))]);
        let store = Arc::new(FakeConfigStore::new());
        store.add_database(database_config("db1"));

        let cancellation = CancellationToken::new();
        reconcile_once(&registry, store.as_ref(), &cancellation).await.unwrap();

        assert!(registry.get_database("db1").is_some());
        assert_eq!(store.database_status("db1"), Some("connected".to_string()));
    }

    #[tokio::test]
    async fn reconcile_disconnects_databases_dropped_from_the_store() {
        let registry = ConnectionRegistry::new(vec![Arc::new(FakeAdapter::new(BackendId::Postgres))]);
        let store = Arc::new(FakeConfigStore::new());
        store.add_database(database_config("db1"));
        let cancellation = CancellationToken::new();
        reconcile_once(&registry, store.as_ref(), &cancellation).await.unwrap();
        assert!(registry.get_database("db1").is_some());

        store.remove_database("db1");
        reconcile_once(&registry, store.as_ref(), &cancellation).await.unwrap();
        assert!(registry.get_database("db1").is_none());
    }

    #[tokio::test]
    async fn reconcile_is_a_no_op_when_already_connected() {
        let registry = ConnectionRegistry::new(vec![Arc::new(FakeAdapter::new(BackendId::Postgres))]);
        let store = Arc::new(FakeConfigStore::new());
        store.add_database(database_config("db1"));
        let cancellation = CancellationToken::new();

        reconcile_once(&registry, store.as_ref(), &cancellation).await.unwrap();
        let first = registry.get_database("db1").unwrap();
        reconcile_once(&registry, store.as_ref(), &cancellation).await.unwrap();
        let second = registry.get_database("db1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
