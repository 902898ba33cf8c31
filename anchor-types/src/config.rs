//! Config models and the external collaborators named in §6: credential
//! ciphertext + `secret_unseal`, and the shape of a connection/instance/
//! replication config as read from the persistent configuration store.

use serde::{Deserialize, Serialize};

use crate::capability::BackendId;
use crate::error::AnchorResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TlsMode {
    #[default]
    Disable,
    VerifyCa,
    VerifyFull,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TlsConfig {
    pub ssl: bool,
    pub ssl_mode: TlsMode,
    pub ssl_reject_unauthorized: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub root_cert_path: Option<String>,
    pub cert_pem: Option<String>,
    pub key_pem: Option<String>,
    pub root_cert_pem: Option<String>,
}

/// Ciphertext as stored in the config store. Plaintext is only ever
/// produced by `SecretUnsealer::unseal`, never stored (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SealedSecret(pub String);

impl SealedSecret {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The credential-decryption collaborator (out of scope per §1; this trait
/// is the contract the core calls through). Empty ciphertext maps to empty
/// plaintext — passwordless dev mode.
pub trait SecretUnsealer: Send + Sync {
    fn unseal(&self, tenant_id: &str, ciphertext: &SealedSecret) -> AnchorResult<String>;
}

/// Unseals by treating ciphertext as already-plaintext. Never used outside
/// tests/dev: production wiring supplies a real `SecretUnsealer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentitySecretUnsealer;

impl SecretUnsealer for IdentitySecretUnsealer {
    fn unseal(&self, _tenant_id: &str, ciphertext: &SealedSecret) -> AnchorResult<String> {
        Ok(ciphertext.0.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub database_id: String,
    pub backend: BackendId,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: SealedSecret,
    #[serde(default)]
    pub tls: TlsConfig,
    pub tenant_id: String,
    pub workspace_id: String,
    pub node_id: String,
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceConfig {
    pub instance_id: String,
    pub backend: BackendId,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SealedSecret,
    #[serde(default)]
    pub tls: TlsConfig,
    pub tenant_id: String,
    pub workspace_id: String,
    pub node_id: String,
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplicationConfig {
    pub source_id: String,
    pub database_id: String,
    pub tables: Vec<String>,
    /// Override of the polling-diff driver's default tick interval
    /// (§4.5.2, §9 open question — undecided whether this should be
    /// per-table; it is per-source here).
    pub poll_interval_ms: Option<u64>,
    /// Resume position for native drivers; empty/`None` for polling
    /// sources, which always start from a fresh baseline (§4.5).
    pub start_position: Option<String>,
}
