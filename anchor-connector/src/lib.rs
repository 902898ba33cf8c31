//! C3 — the Adapter Contract: the traits every backend implements, plus
//! the call context and capability-check helper shared by all operators.

pub mod connection;
pub mod context;
pub mod data;
pub mod metadata;
pub mod replication;
pub mod schema;

pub use connection::{Adapter, ConnectedFlag, DatabaseConnection, InstanceConnection};
pub use context::{CallContext, CallTarget};
pub use data::{DataOperator, StreamParams, StreamResult};
pub use metadata::MetadataOperator;
pub use replication::{CdcHandler, CheckpointFn, ReplicationLag, ReplicationOperator, ReplicationSource, ReplicationStatus};
pub use schema::SchemaOperator;

use anchor_types::{AnchorError, AnchorResult, BackendId, Capability, CapabilitySet};

/// Capability checks should precede expensive work (§4.1). Adapters call
/// this at the top of any operator method gated by a capability flag.
pub fn require_capability(backend: BackendId, operation: &str, capability: Capability) -> AnchorResult<()> {
    let caps = CapabilitySet::for_backend(backend);
    if caps.supports(capability) {
        Ok(())
    } else {
        Err(AnchorError::unsupported(
            backend,
            operation,
            format!("{backend} does not support {capability:?}"),
        ))
    }
}
