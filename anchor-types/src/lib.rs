//! Shared types for the Anchor core: the capability registry (C1), the
//! Unified Model (C2), connection/CDC entity shapes, the error taxonomy,
//! and the config models every adapter and the ingestion core build on.

pub mod capability;
pub mod cdc;
pub mod config;
pub mod error;
pub mod model;

pub use capability::{BackendId, Capability, CapabilitySet};
pub use cdc::{CdcOperation, CdcEvent, PortableValue, Row};
pub use config::{ConnectionConfig, InstanceConfig, ReplicationConfig, TlsConfig, TlsMode};
pub use error::{AnchorError, AnchorResult};
pub use model::{
    Column, Constraint, ConstraintKind, Extension, Function, Index, MaterializedView, Namespace,
    Reference, Sequence, Table, Trigger, Type, TypeCategory, UnifiedModel,
};
