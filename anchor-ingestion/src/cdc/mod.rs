//! C7 — the CDC Engine: the event model lives in `anchor_types::cdc`; this
//! module holds the driver-selection vocabulary shared across adapters
//! (§4.5) and the polling-diff driver that backends without native CDC
//! delegate to entirely.
//!
//! Native drivers (§4.5.1 — Postgres logical replication, CockroachDB
//! changefeeds, MySQL binlog, …) implement `ReplicationSource` directly in
//! their adapter crate; there is no shared native-driver scaffolding here
//! beyond the trait itself, since each backend's native wire protocol has
//! essentially nothing in common with another's.

pub mod polling;

pub use polling::{PollingDiffSource, PollingSnapshotSource, DEFAULT_POLL_INTERVAL, EDGEDB_POLL_INTERVAL};

/// Picks between a native driver and the polling-diff driver for a given
/// backend, per §9 "Pluggable replication": native when the capability
/// flag says so, polling-diff otherwise.
pub fn requires_polling_diff(capabilities: &anchor_types::CapabilitySet) -> bool {
    capabilities.requires_polling_cdc()
}
