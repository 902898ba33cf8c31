//! The ingestion core: Connection Registry (C5), Config Watcher (C6), CDC
//! Engine (C7, including the polling-diff driver and the apply path),
//! Transformation Bridge (C8), and Virtual Resource Reconciler (C9).
//! Backend adapters live in sibling crates and implement the traits of
//! `anchor_connector`.

pub mod apply;
pub mod bridge;
pub mod cdc;
pub mod reconciler;
pub mod registry;
pub mod watcher;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use apply::{apply_cdc_event, InsertMode};
pub use bridge::{TransformKind, TransformationBridge, TransformationService, TransformRule};
pub use reconciler::{reconcile, resolve_matches, MappingService, ReconciliationReport, ReconciliationSuggestion};
pub use registry::ConnectionRegistry;
pub use watcher::{reconcile_once, ConfigStore, ConfigWatcher};
