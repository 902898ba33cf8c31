use std::collections::BTreeMap;

use anchor_types::AnchorResult;
use async_trait::async_trait;

/// The Metadata operator facet of the Adapter Contract (§4.1).
#[async_trait]
pub trait MetadataOperator: Send + Sync {
    async fn collect_database_metadata(&self) -> AnchorResult<BTreeMap<String, String>>;

    async fn collect_instance_metadata(&self) -> AnchorResult<BTreeMap<String, String>>;

    async fn get_version(&self) -> AnchorResult<String>;

    async fn get_unique_identifier(&self) -> AnchorResult<String>;

    async fn get_database_size(&self) -> AnchorResult<u64>;

    async fn get_table_count(&self) -> AnchorResult<u64>;

    async fn execute_command(&self, command: &str) -> AnchorResult<Vec<u8>>;
}
