use anchor_types::{AnchorResult, Table, UnifiedModel};
use async_trait::async_trait;

use crate::context::CallContext;

/// The Schema operator facet of the Adapter Contract (§4.1, §4.4).
#[async_trait]
pub trait SchemaOperator: Send + Sync {
    async fn discover(&self, ctx: &CallContext) -> AnchorResult<UnifiedModel>;

    /// Idempotent create-if-not-exists, walking the model in the order
    /// documented by [`anchor_types::model::UnifiedModel::creation_order`].
    async fn create_structure(&self, ctx: &CallContext, model: &UnifiedModel) -> AnchorResult<()>;

    async fn list_tables(&self, ctx: &CallContext) -> AnchorResult<Vec<String>>;

    async fn get_table_schema(&self, ctx: &CallContext, name: &str) -> AnchorResult<Option<Table>>;

    /// Doubles the backend-specific quote character; callers must never
    /// build DDL without it (§4.4 "Identifier quoting").
    fn quote_identifier(&self, name: &str) -> String;
}
