use anchor_types::{AnchorResult, PortableValue, Row};
use async_trait::async_trait;

use crate::context::CallContext;

#[derive(Debug, Clone, Default)]
pub struct StreamParams {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub filter: Option<String>,
    pub cursor: Option<String>,
    pub batch_size: u64,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub data: Vec<Row>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// The Data operator facet of the Adapter Contract (§4.1).
#[async_trait]
pub trait DataOperator: Send + Sync {
    async fn fetch(&self, ctx: &CallContext, table: &str, limit: Option<u64>) -> AnchorResult<Vec<Row>>;

    async fn fetch_with_columns(
        &self,
        ctx: &CallContext,
        table: &str,
        columns: &[String],
        limit: Option<u64>,
    ) -> AnchorResult<Vec<Row>>;

    async fn insert(&self, ctx: &CallContext, table: &str, rows: Vec<Row>) -> AnchorResult<u64>;

    async fn update(
        &self,
        ctx: &CallContext,
        table: &str,
        rows: Vec<Row>,
        where_columns: &[String],
    ) -> AnchorResult<u64>;

    async fn upsert(
        &self,
        ctx: &CallContext,
        table: &str,
        rows: Vec<Row>,
        unique_columns: &[String],
    ) -> AnchorResult<u64>;

    /// `where_` maps column -> value; a predicate is built from every
    /// non-null entry (§4.5.2 "Tombstone policy" — null PK values never
    /// reach here unfiltered, see `anchor_ingestion::apply`).
    async fn delete(&self, ctx: &CallContext, table: &str, where_: &Row) -> AnchorResult<u64>;

    async fn stream(&self, ctx: &CallContext, params: StreamParams) -> AnchorResult<StreamResult>;

    async fn execute_query(&self, ctx: &CallContext, query: &str, args: &[PortableValue]) -> AnchorResult<Vec<Row>>;

    async fn execute_count_query(&self, ctx: &CallContext, query: &str) -> AnchorResult<i64>;

    /// `bool` signals whether the count is exact or an estimate (some
    /// backends only expose approximate counts via catalog statistics).
    async fn get_row_count(&self, ctx: &CallContext, table: &str, where_clause: Option<&str>) -> AnchorResult<(i64, bool)>;

    async fn wipe(&self, ctx: &CallContext, table: &str) -> AnchorResult<()>;
}
