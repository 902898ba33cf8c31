//! The Data operator facet against CQL (§4.1). Cassandra's CQL dialect has
//! no general `UPDATE ... WHERE <non-key column>` form without
//! `ALLOW FILTERING`, so `update` is capability-gated to `Unsupported`
//! rather than emitting an unsafe statement (§8 scenario 4).

use std::sync::Arc;

use anchor_connector::{CallContext, DataOperator, StreamParams, StreamResult};
use anchor_types::{AnchorError, AnchorResult, BackendId, PortableValue, Row};
use async_trait::async_trait;
use scylla::Session;

use crate::values::{cql_to_portable, portable_to_cql};

pub struct CassandraDataOperator {
    session: Arc<Session>,
}

impl CassandraDataOperator {
    pub fn new(session: Arc<Session>) -> Self {
        CassandraDataOperator { session }
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn wrap(operation: &'static str, err: impl std::error::Error + Send + Sync + 'static) -> AnchorError {
    AnchorError::wrapped(BackendId::Cassandra, operation, err)
}

#[async_trait]
impl DataOperator for CassandraDataOperator {
    async fn fetch(&self, ctx: &CallContext, table: &str, limit: Option<u64>) -> AnchorResult<Vec<Row>> {
        self.fetch_with_columns(ctx, table, &[], limit).await
    }

    async fn fetch_with_columns(&self, _ctx: &CallContext, table: &str, columns: &[String], limit: Option<u64>) -> AnchorResult<Vec<Row>> {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
        };
        let mut query = format!("SELECT {projection} FROM {}", quote(table));
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        let result = self.session.query_unpaged(query, &[]).await.map_err(|e| wrap("fetch", e))?;
        let specs: Vec<String> = result.col_specs.iter().map(|c| c.name.clone()).collect();
        let mut rows = Vec::new();
        for cql_row in result.rows.unwrap_or_default() {
            let mut row = Row::new();
            for (name, value) in specs.iter().zip(cql_row.columns.iter()) {
                row.insert(name.clone(), cql_to_portable(value.as_ref()));
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn insert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>) -> AnchorResult<u64> {
        let mut inserted = 0u64;
        for row in rows {
            let columns: Vec<&String> = row.keys().collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let query = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
                placeholders
            );
            let values: Vec<_> = columns.iter().map(|c| portable_to_cql(row.get(*c).unwrap_or(&PortableValue::Null))).collect();
            self.session.query_unpaged(query, values).await.map_err(|e| wrap("insert", e))?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update(&self, _ctx: &CallContext, _table: &str, _rows: Vec<Row>, _where_columns: &[String]) -> AnchorResult<u64> {
        Err(AnchorError::unsupported(
            BackendId::Cassandra,
            "update data",
            "this build only issues CQL UPDATE through upsert-style INSERT; use upsert instead",
        ))
    }

    async fn upsert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, _unique_columns: &[String]) -> AnchorResult<u64> {
        // CQL INSERT is itself an upsert keyed on the partition/clustering
        // key, so `upsert` and `insert` share an implementation here.
        self.insert(_ctx, table, rows).await
    }

    async fn delete(&self, _ctx: &CallContext, table: &str, where_: &Row) -> AnchorResult<u64> {
        let columns: Vec<&String> = where_.keys().collect();
        if columns.is_empty() {
            return Err(AnchorError::invalid_data(BackendId::Cassandra, "delete", "no WHERE conditions for DELETE"));
        }
        let where_clause = columns.iter().map(|c| format!("{} = ?", quote(c))).collect::<Vec<_>>().join(" AND ");
        let query = format!("DELETE FROM {} WHERE {where_clause}", quote(table));
        let values: Vec<_> = columns.iter().map(|c| portable_to_cql(where_.get(*c).unwrap_or(&PortableValue::Null))).collect();
        self.session.query_unpaged(query, values).await.map_err(|e| wrap("delete", e))?;
        Ok(1)
    }

    async fn stream(&self, ctx: &CallContext, params: StreamParams) -> AnchorResult<StreamResult> {
        let columns = params.columns.clone().unwrap_or_default();
        let limit = if params.batch_size == 0 { None } else { Some(params.batch_size) };
        let data = self.fetch_with_columns(ctx, &params.table, &columns, limit).await?;
        Ok(StreamResult {
            has_more: false,
            data,
            next_cursor: None,
        })
    }

    async fn execute_query(&self, _ctx: &CallContext, query: &str, args: &[PortableValue]) -> AnchorResult<Vec<Row>> {
        let values: Vec<_> = args.iter().map(portable_to_cql).collect();
        let result = self.session.query_unpaged(query, values).await.map_err(|e| wrap("execute_query", e))?;
        let specs: Vec<String> = result.col_specs.iter().map(|c| c.name.clone()).collect();
        let mut rows = Vec::new();
        for cql_row in result.rows.unwrap_or_default() {
            let mut row = Row::new();
            for (name, value) in specs.iter().zip(cql_row.columns.iter()) {
                row.insert(name.clone(), cql_to_portable(value.as_ref()));
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn execute_count_query(&self, _ctx: &CallContext, query: &str) -> AnchorResult<i64> {
        let result = self.session.query_unpaged(query, &[]).await.map_err(|e| wrap("execute_count_query", e))?;
        let row = result.rows.unwrap_or_default().into_iter().next();
        Ok(row.and_then(|r| r.columns.into_iter().next().flatten()).and_then(|v| v.as_bigint()).unwrap_or(0))
    }

    async fn get_row_count(&self, _ctx: &CallContext, table: &str, where_clause: Option<&str>) -> AnchorResult<(i64, bool)> {
        // `COUNT(*)` in Cassandra scans the full partition range; exact
        // but expensive — reported as exact anyway since there is no
        // cheaper catalog estimate to fall back to.
        let query = match where_clause {
            Some(clause) => format!("SELECT COUNT(*) FROM {} WHERE {clause} ALLOW FILTERING", quote(table)),
            None => format!("SELECT COUNT(*) FROM {}", quote(table)),
        };
        Ok((self.execute_count_query(_ctx, &query).await?, true))
    }

    async fn wipe(&self, _ctx: &CallContext, table: &str) -> AnchorResult<()> {
        self.session.query_unpaged(format!("TRUNCATE {}", quote(table)), &[]).await.map_err(|e| wrap("wipe", e))?;
        Ok(())
    }
}
