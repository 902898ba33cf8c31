//! The Data operator facet against a plain Postgres table, built with
//! parameterized SQL and the shared identifier-quoting rule (§4.4, §4.5.2
//! "Tombstone policy" for the `delete` predicate).

use std::sync::Arc;

use anchor_connector::{CallContext, DataOperator, StreamParams, StreamResult};
use anchor_types::{AnchorError, AnchorResult, BackendId, PortableValue, Row};
use async_trait::async_trait;
use indexmap::IndexMap;

use crate::values::{column_to_portable, PgParam};

pub struct PostgresDataOperator {
    client: Arc<tokio_postgres::Client>,
}

impl PostgresDataOperator {
    pub fn new(client: Arc<tokio_postgres::Client>) -> Self {
        PostgresDataOperator { client }
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn row_from_pg(pg_row: &tokio_postgres::Row) -> AnchorResult<Row> {
    let mut row = Row::new();
    for (index, column) in pg_row.columns().iter().enumerate() {
        row.insert(column.name().to_string(), column_to_portable(pg_row, index)?);
    }
    Ok(row)
}

fn wrap(operation: &'static str, err: tokio_postgres::Error) -> AnchorError {
    AnchorError::wrapped(BackendId::Postgres, operation, err)
}

#[async_trait]
impl DataOperator for PostgresDataOperator {
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
        let rows = self.client.query(&query, &[]).await.map_err(|e| wrap("fetch", e))?;
        rows.iter().map(row_from_pg).collect()
    }

    async fn insert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>) -> AnchorResult<u64> {
        let mut inserted = 0u64;
        for row in rows {
            let columns: Vec<&String> = row.keys().collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
            let query = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
                placeholders.join(", ")
            );
            let values: Vec<PortableValue> = columns.iter().map(|c| row.get(*c).cloned().unwrap_or(PortableValue::Null)).collect();
            let params: Vec<PgParam> = values.iter().map(PgParam).collect();
            let params_dyn: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params.iter().map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync)).collect();
            inserted += self.client.execute(&query, &params_dyn).await.map_err(|e| wrap("insert", e))?;
        }
        Ok(inserted)
    }

    async fn update(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, where_columns: &[String]) -> AnchorResult<u64> {
        let mut updated = 0u64;
        for row in rows {
            let set_columns: Vec<&String> = row.keys().filter(|c| !where_columns.contains(c)).collect();
            if set_columns.is_empty() {
                continue;
            }
            let mut param_index = 1;
            let set_clause = set_columns
                .iter()
                .map(|c| {
                    let clause = format!("{} = ${}", quote(c), param_index);
                    param_index += 1;
                    clause
                })
                .collect::<Vec<_>>()
                .join(", ");
            let where_clause = where_columns
                .iter()
                .map(|c| {
                    let clause = format!("{} = ${}", quote(c), param_index);
                    param_index += 1;
                    clause
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            let query = format!("UPDATE {} SET {set_clause} WHERE {where_clause}", quote(table));

            let mut values: Vec<PortableValue> = set_columns.iter().map(|c| row.get(*c).cloned().unwrap_or(PortableValue::Null)).collect();
            values.extend(where_columns.iter().map(|c| row.get(c).cloned().unwrap_or(PortableValue::Null)));
            let params: Vec<PgParam> = values.iter().map(PgParam).collect();
            let params_dyn: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params.iter().map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync)).collect();
            updated += self.client.execute(&query, &params_dyn).await.map_err(|e| wrap("update", e))?;
        }
        Ok(updated)
    }

    async fn upsert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, unique_columns: &[String]) -> AnchorResult<u64> {
        let mut upserted = 0u64;
        for row in rows {
            let columns: Vec<&String> = row.keys().collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
            let update_clause = columns
                .iter()
                .filter(|c| !unique_columns.contains(c))
                .map(|c| format!("{} = EXCLUDED.{}", quote(c), quote(c)))
                .collect::<Vec<_>>()
                .join(", ");
            let conflict_target = unique_columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
            let query = format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({conflict_target}) DO UPDATE SET {update_clause}",
                quote(table),
                columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
                placeholders.join(", "),
            );
            let values: Vec<PortableValue> = columns.iter().map(|c| row.get(*c).cloned().unwrap_or(PortableValue::Null)).collect();
            let params: Vec<PgParam> = values.iter().map(PgParam).collect();
            let params_dyn: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params.iter().map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync)).collect();
            upserted += self.client.execute(&query, &params_dyn).await.map_err(|e| wrap("upsert", e))?;
        }
        Ok(upserted)
    }

    async fn delete(&self, _ctx: &CallContext, table: &str, where_: &Row) -> AnchorResult<u64> {
        let columns: Vec<&String> = where_.keys().collect();
        let where_clause = columns.iter().enumerate().map(|(i, c)| format!("{} = ${}", quote(c), i + 1)).collect::<Vec<_>>().join(" AND ");
        let query = format!("DELETE FROM {} WHERE {where_clause}", quote(table));
        let values: Vec<PortableValue> = columns.iter().map(|c| where_.get(*c).cloned().unwrap_or(PortableValue::Null)).collect();
        let params: Vec<PgParam> = values.iter().map(PgParam).collect();
        let params_dyn: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params.iter().map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync)).collect();
        self.client.execute(&query, &params_dyn).await.map_err(|e| wrap("delete", e))
    }

    async fn stream(&self, ctx: &CallContext, params: StreamParams) -> AnchorResult<StreamResult> {
        let columns = params.columns.clone().unwrap_or_default();
        let limit = if params.batch_size == 0 { None } else { Some(params.batch_size) };
        let data = self.fetch_with_columns(ctx, &params.table, &columns, limit).await?;
        let has_more = limit.map(|n| data.len() as u64 >= n).unwrap_or(false);
        Ok(StreamResult {
            data,
            has_more,
            next_cursor: None,
        })
    }

    async fn execute_query(&self, _ctx: &CallContext, query: &str, args: &[PortableValue]) -> AnchorResult<Vec<Row>> {
        let params: Vec<PgParam> = args.iter().map(PgParam).collect();
        let params_dyn: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params.iter().map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync)).collect();
        let rows = self.client.query(query, &params_dyn).await.map_err(|e| wrap("execute_query", e))?;
        rows.iter().map(row_from_pg).collect()
    }

    async fn execute_count_query(&self, _ctx: &CallContext, query: &str) -> AnchorResult<i64> {
        let row = self.client.query_one(query, &[]).await.map_err(|e| wrap("execute_count_query", e))?;
        Ok(row.get(0))
    }

    async fn get_row_count(&self, _ctx: &CallContext, table: &str, where_clause: Option<&str>) -> AnchorResult<(i64, bool)> {
        let query = match where_clause {
            Some(clause) => format!("SELECT COUNT(*) FROM {} WHERE {clause}", quote(table)),
            None => format!("SELECT COUNT(*) FROM {}", quote(table)),
        };
        let row = self.client.query_one(&query, &[]).await.map_err(|e| wrap("get_row_count", e))?;
        Ok((row.get(0), true))
    }

    async fn wipe(&self, _ctx: &CallContext, table: &str) -> AnchorResult<()> {
        self.client
            .batch_execute(&format!("TRUNCATE TABLE {}", quote(table)))
            .await
            .map_err(|e| wrap("wipe", e))
    }
}

#[allow(dead_code)]
fn assert_indexmap_row_shape(_: &IndexMap<String, PortableValue>) {}
