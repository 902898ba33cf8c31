//! The Data operator facet against a plain MySQL table, built with
//! parameterized SQL and the shared backtick-quoting rule (§4.4, §4.5.2
//! "Tombstone policy" for the `delete` predicate).

use std::sync::Arc;

use anchor_connector::{CallContext, DataOperator, StreamParams, StreamResult};
use anchor_types::{AnchorError, AnchorResult, BackendId, PortableValue, Row};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Params, Pool};

use crate::values::{mysql_to_portable, portable_to_mysql};

pub struct MysqlDataOperator {
    pool: Arc<Pool>,
}

impl MysqlDataOperator {
    pub fn new(pool: Arc<Pool>) -> Self {
        MysqlDataOperator { pool }
    }
}

fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn wrap(operation: &'static str, err: mysql_async::Error) -> AnchorError {
    AnchorError::wrapped(BackendId::MySql, operation, err)
}

fn row_from_sql(sql_row: mysql_async::Row) -> Row {
    let columns = sql_row.columns();
    let mut row = Row::new();
    for (index, column) in columns.iter().enumerate() {
        let value = sql_row.as_ref(index).cloned().unwrap_or(mysql_async::Value::NULL);
        row.insert(column.name_str().to_string(), mysql_to_portable(&value));
    }
    row
}

#[async_trait]
impl DataOperator for MysqlDataOperator {
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
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("fetch", e))?;
        let rows: Vec<mysql_async::Row> = conn.query(query).await.map_err(|e| wrap("fetch", e))?;
        Ok(rows.into_iter().map(row_from_sql).collect())
    }

    async fn insert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>) -> AnchorResult<u64> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("insert", e))?;
        let mut inserted = 0u64;
        for row in rows {
            let columns: Vec<&String> = row.keys().collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let query = format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quote(table),
                columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            );
            let values: Vec<mysql_async::Value> = columns.iter().map(|c| portable_to_mysql(row.get(*c).unwrap_or(&PortableValue::Null))).collect();
            conn.exec_drop(query, Params::Positional(values)).await.map_err(|e| wrap("insert", e))?;
            inserted += conn.affected_rows();
        }
        Ok(inserted)
    }

    async fn update(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, where_columns: &[String]) -> AnchorResult<u64> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("update", e))?;
        let mut updated = 0u64;
        for row in rows {
            let set_columns: Vec<&String> = row.keys().filter(|c| !where_columns.contains(c)).collect();
            if set_columns.is_empty() {
                continue;
            }
            let set_clause = set_columns.iter().map(|c| format!("{} = ?", quote(c))).collect::<Vec<_>>().join(", ");
            let where_clause = where_columns.iter().map(|c| format!("{} = ?", quote(c))).collect::<Vec<_>>().join(" AND ");
            let query = format!("UPDATE {} SET {set_clause} WHERE {where_clause}", quote(table));

            let mut values: Vec<mysql_async::Value> = set_columns.iter().map(|c| portable_to_mysql(row.get(*c).unwrap_or(&PortableValue::Null))).collect();
            values.extend(where_columns.iter().map(|c| portable_to_mysql(row.get(c).unwrap_or(&PortableValue::Null))));
            conn.exec_drop(query, Params::Positional(values)).await.map_err(|e| wrap("update", e))?;
            updated += conn.affected_rows();
        }
        Ok(updated)
    }

    async fn upsert(&self, _ctx: &CallContext, table: &str, rows: Vec<Row>, unique_columns: &[String]) -> AnchorResult<u64> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("upsert", e))?;
        let mut upserted = 0u64;
        for row in rows {
            let columns: Vec<&String> = row.keys().collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let update_clause = columns
                .iter()
                .filter(|c| !unique_columns.contains(c))
                .map(|c| format!("{} = VALUES({})", quote(c), quote(c)))
                .collect::<Vec<_>>()
                .join(", ");
            let query = format!(
                "INSERT INTO {} ({}) VALUES ({placeholders}) ON DUPLICATE KEY UPDATE {update_clause}",
                quote(table),
                columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            );
            let values: Vec<mysql_async::Value> = columns.iter().map(|c| portable_to_mysql(row.get(*c).unwrap_or(&PortableValue::Null))).collect();
            conn.exec_drop(query, Params::Positional(values)).await.map_err(|e| wrap("upsert", e))?;
            upserted += conn.affected_rows();
        }
        Ok(upserted)
    }

    async fn delete(&self, _ctx: &CallContext, table: &str, where_: &Row) -> AnchorResult<u64> {
        let columns: Vec<&String> = where_.keys().collect();
        if columns.is_empty() {
            return Err(AnchorError::invalid_data(BackendId::MySql, "delete", "no WHERE conditions for DELETE"));
        }
        let where_clause = columns.iter().map(|c| format!("{} = ?", quote(c))).collect::<Vec<_>>().join(" AND ");
        let query = format!("DELETE FROM {} WHERE {where_clause}", quote(table));
        let values: Vec<mysql_async::Value> = columns.iter().map(|c| portable_to_mysql(where_.get(*c).unwrap_or(&PortableValue::Null))).collect();
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("delete", e))?;
        conn.exec_drop(query, Params::Positional(values)).await.map_err(|e| wrap("delete", e))?;
        Ok(conn.affected_rows())
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
        let values: Vec<mysql_async::Value> = args.iter().map(portable_to_mysql).collect();
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("execute_query", e))?;
        let rows: Vec<mysql_async::Row> = conn.exec(query, Params::Positional(values)).await.map_err(|e| wrap("execute_query", e))?;
        Ok(rows.into_iter().map(row_from_sql).collect())
    }

    async fn execute_count_query(&self, _ctx: &CallContext, query: &str) -> AnchorResult<i64> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("execute_count_query", e))?;
        let value: Option<i64> = conn.query_first(query).await.map_err(|e| wrap("execute_count_query", e))?;
        Ok(value.unwrap_or(0))
    }

    async fn get_row_count(&self, _ctx: &CallContext, table: &str, where_clause: Option<&str>) -> AnchorResult<(i64, bool)> {
        let query = match where_clause {
            Some(clause) => format!("SELECT COUNT(*) FROM {} WHERE {clause}", quote(table)),
            None => format!("SELECT COUNT(*) FROM {}", quote(table)),
        };
        Ok((self.execute_count_query(_ctx, &query).await?, true))
    }

    async fn wipe(&self, _ctx: &CallContext, table: &str) -> AnchorResult<()> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("wipe", e))?;
        conn.query_drop(format!("TRUNCATE TABLE {}", quote(table))).await.map_err(|e| wrap("wipe", e))
    }
}
