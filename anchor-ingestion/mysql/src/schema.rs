//! Schema discovery and projection (§4.4) against
//! `information_schema.columns`/`.statistics`/`.table_constraints`/
//! `.key_column_usage`.

use std::sync::Arc;

use anchor_connector::{CallContext, SchemaOperator};
use anchor_types::{AnchorError, AnchorResult, BackendId, Column, Constraint, ConstraintKind, Index, IndexKind, Namespace, OnAction, Reference, Table, UnifiedModel};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Pool, Row as SqlRow};

pub struct MysqlSchemaOperator {
    pool: Arc<Pool>,
    database: String,
}

impl MysqlSchemaOperator {
    pub fn new(pool: Arc<Pool>, database: String) -> Self {
        MysqlSchemaOperator { pool, database }
    }
}

fn wrap(operation: &'static str, err: mysql_async::Error) -> AnchorError {
    AnchorError::wrapped(BackendId::MySql, operation, err)
}

fn get_string(row: &SqlRow, idx: usize) -> String {
    row.get::<Option<String>, _>(idx).flatten().unwrap_or_default()
}

fn on_action_from_sql(text: &str) -> OnAction {
    match text.to_uppercase().as_str() {
        "CASCADE" => OnAction::Cascade,
        "SET NULL" => OnAction::SetNull,
        "RESTRICT" => OnAction::Restrict,
        "SET DEFAULT" => OnAction::SetDefault,
        _ => OnAction::NoAction,
    }
}

#[async_trait]
impl SchemaOperator for MysqlSchemaOperator {
    async fn discover(&self, _ctx: &CallContext) -> AnchorResult<UnifiedModel> {
        let mut model = UnifiedModel::new();
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("discover_connect", e))?;

        model.namespaces.insert(
            self.database.clone(),
            Namespace {
                name: self.database.clone(),
                comment: None,
                replication_options: None,
            },
        );

        let column_rows: Vec<SqlRow> = conn
            .exec(
                "SELECT table_name, column_name, column_type, is_nullable, column_default, extra \
                 FROM information_schema.columns WHERE table_schema = ? ORDER BY table_name, ordinal_position",
                (&self.database,),
            )
            .await
            .map_err(|e| wrap("discover_columns", e))?;

        for row in &column_rows {
            let table_name = get_string(row, 0);
            let column_name = get_string(row, 1);
            let data_type = get_string(row, 2);
            let nullable = get_string(row, 3) == "YES";
            let default: Option<String> = row.get::<Option<String>, _>(4).flatten();
            let extra = get_string(row, 5);

            let key = format!("{}.{table_name}", self.database);
            let table = model.tables.entry(key).or_insert_with(|| Table {
                name: table_name.clone(),
                comment: None,
                columns: Vec::new(),
                indexes: Vec::new(),
                constraints: Vec::new(),
                options: Default::default(),
            });
            table.columns.push(Column {
                name: column_name,
                data_type,
                nullable,
                default,
                is_primary_key: false,
                auto_increment: extra.contains("auto_increment"),
                options: Default::default(),
            });
        }

        let index_rows: Vec<SqlRow> = conn
            .exec(
                "SELECT table_name, index_name, column_name, non_unique \
                 FROM information_schema.statistics WHERE table_schema = ? AND index_name != 'PRIMARY' \
                 ORDER BY table_name, index_name, seq_in_index",
                (&self.database,),
            )
            .await
            .map_err(|e| wrap("discover_indexes", e))?;
        for row in &index_rows {
            let table_name = get_string(row, 0);
            let index_name = get_string(row, 1);
            let column_name = get_string(row, 2);
            let non_unique: i64 = row.get(3).unwrap_or(1);
            let key = format!("{}.{table_name}", self.database);
            if let Some(table) = model.tables.get_mut(&key) {
                if let Some(existing) = table.indexes.iter_mut().find(|i| i.name == index_name) {
                    existing.columns.push(column_name);
                } else {
                    table.indexes.push(Index {
                        name: index_name,
                        columns: vec![column_name],
                        unique: non_unique == 0,
                        kind: IndexKind::BTree,
                    });
                }
            }
        }

        let pk_rows: Vec<SqlRow> = conn
            .exec(
                "SELECT table_name, column_name FROM information_schema.key_column_usage \
                 WHERE table_schema = ? AND constraint_name = 'PRIMARY' ORDER BY table_name, ordinal_position",
                (&self.database,),
            )
            .await
            .map_err(|e| wrap("discover_primary_keys", e))?;
        for row in &pk_rows {
            let table_name = get_string(row, 0);
            let column_name = get_string(row, 1);
            let key = format!("{}.{table_name}", self.database);
            if let Some(table) = model.tables.get_mut(&key) {
                if let Some(column) = table.columns.iter_mut().find(|c| c.name == column_name) {
                    column.is_primary_key = true;
                }
                if let Some(constraint) = table.constraints.iter_mut().find(|c| c.kind == ConstraintKind::PrimaryKey) {
                    constraint.columns.push(column_name);
                } else {
                    table.constraints.push(Constraint {
                        name: format!("{table_name}_pk"),
                        kind: ConstraintKind::PrimaryKey,
                        columns: vec![column_name],
                        reference: None,
                        expression: None,
                    });
                }
            }
        }

        let fk_rows: Vec<SqlRow> = conn
            .exec(
                "SELECT k.table_name, k.constraint_name, k.column_name, k.referenced_table_name, \
                        k.referenced_column_name, r.update_rule, r.delete_rule \
                 FROM information_schema.key_column_usage k \
                 JOIN information_schema.referential_constraints r \
                   ON k.constraint_name = r.constraint_name AND k.table_schema = r.constraint_schema \
                 WHERE k.table_schema = ? AND k.referenced_table_name IS NOT NULL \
                 ORDER BY k.table_name, k.constraint_name, k.ordinal_position",
                (&self.database,),
            )
            .await
            .map_err(|e| wrap("discover_foreign_keys", e))?;
        for row in &fk_rows {
            let table_name = get_string(row, 0);
            let constraint_name = get_string(row, 1);
            let column_name = get_string(row, 2);
            let referenced_table = get_string(row, 3);
            let referenced_column = get_string(row, 4);
            let update_rule = get_string(row, 5);
            let delete_rule = get_string(row, 6);
            let key = format!("{}.{table_name}", self.database);
            if let Some(table) = model.tables.get_mut(&key) {
                if let Some(existing) = table.constraints.iter_mut().find(|c| c.name == constraint_name) {
                    existing.columns.push(column_name);
                    if let Some(reference) = existing.reference.as_mut() {
                        reference.columns.push(referenced_column);
                    }
                } else {
                    table.constraints.push(Constraint {
                        name: constraint_name,
                        kind: ConstraintKind::ForeignKey,
                        columns: vec![column_name],
                        reference: Some(Reference {
                            table: format!("{}.{referenced_table}", self.database),
                            columns: vec![referenced_column],
                            on_update: on_action_from_sql(&update_rule),
                            on_delete: on_action_from_sql(&delete_rule),
                        }),
                        expression: None,
                    });
                }
            }
        }

        Ok(model)
    }

    async fn create_structure(&self, _ctx: &CallContext, model: &UnifiedModel) -> AnchorResult<()> {
        let plan = model.creation_order();
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("create_structure_connect", e))?;

        for (key, table) in &plan.tables {
            let table_name = key.split_once('.').map(|(_, t)| t).unwrap_or(&table.name);
            let columns_ddl = table
                .columns
                .iter()
                .map(|c| {
                    let mut ddl = format!("{} {}", self.quote_identifier(&c.name), c.data_type);
                    if !c.nullable {
                        ddl.push_str(" NOT NULL");
                    }
                    if c.auto_increment {
                        ddl.push_str(" AUTO_INCREMENT");
                    }
                    ddl
                })
                .collect::<Vec<_>>()
                .join(", ");
            let pk_columns: Vec<String> = table.columns.iter().filter(|c| c.is_primary_key).map(|c| self.quote_identifier(&c.name)).collect();
            let pk_clause = if pk_columns.is_empty() { String::new() } else { format!(", PRIMARY KEY ({})", pk_columns.join(", ")) };
            let ddl = format!("CREATE TABLE IF NOT EXISTS {}.{} ({columns_ddl}{pk_clause})", self.quote_identifier(&self.database), self.quote_identifier(table_name));
            conn.query_drop(ddl).await.map_err(|e| wrap("create_table", e))?;
        }

        for (table_key, constraint) in &plan.deferred_foreign_keys {
            let Some(reference) = &constraint.reference else { continue };
            let table_name = table_key.split_once('.').map(|(_, t)| t).unwrap_or(table_key);
            let referenced_table = reference.table.split_once('.').map(|(_, t)| t).unwrap_or(reference.table.as_str());
            let ddl = format!(
                "ALTER TABLE {}.{} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}.{} ({})",
                self.quote_identifier(&self.database),
                self.quote_identifier(table_name),
                self.quote_identifier(&constraint.name),
                constraint.columns.iter().map(|c| self.quote_identifier(c)).collect::<Vec<_>>().join(", "),
                self.quote_identifier(&self.database),
                self.quote_identifier(referenced_table),
                reference.columns.iter().map(|c| self.quote_identifier(c)).collect::<Vec<_>>().join(", "),
            );
            conn.query_drop(ddl).await.map_err(|e| wrap("create_foreign_key", e))?;
        }

        if !model.sequences.is_empty() {
            return Err(AnchorError::unsupported(BackendId::MySql, "create_sequences", "MySQL has no sequence object; use AUTO_INCREMENT"));
        }

        Ok(())
    }

    async fn list_tables(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        let mut conn = self.pool.get_conn().await.map_err(|e| wrap("list_tables_connect", e))?;
        let rows: Vec<String> = conn
            .exec("SELECT table_name FROM information_schema.tables WHERE table_schema = ?", (&self.database,))
            .await
            .map_err(|e| wrap("list_tables", e))?;
        Ok(rows.into_iter().map(|name| format!("{}.{name}", self.database)).collect())
    }

    async fn get_table_schema(&self, ctx: &CallContext, name: &str) -> AnchorResult<Option<Table>> {
        let model = self.discover(ctx).await?;
        Ok(model.tables.get(name).cloned())
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}
