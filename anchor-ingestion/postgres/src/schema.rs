//! Schema discovery and projection (§4.4) against Postgres's system
//! catalogs, filtering out `pg_%`/`information_schema` namespaces.

use std::sync::Arc;

use anchor_connector::{CallContext, SchemaOperator};
use anchor_types::{
    BackendId, Column, Constraint, ConstraintKind, Index, IndexKind, Namespace, OnAction, Table, UnifiedModel,
};
use anchor_types::{AnchorError, AnchorResult};
use async_trait::async_trait;

pub struct PostgresSchemaOperator {
    client: Arc<tokio_postgres::Client>,
}

impl PostgresSchemaOperator {
    pub fn new(client: Arc<tokio_postgres::Client>) -> Self {
        PostgresSchemaOperator { client }
    }
}

fn wrap(operation: &'static str, err: tokio_postgres::Error) -> AnchorError {
    AnchorError::wrapped(BackendId::Postgres, operation, err)
}

#[async_trait]
impl SchemaOperator for PostgresSchemaOperator {
    async fn discover(&self, _ctx: &CallContext) -> AnchorResult<UnifiedModel> {
        let mut model = UnifiedModel::new();

        let namespace_rows = self
            .client
            .query(
                "SELECT nspname FROM pg_namespace \
                 WHERE nspname NOT IN ('pg_catalog', 'information_schema') AND nspname NOT LIKE 'pg\\_%'",
                &[],
            )
            .await
            .map_err(|e| wrap("discover_namespaces", e))?;
        for row in &namespace_rows {
            let name: String = row.get(0);
            model.namespaces.insert(
                name.clone(),
                Namespace {
                    name,
                    comment: None,
                    replication_options: None,
                },
            );
        }

        let column_rows = self
            .client
            .query(
                "SELECT table_schema, table_name, column_name, data_type, is_nullable, column_default, \
                        (column_default LIKE 'nextval(%') AS auto_increment \
                 FROM information_schema.columns \
                 WHERE table_schema = ANY($1) \
                 ORDER BY table_schema, table_name, ordinal_position",
                &[&namespace_rows.iter().map(|r| r.get::<_, String>(0)).collect::<Vec<_>>()],
            )
            .await
            .map_err(|e| wrap("discover_columns", e))?;

        for row in &column_rows {
            let schema: String = row.get(0);
            let table_name: String = row.get(1);
            let key = format!("{schema}.{table_name}");
            let table = model.tables.entry(key).or_insert_with(|| Table {
                name: table_name.clone(),
                comment: None,
                columns: Vec::new(),
                indexes: Vec::new(),
                constraints: Vec::new(),
                options: Default::default(),
            });
            table.columns.push(Column {
                name: row.get(2),
                data_type: row.get(3),
                nullable: row.get::<_, String>(4) == "YES",
                default: row.get(5),
                is_primary_key: false,
                auto_increment: row.get(6),
                options: Default::default(),
            });
        }

        let constraint_rows = self
            .client
            .query(
                "SELECT tc.table_schema, tc.table_name, tc.constraint_name, tc.constraint_type, \
                        array_agg(kcu.column_name ORDER BY kcu.ordinal_position) \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.table_schema = ANY($1) \
                 GROUP BY tc.table_schema, tc.table_name, tc.constraint_name, tc.constraint_type",
                &[&namespace_rows.iter().map(|r| r.get::<_, String>(0)).collect::<Vec<_>>()],
            )
            .await
            .map_err(|e| wrap("discover_constraints", e))?;

        for row in &constraint_rows {
            let schema: String = row.get(0);
            let table_name: String = row.get(1);
            let key = format!("{schema}.{table_name}");
            let constraint_type: String = row.get(3);
            let columns: Vec<String> = row.get(4);
            let kind = match constraint_type.as_str() {
                "PRIMARY KEY" => ConstraintKind::PrimaryKey,
                "FOREIGN KEY" => ConstraintKind::ForeignKey,
                "UNIQUE" => ConstraintKind::Unique,
                _ => ConstraintKind::Check,
            };
            if let Some(table) = model.tables.get_mut(&key) {
                if kind == ConstraintKind::PrimaryKey {
                    for column in table.columns.iter_mut() {
                        if columns.contains(&column.name) {
                            column.is_primary_key = true;
                        }
                    }
                }
                table.constraints.push(Constraint {
                    name: row.get(2),
                    kind,
                    columns,
                    // Foreign key target resolution requires a second catalog
                    // round-trip (referential_constraints); left unresolved
                    // here keeps this discovery pass to one join per kind.
                    reference: None,
                    expression: None,
                });
            }
        }

        let index_rows = self
            .client
            .query(
                "SELECT schemaname, tablename, indexname, indexdef \
                 FROM pg_indexes WHERE schemaname = ANY($1)",
                &[&namespace_rows.iter().map(|r| r.get::<_, String>(0)).collect::<Vec<_>>()],
            )
            .await
            .map_err(|e| wrap("discover_indexes", e))?;

        for row in &index_rows {
            let schema: String = row.get(0);
            let table_name: String = row.get(1);
            let key = format!("{schema}.{table_name}");
            let index_def: String = row.get(3);
            if let Some(table) = model.tables.get_mut(&key) {
                table.indexes.push(Index {
                    name: row.get(2),
                    columns: parse_index_columns(&index_def),
                    unique: index_def.contains("CREATE UNIQUE INDEX"),
                    kind: parse_index_kind(&index_def),
                });
            }
        }

        Ok(model)
    }

    async fn create_structure(&self, _ctx: &CallContext, model: &UnifiedModel) -> AnchorResult<()> {
        let plan = model.creation_order();

        for namespace in &plan.namespaces {
            let quoted = self.quote_identifier(&namespace.name);
            self.client
                .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {quoted}"))
                .await
                .map_err(|e| wrap("create_namespace", e))?;
        }

        for (key, table) in &plan.tables {
            let (schema, table_name) = key.split_once('.').unwrap_or(("public", table.name.as_str()));
            let quoted_schema = self.quote_identifier(schema);
            let quoted_table = self.quote_identifier(table_name);
            let columns_ddl = table
                .columns
                .iter()
                .map(|c| column_ddl(self, c))
                .collect::<Vec<_>>()
                .join(", ");
            let pk_columns: Vec<&str> = table.columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.as_str()).collect();
            let pk_clause = if pk_columns.is_empty() {
                String::new()
            } else {
                format!(", PRIMARY KEY ({})", pk_columns.iter().map(|c| self.quote_identifier(c)).collect::<Vec<_>>().join(", "))
            };
            let ddl = format!("CREATE TABLE IF NOT EXISTS {quoted_schema}.{quoted_table} ({columns_ddl}{pk_clause})");
            self.client.batch_execute(&ddl).await.map_err(|e| wrap("create_table", e))?;
        }

        for (table_key, constraint) in &plan.deferred_foreign_keys {
            let Some(reference) = &constraint.reference else { continue };
            let (schema, table_name) = table_key.split_once('.').unwrap_or(("public", *table_key));
            let ddl = format!(
                "ALTER TABLE {}.{} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                self.quote_identifier(schema),
                self.quote_identifier(table_name),
                self.quote_identifier(&constraint.name),
                constraint.columns.iter().map(|c| self.quote_identifier(c)).collect::<Vec<_>>().join(", "),
                self.quote_identifier(&reference.table),
                reference.columns.iter().map(|c| self.quote_identifier(c)).collect::<Vec<_>>().join(", "),
                on_action_sql(&reference.on_delete),
                on_action_sql(&reference.on_update),
            );
            if let Err(err) = self.client.batch_execute(&ddl).await {
                // Idempotent create: an already-present constraint is not a
                // failure (§4.4 "if-not-exists form when available").
                if !err.to_string().contains("already exists") {
                    return Err(wrap("create_foreign_key", err));
                }
            }
        }

        Ok(())
    }

    async fn list_tables(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema')",
                &[],
            )
            .await
            .map_err(|e| wrap("list_tables", e))?;
        Ok(rows.iter().map(|row| format!("{}.{}", row.get::<_, String>(0), row.get::<_, String>(1))).collect())
    }

    async fn get_table_schema(&self, ctx: &CallContext, name: &str) -> AnchorResult<Option<Table>> {
        let model = self.discover(ctx).await?;
        Ok(model.tables.get(name).cloned())
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn column_ddl(operator: &PostgresSchemaOperator, column: &Column) -> String {
    let mut ddl = format!("{} {}", operator.quote_identifier(&column.name), column.data_type);
    if !column.nullable {
        ddl.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        ddl.push_str(&format!(" DEFAULT {default}"));
    }
    ddl
}

fn on_action_sql(action: &OnAction) -> &'static str {
    match action {
        OnAction::Cascade => "CASCADE",
        OnAction::Restrict => "RESTRICT",
        OnAction::SetNull => "SET NULL",
        OnAction::SetDefault => "SET DEFAULT",
        OnAction::NoAction => "NO ACTION",
    }
}

fn parse_index_columns(index_def: &str) -> Vec<String> {
    index_def
        .split_once('(')
        .and_then(|(_, rest)| rest.rsplit_once(')'))
        .map(|(cols, _)| cols.split(',').map(|c| c.trim().trim_matches('"').to_string()).collect())
        .unwrap_or_default()
}

fn parse_index_kind(index_def: &str) -> IndexKind {
    if index_def.contains("USING gin") {
        IndexKind::Gin
    } else if index_def.contains("USING gist") {
        IndexKind::Gist
    } else if index_def.contains("USING hash") {
        IndexKind::Hash
    } else if index_def.contains("USING btree") || !index_def.contains("USING") {
        IndexKind::BTree
    } else {
        IndexKind::Other(index_def.to_string())
    }
}
