//! Schema discovery and projection (§4.4) against Cassandra's
//! `system_schema` keyspace, filtering out the `system%` built-in
//! keyspaces per the spec's namespace-filtering rule.

use std::sync::Arc;

use anchor_connector::{CallContext, SchemaOperator};
use anchor_types::{AnchorError, AnchorResult, BackendId, Column, Index, Namespace, Table, UnifiedModel};
use async_trait::async_trait;
use scylla::Session;

pub struct CassandraSchemaOperator {
    session: Arc<Session>,
}

impl CassandraSchemaOperator {
    pub fn new(session: Arc<Session>) -> Self {
        CassandraSchemaOperator { session }
    }
}

fn wrap(operation: &'static str, err: impl std::error::Error + Send + Sync + 'static) -> AnchorError {
    AnchorError::wrapped(BackendId::Cassandra, operation, err)
}

fn is_builtin_keyspace(name: &str) -> bool {
    name.starts_with("system")
}

#[async_trait]
impl SchemaOperator for CassandraSchemaOperator {
    async fn discover(&self, _ctx: &CallContext) -> AnchorResult<UnifiedModel> {
        let mut model = UnifiedModel::new();

        let keyspace_result = self
            .session
            .query_unpaged("SELECT keyspace_name, replication FROM system_schema.keyspaces", &[])
            .await
            .map_err(|e| wrap("discover_keyspaces", e))?;
        let keyspace_rows = keyspace_result.rows.unwrap_or_default();
        for row in &keyspace_rows {
            let name: String = row.columns[0].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            if is_builtin_keyspace(&name) {
                continue;
            }
            model.namespaces.insert(
                name.clone(),
                Namespace {
                    name,
                    comment: None,
                    replication_options: None,
                },
            );
        }

        let column_result = self
            .session
            .query_unpaged(
                "SELECT keyspace_name, table_name, column_name, type, kind, clustering_order \
                 FROM system_schema.columns",
                &[],
            )
            .await
            .map_err(|e| wrap("discover_columns", e))?;
        let column_rows = column_result.rows.unwrap_or_default();
        for row in &column_rows {
            let keyspace: String = row.columns[0].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            if is_builtin_keyspace(&keyspace) || !model.namespaces.contains_key(&keyspace) {
                continue;
            }
            let table_name: String = row.columns[1].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            let column_name: String = row.columns[2].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            let data_type: String = row.columns[3].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            let kind: String = row.columns[4].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();

            let key = format!("{keyspace}.{table_name}");
            let table = model.tables.entry(key).or_insert_with(|| Table {
                name: table_name.clone(),
                comment: None,
                columns: Vec::new(),
                indexes: Vec::new(),
                constraints: Vec::new(),
                options: Default::default(),
            });
            let is_key_column = kind == "partition_key" || kind == "clustering";
            table.columns.push(Column {
                name: column_name,
                data_type,
                // Cassandra has no nullable flag at the catalog level;
                // every non-key column is implicitly nullable.
                nullable: !is_key_column,
                default: None,
                is_primary_key: is_key_column,
                auto_increment: false,
                options: Default::default(),
            });
        }

        // Cassandra has no separate PrimaryKey constraint catalog entity;
        // the primary key is expressed entirely through column `kind`, so
        // a single synthetic PrimaryKey constraint per table keeps the
        // Unified Model's invariant (a) satisfied (every `is_primary_key`
        // column is a member of exactly one PrimaryKey constraint).
        for (key, table) in model.tables.iter_mut() {
            let pk_columns: Vec<String> = table.columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect();
            if !pk_columns.is_empty() {
                table.constraints.push(anchor_types::Constraint {
                    name: format!("{}_pk", key.replace('.', "_")),
                    kind: anchor_types::ConstraintKind::PrimaryKey,
                    columns: pk_columns,
                    reference: None,
                    expression: None,
                });
            }
        }

        let index_result = self
            .session
            .query_unpaged("SELECT keyspace_name, table_name, index_name, options FROM system_schema.indexes", &[])
            .await
            .map_err(|e| wrap("discover_indexes", e))?;
        for row in index_result.rows.unwrap_or_default() {
            let keyspace: String = row.columns[0].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            if is_builtin_keyspace(&keyspace) {
                continue;
            }
            let table_name: String = row.columns[1].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            let index_name: String = row.columns[2].as_ref().and_then(|v| v.as_text().cloned()).unwrap_or_default();
            let key = format!("{keyspace}.{table_name}");
            if let Some(table) = model.tables.get_mut(&key) {
                table.indexes.push(Index {
                    name: index_name,
                    columns: Vec::new(),
                    unique: false,
                    kind: anchor_types::IndexKind::Other("secondary".to_string()),
                });
            }
        }

        Ok(model)
    }

    async fn create_structure(&self, _ctx: &CallContext, model: &UnifiedModel) -> AnchorResult<()> {
        let plan = model.creation_order();

        for namespace in &plan.namespaces {
            let quoted = self.quote_identifier(&namespace.name);
            let replication = namespace
                .replication_options
                .as_ref()
                .map(|_| "{'class': 'SimpleStrategy', 'replication_factor': 1}".to_string())
                .unwrap_or_else(|| "{'class': 'SimpleStrategy', 'replication_factor': 1}".to_string());
            let ddl = format!("CREATE KEYSPACE IF NOT EXISTS {quoted} WITH replication = {replication}");
            self.session.query_unpaged(ddl, &[]).await.map_err(|e| wrap("create_keyspace", e))?;
        }

        for (key, table) in &plan.tables {
            let (keyspace, table_name) = key.split_once('.').unwrap_or((key.as_str(), table.name.as_str()));
            let quoted_keyspace = self.quote_identifier(keyspace);
            let quoted_table = self.quote_identifier(table_name);
            let columns_ddl = table
                .columns
                .iter()
                .map(|c| format!("{} {}", self.quote_identifier(&c.name), c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            let pk_columns: Vec<String> = table.columns.iter().filter(|c| c.is_primary_key).map(|c| self.quote_identifier(&c.name)).collect();
            if pk_columns.is_empty() {
                return Err(AnchorError::invalid_data(
                    BackendId::Cassandra,
                    "create_structure",
                    format!("table {key} has no primary/clustering key column — Cassandra requires one"),
                ));
            }
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {quoted_keyspace}.{quoted_table} ({columns_ddl}, PRIMARY KEY ({}))",
                pk_columns.join(", ")
            );
            self.session.query_unpaged(ddl, &[]).await.map_err(|e| wrap("create_table", e))?;
        }

        // Sequences, check constraints, and triggers have no first-class
        // Cassandra equivalent (§4.4): a caller asking for them gets
        // `Unsupported` rather than a silently-skipped no-op.
        if !model.sequences.is_empty() {
            return Err(AnchorError::unsupported(BackendId::Cassandra, "create_sequences", "Cassandra has no sequence concept"));
        }
        if plan.triggers.iter().next().is_some() {
            return Err(AnchorError::unsupported(BackendId::Cassandra, "create_triggers", "Cassandra triggers are not managed by this adapter"));
        }

        Ok(())
    }

    async fn list_tables(&self, _ctx: &CallContext) -> AnchorResult<Vec<String>> {
        let result = self
            .session
            .query_unpaged("SELECT keyspace_name, table_name FROM system_schema.tables", &[])
            .await
            .map_err(|e| wrap("list_tables", e))?;
        Ok(result
            .rows
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                let keyspace = row.columns[0].as_ref()?.as_text()?.clone();
                if is_builtin_keyspace(&keyspace) {
                    return None;
                }
                let table = row.columns[1].as_ref()?.as_text()?.clone();
                Some(format!("{keyspace}.{table}"))
            })
            .collect())
    }

    async fn get_table_schema(&self, ctx: &CallContext, name: &str) -> AnchorResult<Option<Table>> {
        let model = self.discover(ctx).await?;
        Ok(model.tables.get(name).cloned())
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
