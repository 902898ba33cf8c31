//! C2 — the Unified Model: a backend-neutral schema graph. All collections
//! are keyed by qualified name (`"<namespace>.<name>"`) so every group is a
//! mapping, per §3.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::capability::BackendId;
use crate::error::{AnchorError, AnchorResult};

pub type Options = IndexMap<String, serde_json::Value>;

/// Schema / Module / Keyspace — the namespace container (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Namespace {
    pub name: String,
    pub comment: Option<String>,
    pub replication_options: Option<Options>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    /// Backend-native type spelling (e.g. `"numeric(10,2)"`, `"VARCHAR(255)"`).
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub auto_increment: bool,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
    Gin,
    Gist,
    Vector,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub kind: IndexKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OnAction {
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
    NoAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub table: String,
    pub columns: Vec<String>,
    pub on_delete: OnAction,
    pub on_update: OnAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    pub reference: Option<Reference>,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub name: String,
    pub comment: Option<String>,
    /// Insertion order is significant (§3).
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub options: Options,
}

impl Table {
    pub fn qualified_key(&self, namespace: &str) -> String {
        format!("{namespace}.{}", self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub start: i64,
    pub increment: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub cycle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TypeCategory {
    Scalar,
    Enum,
    Composite,
    Alias,
    Object,
    UserDefined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Type {
    pub name: String,
    pub category: TypeCategory,
    #[serde(default)]
    pub definition: Options,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Function {
    pub name: String,
    pub language: String,
    pub body: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub language: String,
    pub body: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extension {
    pub name: String,
    pub language: String,
    pub body: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterializedView {
    pub name: String,
    pub language: String,
    pub body: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// The full backend-neutral schema graph discovered from, or to be
/// projected onto, one backend (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UnifiedModel {
    pub namespaces: IndexMap<String, Namespace>,
    /// Keyed by `"<namespace>.<table>"`.
    pub tables: IndexMap<String, Table>,
    pub sequences: IndexMap<String, Sequence>,
    pub types: IndexMap<String, Type>,
    pub functions: IndexMap<String, Function>,
    pub triggers: IndexMap<String, Trigger>,
    pub extensions: IndexMap<String, Extension>,
    pub materialized_views: IndexMap<String, MaterializedView>,
}

impl UnifiedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks invariants (a)-(d) from §3. Called by adapters after
    /// `discover()` assembles a model, and by tests validating round-trips.
    pub fn validate(&self, backend: BackendId) -> AnchorResult<()> {
        for (key, table) in &self.tables {
            // (a) every PK column belongs to exactly one PrimaryKey constraint.
            let pk_constraints: Vec<&Constraint> = table
                .constraints
                .iter()
                .filter(|c| c.kind == ConstraintKind::PrimaryKey)
                .collect();
            if pk_constraints.len() > 1 {
                return Err(AnchorError::invalid_data(
                    backend,
                    "validate_model",
                    format!("table {key} has {} primary key constraints", pk_constraints.len()),
                ));
            }
            let pk_columns: Vec<&str> = pk_constraints
                .first()
                .map(|c| c.columns.iter().map(String::as_str).collect())
                .unwrap_or_default();
            for column in &table.columns {
                if column.is_primary_key && !pk_columns.contains(&column.name.as_str()) {
                    return Err(AnchorError::invalid_data(
                        backend,
                        "validate_model",
                        format!(
                            "column {key}.{} is marked primary key but is not a member of the table's PrimaryKey constraint",
                            column.name
                        ),
                    ));
                }
            }

            // (c) index columns are a subset of the table's columns.
            for index in &table.indexes {
                for col in &index.columns {
                    if table.column(col).is_none() {
                        return Err(AnchorError::invalid_data(
                            backend,
                            "validate_model",
                            format!("index {key}.{} references unknown column {col}", index.name),
                        ));
                    }
                }
            }

            // (b) FK targets resolve within the same model.
            for constraint in &table.constraints {
                if constraint.kind == ConstraintKind::ForeignKey {
                    let Some(reference) = &constraint.reference else {
                        return Err(AnchorError::invalid_data(
                            backend,
                            "validate_model",
                            format!("foreign key {key}.{} has no reference", constraint.name),
                        ));
                    };
                    if !self.tables.contains_key(&reference.table) && !self
                        .tables
                        .values()
                        .any(|t| t.name == reference.table)
                    {
                        return Err(AnchorError::invalid_data(
                            backend,
                            "validate_model",
                            format!(
                                "foreign key {key}.{} references table {} which is not present in the model",
                                constraint.name, reference.table
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Dependency order for `create_structure` per §4.4 / §9 ("cyclic
    /// schema references"): tables are emitted without foreign keys first;
    /// the returned constraint list is the deferred second pass.
    pub fn creation_order(&self) -> CreationPlan<'_> {
        let mut deferred_fks = Vec::new();
        for (key, table) in &self.tables {
            for constraint in &table.constraints {
                if constraint.kind == ConstraintKind::ForeignKey {
                    deferred_fks.push((key.as_str(), constraint));
                }
            }
        }
        CreationPlan {
            namespaces: self.namespaces.values().collect(),
            types: self.types.values().collect(),
            sequences: self.sequences.values().collect(),
            tables: self.tables.iter().collect(),
            deferred_foreign_keys: deferred_fks,
            functions: self.functions.values().collect(),
            triggers: self.triggers.values().collect(),
            materialized_views: self.materialized_views.values().collect(),
        }
    }
}

/// The ordered plan `create_structure` walks: schemas -> types -> sequences
/// -> tables (without FKs) -> indexes -> [deferred] FK constraints ->
/// functions -> triggers -> views (§4.4).
pub struct CreationPlan<'a> {
    pub namespaces: Vec<&'a Namespace>,
    pub types: Vec<&'a Type>,
    pub sequences: Vec<&'a Sequence>,
    pub tables: Vec<(&'a String, &'a Table)>,
    pub deferred_foreign_keys: Vec<(&'a str, &'a Constraint)>,
    pub functions: Vec<&'a Function>,
    pub triggers: Vec<&'a Trigger>,
    pub materialized_views: Vec<&'a MaterializedView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table {
            name: "users".into(),
            comment: None,
            columns: vec![Column {
                name: "id".into(),
                data_type: "bigint".into(),
                nullable: false,
                default: None,
                is_primary_key: true,
                auto_increment: true,
                options: Options::default(),
            }],
            indexes: vec![],
            constraints: vec![Constraint {
                name: "users_pk".into(),
                kind: ConstraintKind::PrimaryKey,
                columns: vec!["id".into()],
                reference: None,
                expression: None,
            }],
            options: Options::default(),
        }
    }

    #[test]
    fn valid_model_passes() {
        let mut model = UnifiedModel::new();
        model.tables.insert("public.users".into(), sample_table());
        model.validate(BackendId::Postgres).unwrap();
    }

    #[test]
    fn pk_column_without_constraint_membership_is_rejected() {
        let mut model = UnifiedModel::new();
        let mut table = sample_table();
        table.constraints.clear();
        model.tables.insert("public.users".into(), table);
        assert!(model.validate(BackendId::Postgres).is_err());
    }

    #[test]
    fn dangling_foreign_key_is_rejected() {
        let mut model = UnifiedModel::new();
        let mut table = sample_table();
        table.constraints.push(Constraint {
            name: "fk_org".into(),
            kind: ConstraintKind::ForeignKey,
            columns: vec!["id".into()],
            reference: Some(Reference {
                table: "orgs".into(),
                columns: vec!["id".into()],
                on_delete: OnAction::Cascade,
                on_update: OnAction::NoAction,
            }),
            expression: None,
        });
        model.tables.insert("public.users".into(), table);
        assert!(model.validate(BackendId::Postgres).is_err());
    }

    #[test]
    fn index_columns_must_be_subset_of_table_columns() {
        let mut model = UnifiedModel::new();
        let mut table = sample_table();
        table.indexes.push(Index {
            name: "ix_missing".into(),
            columns: vec!["not_a_column".into()],
            unique: false,
            kind: IndexKind::BTree,
        });
        model.tables.insert("public.users".into(), table);
        assert!(model.validate(BackendId::Postgres).is_err());
    }
}
