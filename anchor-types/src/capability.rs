//! C1 — Capability Registry: a static map from backend id to feature flags
//! and driver hints. Pure data; per-operator code consults it before doing
//! expensive work so unsupported calls fail fast (§4.1, §8 "Capability
//! honesty").

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendId {
    Postgres,
    MySql,
    MariaDb,
    CockroachDb,
    SqlServer,
    Oracle,
    Db2,
    Cassandra,
    MongoDb,
    Redis,
    Elasticsearch,
    ClickHouse,
    Snowflake,
    Neo4j,
    EdgeDb,
    Pinecone,
    ApachePinot,
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Postgres => "postgres",
            BackendId::MySql => "mysql",
            BackendId::MariaDb => "mariadb",
            BackendId::CockroachDb => "cockroachdb",
            BackendId::SqlServer => "sqlserver",
            BackendId::Oracle => "oracle",
            BackendId::Db2 => "db2",
            BackendId::Cassandra => "cassandra",
            BackendId::MongoDb => "mongodb",
            BackendId::Redis => "redis",
            BackendId::Elasticsearch => "elasticsearch",
            BackendId::ClickHouse => "clickhouse",
            BackendId::Snowflake => "snowflake",
            BackendId::Neo4j => "neo4j",
            BackendId::EdgeDb => "edgedb",
            BackendId::Pinecone => "pinecone",
            BackendId::ApachePinot => "pinot",
        }
    }

    pub const ALL: &'static [BackendId] = &[
        BackendId::Postgres,
        BackendId::MySql,
        BackendId::MariaDb,
        BackendId::CockroachDb,
        BackendId::SqlServer,
        BackendId::Oracle,
        BackendId::Db2,
        BackendId::Cassandra,
        BackendId::MongoDb,
        BackendId::Redis,
        BackendId::Elasticsearch,
        BackendId::ClickHouse,
        BackendId::Snowflake,
        BackendId::Neo4j,
        BackendId::EdgeDb,
        BackendId::Pinecone,
        BackendId::ApachePinot,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Transactions,
    Streaming,
    Cdc,
    NativeCdc,
    SchemaDdl,
    Sequences,
    CheckConstraints,
    Triggers,
    VectorIndexes,
}

/// Feature flags and driver hints for one backend. Constructed once per
/// backend in [`CapabilitySet::registry`]; adapters hold a `'static`
/// reference rather than recomputing it.
#[derive(Debug, Clone, Copy)]
pub struct CapabilitySet {
    pub backend: BackendId,
    pub default_port: Option<u16>,
    transactions: bool,
    streaming: bool,
    cdc: bool,
    native_cdc: bool,
    schema_ddl: bool,
    sequences: bool,
    check_constraints: bool,
    triggers: bool,
    vector_indexes: bool,
}

impl CapabilitySet {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Transactions => self.transactions,
            Capability::Streaming => self.streaming,
            Capability::Cdc => self.cdc,
            Capability::NativeCdc => self.native_cdc,
            Capability::SchemaDdl => self.schema_ddl,
            Capability::Sequences => self.sequences,
            Capability::CheckConstraints => self.check_constraints,
            Capability::Triggers => self.triggers,
            Capability::VectorIndexes => self.vector_indexes,
        }
    }

    /// CDC is supported (possibly only via the shared polling-diff driver)
    /// whenever `cdc` is set, regardless of `native_cdc`.
    pub fn requires_polling_cdc(&self) -> bool {
        self.cdc && !self.native_cdc
    }

    pub fn for_backend(backend: BackendId) -> &'static CapabilitySet {
        registry()
            .iter()
            .find(|c| c.backend == backend)
            .expect("every BackendId has a registry entry")
    }
}

fn registry() -> &'static [CapabilitySet] {
    use BackendId::*;
    const REGISTRY: &[CapabilitySet] = &[
        CapabilitySet {
            backend: Postgres, default_port: Some(5432),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: true,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: MySql, default_port: Some(3306),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: true, sequences: false, check_constraints: true, triggers: true,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: MariaDb, default_port: Some(3306),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: true,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: CockroachDb, default_port: Some(26257),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: false,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: SqlServer, default_port: Some(1433),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: true,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: Oracle, default_port: Some(1521),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: true,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: Db2, default_port: Some(50000),
            transactions: true, streaming: true, cdc: false, native_cdc: false,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: true,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: Cassandra, default_port: Some(9042),
            transactions: false, streaming: true, cdc: true, native_cdc: false,
            schema_ddl: true, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: MongoDb, default_port: Some(27017),
            transactions: true, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: false, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: Redis, default_port: Some(6379),
            transactions: false, streaming: true, cdc: true, native_cdc: true,
            schema_ddl: false, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: Elasticsearch, default_port: Some(9200),
            transactions: false, streaming: true, cdc: false, native_cdc: false,
            schema_ddl: true, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: ClickHouse, default_port: Some(9000),
            transactions: false, streaming: true, cdc: false, native_cdc: false,
            schema_ddl: true, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: Snowflake, default_port: None,
            transactions: true, streaming: true, cdc: true, native_cdc: false,
            schema_ddl: true, sequences: true, check_constraints: false, triggers: false,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: Neo4j, default_port: Some(7687),
            transactions: true, streaming: true, cdc: false, native_cdc: false,
            schema_ddl: true, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: EdgeDb, default_port: Some(5656),
            transactions: true, streaming: true, cdc: true, native_cdc: false,
            schema_ddl: true, sequences: true, check_constraints: true, triggers: false,
            vector_indexes: false,
        },
        CapabilitySet {
            backend: Pinecone, default_port: None,
            transactions: false, streaming: false, cdc: false, native_cdc: false,
            schema_ddl: false, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: true,
        },
        CapabilitySet {
            backend: ApachePinot, default_port: Some(8099),
            transactions: false, streaming: true, cdc: true, native_cdc: false,
            schema_ddl: true, sequences: false, check_constraints: false, triggers: false,
            vector_indexes: false,
        },
    ];
    REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_backend_id_has_a_registry_entry() {
        for backend in BackendId::ALL {
            let _ = CapabilitySet::for_backend(*backend);
        }
    }

    #[test]
    fn cassandra_requires_polling_cdc() {
        let caps = CapabilitySet::for_backend(BackendId::Cassandra);
        assert!(caps.supports(Capability::Cdc));
        assert!(caps.requires_polling_cdc());
    }

    #[test]
    fn postgres_has_native_cdc() {
        let caps = CapabilitySet::for_backend(BackendId::Postgres);
        assert!(!caps.requires_polling_cdc());
    }

    #[test]
    fn pinecone_has_no_transactional_or_schema_ddl_surface() {
        let caps = CapabilitySet::for_backend(BackendId::Pinecone);
        assert!(!caps.supports(Capability::Transactions));
        assert!(!caps.supports(Capability::SchemaDdl));
    }
}
