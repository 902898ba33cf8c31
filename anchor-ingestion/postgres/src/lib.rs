//! The Postgres backend adapter (C4): full Schema/Data/Metadata operators
//! plus the native logical-replication driver sketched in §4.5.1.

pub mod connection;
pub mod data;
pub mod metadata;
pub mod replication;
pub mod schema;
pub mod values;

pub use connection::{build_pg_config, PostgresAdapter, PostgresDatabaseConnection, PostgresInstanceConnection};
pub use data::PostgresDataOperator;
pub use metadata::PostgresMetadataOperator;
pub use replication::{PostgresReplicationOperator, PostgresReplicationSource};
pub use schema::PostgresSchemaOperator;
