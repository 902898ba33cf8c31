//! The Cassandra backend adapter (C4): Schema/Data/Metadata operators over
//! `system_schema`, and a Replication operator that always runs through
//! the shared polling-diff driver (§9 `requires_polling_cdc`).

pub mod connection;
pub mod data;
pub mod metadata;
pub mod replication;
pub mod schema;
pub mod values;

pub use connection::{CassandraAdapter, CassandraDatabaseConnection, CassandraInstanceConnection};
pub use data::CassandraDataOperator;
pub use metadata::CassandraMetadataOperator;
pub use replication::CassandraReplicationOperator;
pub use schema::CassandraSchemaOperator;
