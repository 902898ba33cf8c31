//! The MySQL/MariaDB backend adapter (C4): Schema/Data/Metadata operators
//! over `information_schema`, and a Replication operator that runs through
//! the shared polling-diff driver in this build (see design notes on the
//! binlog driver being out of scope).

pub mod connection;
pub mod data;
pub mod metadata;
pub mod replication;
pub mod schema;
pub mod values;

pub use connection::{MysqlAdapter, MysqlDatabaseConnection, MysqlInstanceConnection};
pub use data::MysqlDataOperator;
pub use metadata::MysqlMetadataOperator;
pub use replication::MysqlReplicationOperator;
pub use schema::MysqlSchemaOperator;
