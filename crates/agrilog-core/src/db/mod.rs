//! Local store: connection, schema, and repositories

mod config_repository;
mod connection;
mod dashboard_repository;
mod field_repository;
pub mod migrations;
mod record_repository;

pub use config_repository::{ConfigRepository, LibSqlConfigRepository};
pub use connection::Database;
pub use dashboard_repository::LibSqlDashboardRepository;
pub use field_repository::{LibSqlFieldRepository, BULK_INSERT_CHUNK};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
