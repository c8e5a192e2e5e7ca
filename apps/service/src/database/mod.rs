/// Database abstraction layer
///
/// Unified interface over the libsql store shared with the management
/// layer: monitors and channels in, checks and incidents out.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
