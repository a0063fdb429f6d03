//! Database layer
//!
//! libsql-backed implementations of the engine's storage collaborators:
//! the incident history and the monitor snapshot cache.

pub mod migrations;
pub mod repository;

pub use repository::{LibsqlIncidentStore, LibsqlSnapshotCache};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
