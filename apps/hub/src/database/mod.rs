/// Durable store for the hub
///
/// Validators, monitored sites and the ticks validators report. The hub
/// core only talks to the [`Store`] trait; [`LibsqlStore`] is the libsql
/// implementation used in production and tests.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{LibsqlStore, Store};

use anyhow::Result;

use crate::pool::{LibsqlPool, open_pool};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the database at `path`, migrate it and return a store over it
pub async fn open_store(path: &str) -> Result<LibsqlStore> {
    let pool: LibsqlPool = open_pool(path).await?;
    {
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
    }
    Ok(LibsqlStore::new_from_pool(pool))
}
