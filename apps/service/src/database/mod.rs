/// Database abstraction layer
///
/// This module provides a unified interface for monitor and history storage,
/// backed either by a local LibSQL file or by memory.
pub mod memory;
pub mod migrations;
pub mod models;
pub mod repository;


pub use memory::MemoryDatabase;
pub use models::{Monitor, MonitorPatch, NewMonitor};
pub use repository::{Database, LibsqlDatabase, MonitorRepository};

use anyhow::Result;
use deadpool::managed::{Pool, PoolConfig};
use std::sync::Arc;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Database path selecting the volatile in-memory backend
pub const MEMORY_PATH: &str = ":memory:";

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the configured database and bring its schema up to date
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Database>> {
    if config.path == MEMORY_PATH {
        info!("Using in-memory database, nothing will be persisted");
        return Ok(Arc::new(MemoryDatabase::new()));
    }

    if let Some(parent) = std::path::Path::new(&config.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = libsql::Builder::new_local(&config.path).build().await?;
    let pool: LibsqlPool = Pool::builder(LibsqlManager::new(db))
        .config(PoolConfig::new(config.max_connections))
        .build()?;

    let conn = pool.get().await?;
    initialize_database(&*conn).await?;
    drop(conn);

    info!(path = %config.path, "Database ready");
    Ok(Arc::new(LibsqlDatabase::new(pool)))
}
