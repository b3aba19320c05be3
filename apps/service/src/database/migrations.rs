use anyhow::Result;
use chrono::Utc;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 3;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors and check results").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Status transition log").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "Monitor description, pause time and notification preferences").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().timestamp(), description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors and the append-only check result log.
/// Timestamps are unix milliseconds.
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'get',
            interval_seconds INTEGER NOT NULL DEFAULT 60,
            timeout_seconds INTEGER NOT NULL DEFAULT 30,
            max_retries INTEGER NOT NULL DEFAULT 3,
            expected_status_code INTEGER NOT NULL DEFAULT 200,
            failure_threshold INTEGER NOT NULL DEFAULT 1,
            is_paused INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            last_checked_at INTEGER,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            status_changed_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // No foreign key: results of an in-flight check may arrive after the
    // monitor is gone, and are discarded by the engine instead.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS check_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            monitor_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            response_time_ms INTEGER,
            http_status INTEGER,
            error_kind TEXT,
            error_message TEXT,
            attempts INTEGER NOT NULL DEFAULT 1
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_owner ON monitors(owner_id)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_paused ON monitors(is_paused)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_check_results_monitor_timestamp ON check_results(monitor_id, timestamp)",
        (),
    )
    .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_check_results_timestamp ON check_results(timestamp)", ())
        .await?;

    Ok(())
}

/// Migration v2: log of every status transition
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS status_transitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            monitor_id TEXT NOT NULL,
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_status_transitions_monitor ON status_transitions(monitor_id, at DESC)",
        (),
    )
    .await?;

    tracing::info!("Added status_transitions table");
    Ok(())
}

/// Migration v3: monitor description and pause timestamp, per-owner
/// notification channel preferences
async fn run_migration_v3(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE monitors ADD COLUMN description TEXT", ()).await?;
    conn.execute("ALTER TABLE monitors ADD COLUMN paused_at INTEGER", ()).await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_preferences (
            owner_id TEXT PRIMARY KEY,
            email INTEGER NOT NULL DEFAULT 1,
            sms INTEGER NOT NULL DEFAULT 1,
            telegram INTEGER NOT NULL DEFAULT 1,
            webhook INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    tracing::info!("Added monitor description, paused_at and notification_preferences");
    Ok(())
}
