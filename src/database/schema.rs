/*!
 * Database schema definitions and migrations.
 *
 * Three tables back the pipeline: `repositories` (registry and baseline
 * pointer), `translation_tasks` (one row per run) and
 * `translation_results` (one append-only row per file and language).
 *
 * v2 added `translation_tasks.heartbeat_at`, the liveness lease a running
 * task's owner keeps fresh.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Foreign keys are a per-connection setting
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing database schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        debug!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

fn create_all_tables(conn: &Connection) -> Result<()> {
    // WAL keeps readers polling task state unblocked while the pipeline writes
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            installation_id INTEGER NOT NULL,
            default_branch TEXT NOT NULL,
            base_language TEXT NOT NULL,
            target_languages TEXT NOT NULL,
            ignore_rules TEXT,
            baseline_sha TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(owner, name)
        );
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS translation_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            target_languages TEXT NOT NULL,
            total_files INTEGER NOT NULL DEFAULT 0,
            processed_files INTEGER NOT NULL DEFAULT 0,
            failed_files INTEGER NOT NULL DEFAULT 0,
            source_sha TEXT,
            error_message TEXT,
            branch_name TEXT,
            pr_url TEXT,
            pr_number INTEGER,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            heartbeat_at TEXT,
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE,
            CHECK (processed_files + failed_files <= total_files)
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_repository ON translation_tasks(repository_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON translation_tasks(status);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS translation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            original_path TEXT NOT NULL,
            translated_path TEXT NOT NULL,
            language TEXT NOT NULL,
            original_sha TEXT,
            original_content TEXT NOT NULL,
            translated_content TEXT,
            status TEXT NOT NULL,
            error_message TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (task_id) REFERENCES translation_tasks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_results_task ON translation_results(task_id);
        "#,
    )?;

    debug!("All database tables created successfully");
    Ok(())
}

/// Migrate schema from an older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    if from_version < 2 {
        debug!("Adding translation_tasks.heartbeat_at");
        conn.execute_batch("ALTER TABLE translation_tasks ADD COLUMN heartbeat_at TEXT;")
            .context("Failed to add heartbeat column")?;
    }
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
