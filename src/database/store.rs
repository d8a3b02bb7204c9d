/*!
 * Typed access to repositories, tasks and results.
 *
 * Task status only ever moves out of `running`; every status update is
 * guarded on the current status so a terminal task is never rewritten.
 * Results are append-only, and each insert bumps the owning task's counter
 * in the same transaction.
 */

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;
use std::sync::Arc;

use super::connection::DatabaseConnection;
use super::models::{
    NewRepository, NewResult, NewTask, RepositoryRecord, ResultRecord, ResultStatus, TaskKind,
    TaskRecord, TaskStatus,
};
use crate::clock::Clock;

const REPOSITORY_COLUMNS: &str = "id, owner, name, installation_id, default_branch, base_language, \
     target_languages, ignore_rules, baseline_sha, created_at, updated_at";

const TASK_COLUMNS: &str = "id, repository_id, kind, status, target_languages, total_files, \
     processed_files, failed_files, source_sha, error_message, branch_name, pr_url, pr_number, \
     created_at, completed_at, heartbeat_at";

const RESULT_COLUMNS: &str = "id, task_id, original_path, translated_path, language, original_sha, \
     original_content, translated_content, status, error_message, created_at";

#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
}

impl Store {
    pub fn new(db: DatabaseConnection, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Store backed by an in-memory database (for testing)
    pub fn new_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?, clock))
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339()
    }

    // =========================================================================
    // Repository Operations
    // =========================================================================

    pub async fn add_repository(&self, repository: NewRepository) -> Result<RepositoryRecord> {
        let now = self.timestamp();
        let languages = serde_json::to_string(&repository.target_languages)?;

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO repositories (
                        owner, name, installation_id, default_branch, base_language,
                        target_languages, ignore_rules, baseline_sha, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8)
                    "#,
                    params![
                        repository.owner,
                        repository.name,
                        repository.installation_id as i64,
                        repository.default_branch,
                        repository.base_language,
                        languages,
                        repository.ignore_rules,
                        now,
                    ],
                )
                .with_context(|| {
                    format!(
                        "Failed to register repository {}/{}",
                        repository.owner, repository.name
                    )
                })?;
                let id = conn.last_insert_rowid();
                get_repository_sync(conn, id)?
                    .ok_or_else(|| anyhow!("Repository {} vanished after insert", id))
            })
            .await
    }

    pub async fn get_repository(&self, id: i64) -> Result<Option<RepositoryRecord>> {
        self.db
            .execute_async(move |conn| get_repository_sync(conn, id))
            .await
    }

    pub async fn find_repository(&self, owner: &str, name: &str) -> Result<Option<RepositoryRecord>> {
        let owner = owner.to_string();
        let name = name.to_string();

        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM repositories WHERE owner = ?1 AND name = ?2",
                    REPOSITORY_COLUMNS
                );
                Ok(conn
                    .query_row(&sql, params![owner, name], map_repository)
                    .optional()?)
            })
            .await
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        self.db
            .execute_async(|conn| {
                let sql = format!("SELECT {} FROM repositories ORDER BY id", REPOSITORY_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], map_repository)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Move the baseline pointer after a committed batch
    pub async fn advance_baseline(&self, repository_id: i64, sha: &str) -> Result<()> {
        let sha = sha.to_string();
        let now = self.timestamp();

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    "UPDATE repositories SET baseline_sha = ?1, updated_at = ?2 WHERE id = ?3",
                    params![sha, now, repository_id],
                )?;
                if updated == 0 {
                    return Err(anyhow!("Repository {} not found", repository_id));
                }
                info!("Repository {} baseline advanced to {}", repository_id, sha);
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Task Operations
    // =========================================================================

    /// Insert a task in `running` state, its heartbeat starting now
    pub async fn create_task(&self, task: NewTask) -> Result<TaskRecord> {
        let now = self.timestamp();
        let languages = serde_json::to_string(&task.target_languages)?;

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO translation_tasks (
                        repository_id, kind, status, target_languages, total_files, source_sha,
                        created_at, heartbeat_at
                    ) VALUES (?1, ?2, 'running', ?3, ?4, ?5, ?6, ?6)
                    "#,
                    params![
                        task.repository_id,
                        task.kind.to_string(),
                        languages,
                        task.total_files,
                        task.source_sha,
                        now,
                    ],
                )
                .context("Failed to create translation task")?;
                let id = conn.last_insert_rowid();
                debug!("Created task {} with {} pair(s)", id, task.total_files);
                get_task_sync(conn, id)?.ok_or_else(|| anyhow!("Task {} vanished after insert", id))
            })
            .await
    }

    /// Insert a task that failed before any translation work
    pub async fn create_failed_task(
        &self,
        repository_id: i64,
        kind: TaskKind,
        target_languages: Vec<String>,
        error_message: &str,
    ) -> Result<TaskRecord> {
        let now = self.timestamp();
        let languages = serde_json::to_string(&target_languages)?;
        let error_message = error_message.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO translation_tasks (
                        repository_id, kind, status, target_languages, total_files,
                        error_message, created_at, completed_at
                    ) VALUES (?1, ?2, 'failed', ?3, 0, ?4, ?5, ?5)
                    "#,
                    params![repository_id, kind.to_string(), languages, error_message, now],
                )
                .context("Failed to record failed task")?;
                let id = conn.last_insert_rowid();
                get_task_sync(conn, id)?.ok_or_else(|| anyhow!("Task {} vanished after insert", id))
            })
            .await
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>> {
        self.db
            .execute_async(move |conn| get_task_sync(conn, task_id))
            .await
    }

    /// Most recent tasks first
    pub async fn list_tasks(&self, repository_id: Option<i64>, limit: usize) -> Result<Vec<TaskRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM translation_tasks WHERE (?1 IS NULL OR repository_id = ?1) ORDER BY id DESC LIMIT ?2",
                    TASK_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![repository_id, limit as i64], map_task)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    /// Append a result and bump the matching counter atomically
    ///
    /// Fails without writing when the task is no longer running or every
    /// pair has already been accounted for.
    pub async fn record_result(&self, task_id: i64, result: NewResult) -> Result<ResultRecord> {
        let now = self.timestamp();

        self.db
            .transaction_async(move |tx| {
                let counter = match result.status {
                    ResultStatus::Completed => "processed_files",
                    ResultStatus::Failed => "failed_files",
                };
                let sql = format!(
                    "UPDATE translation_tasks SET {counter} = {counter} + 1, heartbeat_at = ?2 \
                     WHERE id = ?1 AND status = 'running' \
                     AND processed_files + failed_files < total_files"
                );
                if tx.execute(&sql, params![task_id, now])? == 0 {
                    return Err(anyhow!(
                        "Task {} is not accepting results for {} ({})",
                        task_id,
                        result.original_path,
                        result.language
                    ));
                }

                tx.execute(
                    r#"
                    INSERT INTO translation_results (
                        task_id, original_path, translated_path, language, original_sha,
                        original_content, translated_content, status, error_message, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                    params![
                        task_id,
                        result.original_path,
                        result.translated_path,
                        result.language,
                        result.original_sha,
                        result.original_content,
                        result.translated_content,
                        result.status.to_string(),
                        result.error_message,
                        now,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                let sql = format!("SELECT {} FROM translation_results WHERE id = ?1", RESULT_COLUMNS);
                Ok(tx.query_row(&sql, [id], map_result)?)
            })
            .await
    }

    /// Move a running task to a terminal status
    ///
    /// Returns false when the task was already terminal.
    pub async fn finish_task(
        &self,
        task_id: i64,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(anyhow!("Cannot finish task {} as {}", task_id, status));
        }
        let now = self.timestamp();

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    r#"
                    UPDATE translation_tasks
                    SET status = ?1, error_message = ?2, completed_at = ?3
                    WHERE id = ?4 AND status = 'running'
                    "#,
                    params![status.to_string(), error_message, now, task_id],
                )?;
                Ok(updated == 1)
            })
            .await
    }

    /// Refresh a running task's heartbeat
    ///
    /// Returns false when the task is no longer running.
    pub async fn touch_task(&self, task_id: i64) -> Result<bool> {
        let now = self.timestamp();

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    "UPDATE translation_tasks SET heartbeat_at = ?1 WHERE id = ?2 AND status = 'running'",
                    params![now, task_id],
                )?;
                Ok(updated == 1)
            })
            .await
    }

    /// Fail running tasks whose owner stopped sending heartbeats
    ///
    /// A task counts as abandoned once its last heartbeat (or its creation
    /// time, for rows without one) is at least `stale_after` old. Tasks a
    /// live process is still working on are left alone.
    pub async fn fail_interrupted_tasks(&self, message: &str, stale_after: Duration) -> Result<usize> {
        let message = message.to_string();
        let now = self.clock.now();
        let cutoff = (now - stale_after).to_rfc3339();
        let now = now.to_rfc3339();

        self.db
            .execute_async(move |conn| {
                Ok(conn.execute(
                    r#"
                    UPDATE translation_tasks
                    SET status = 'failed', error_message = ?1, completed_at = ?2
                    WHERE status = 'running'
                      AND julianday(COALESCE(heartbeat_at, created_at)) <= julianday(?3)
                    "#,
                    params![message, now, cutoff],
                )?)
            })
            .await
    }

    /// Store the branch and pull request produced by a commit
    pub async fn record_commit(
        &self,
        task_id: i64,
        branch_name: &str,
        pr_url: Option<String>,
        pr_number: Option<u64>,
    ) -> Result<()> {
        let branch_name = branch_name.to_string();

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    "UPDATE translation_tasks SET branch_name = ?1, pr_url = ?2, pr_number = ?3 WHERE id = ?4",
                    params![branch_name, pr_url, pr_number.map(|n| n as i64), task_id],
                )?;
                if updated == 0 {
                    return Err(anyhow!("Task {} not found", task_id));
                }
                Ok(())
            })
            .await
    }

    /// Oldest task of the repository created after `task_id` that has been committed
    pub async fn newer_committed_task(&self, repository_id: i64, task_id: i64) -> Result<Option<i64>> {
        self.db
            .execute_async(move |conn| {
                Ok(conn.query_row(
                    r#"
                    SELECT MIN(id) FROM translation_tasks
                    WHERE repository_id = ?1 AND id > ?2 AND branch_name IS NOT NULL
                    "#,
                    params![repository_id, task_id],
                    |row| row.get::<_, Option<i64>>(0),
                )?)
            })
            .await
    }

    // =========================================================================
    // Result Operations
    // =========================================================================

    /// Results of a task in insertion order
    pub async fn list_results(&self, task_id: i64) -> Result<Vec<ResultRecord>> {
        self.db
            .execute_async(move |conn| {
                let sql = format!(
                    "SELECT {} FROM translation_results WHERE task_id = ?1 ORDER BY id",
                    RESULT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([task_id], map_result)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }
}

fn get_repository_sync(conn: &Connection, id: i64) -> Result<Option<RepositoryRecord>> {
    let sql = format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS);
    Ok(conn.query_row(&sql, [id], map_repository).optional()?)
}

fn get_task_sync(conn: &Connection, id: i64) -> Result<Option<TaskRecord>> {
    let sql = format!("SELECT {} FROM translation_tasks WHERE id = ?1", TASK_COLUMNS);
    Ok(conn.query_row(&sql, [id], map_task).optional()?)
}

fn conversion_error(
    idx: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(error))
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| conversion_error(idx, std::io::Error::other(e.to_string())))
}

fn languages_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn map_repository(row: &Row<'_>) -> rusqlite::Result<RepositoryRecord> {
    Ok(RepositoryRecord {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        installation_id: row.get::<_, i64>(3)? as u64,
        default_branch: row.get(4)?,
        base_language: row.get(5)?,
        target_languages: languages_column(row, 6)?,
        ignore_rules: row.get(7)?,
        baseline_sha: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        kind: parse_column(row, 2)?,
        status: parse_column(row, 3)?,
        target_languages: languages_column(row, 4)?,
        total_files: row.get(5)?,
        processed_files: row.get(6)?,
        failed_files: row.get(7)?,
        source_sha: row.get(8)?,
        error_message: row.get(9)?,
        branch_name: row.get(10)?,
        pr_url: row.get(11)?,
        pr_number: row.get::<_, Option<i64>>(12)?.map(|n| n as u64),
        created_at: row.get(13)?,
        completed_at: row.get(14)?,
        heartbeat_at: row.get(15)?,
    })
}

fn map_result(row: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    Ok(ResultRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        original_path: row.get(2)?,
        translated_path: row.get(3)?,
        language: row.get(4)?,
        original_sha: row.get(5)?,
        original_content: row.get(6)?,
        translated_content: row.get(7)?,
        status: parse_column(row, 8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
    })
}
