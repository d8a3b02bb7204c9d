/*!
 * Database entity models.
 *
 * These structures map directly to database tables. Timestamps are stored
 * as RFC 3339 strings; language lists as JSON arrays.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::github::models::RepoRef;

/// Task lifecycle; `Completed` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// Whether a task walked the whole tree or only the changes since the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Full,
    Incremental,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Full => write!(f, "full"),
            TaskKind::Incremental => write!(f, "incremental"),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(TaskKind::Full),
            "incremental" => Ok(TaskKind::Incremental),
            _ => Err(anyhow::anyhow!("Invalid task kind: {}", s)),
        }
    }
}

/// Outcome of one (file, language) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Completed => write!(f, "completed"),
            ResultStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(ResultStatus::Completed),
            "failed" => Ok(ResultStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid result status: {}", s)),
        }
    }
}

/// Registered source repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub installation_id: u64,
    pub default_branch: String,
    pub base_language: String,
    pub target_languages: Vec<String>,
    /// Newline separated glob patterns
    pub ignore_rules: Option<String>,
    /// Last commit whose translations were committed
    pub baseline_sha: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RepositoryRecord {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.name)
    }
}

/// Input for registering a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub owner: String,
    pub name: String,
    pub installation_id: u64,
    pub default_branch: String,
    pub base_language: String,
    pub target_languages: Vec<String>,
    pub ignore_rules: Option<String>,
}

/// One pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub repository_id: i64,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub target_languages: Vec<String>,
    /// Number of (file, language) pairs, fixed at creation
    pub total_files: i64,
    pub processed_files: i64,
    pub failed_files: i64,
    /// Head commit the source files were read at
    pub source_sha: Option<String>,
    pub error_message: Option<String>,
    pub branch_name: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub created_at: String,
    pub completed_at: Option<String>,
    /// Last sign of life from the process running the task
    pub heartbeat_at: Option<String>,
}

impl TaskRecord {
    /// Pairs not yet attempted
    pub fn remaining(&self) -> i64 {
        self.total_files - self.processed_files - self.failed_files
    }
}

/// Input for starting a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub repository_id: i64,
    pub kind: TaskKind,
    pub target_languages: Vec<String>,
    pub total_files: i64,
    pub source_sha: Option<String>,
}

/// Stored outcome of one (file, language) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: i64,
    pub task_id: i64,
    pub original_path: String,
    pub translated_path: String,
    pub language: String,
    pub original_sha: Option<String>,
    pub original_content: String,
    pub translated_content: Option<String>,
    pub status: ResultStatus,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Input for appending a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResult {
    pub original_path: String,
    pub translated_path: String,
    pub language: String,
    pub original_sha: Option<String>,
    pub original_content: String,
    pub translated_content: Option<String>,
    pub status: ResultStatus,
    pub error_message: Option<String>,
}

impl NewResult {
    pub fn completed(
        original_path: &str,
        translated_path: String,
        language: &str,
        original_sha: Option<String>,
        original_content: String,
        translated_content: String,
    ) -> Self {
        Self {
            original_path: original_path.to_string(),
            translated_path,
            language: language.to_string(),
            original_sha,
            original_content,
            translated_content: Some(translated_content),
            status: ResultStatus::Completed,
            error_message: None,
        }
    }

    pub fn failed(
        original_path: &str,
        translated_path: String,
        language: &str,
        original_sha: Option<String>,
        original_content: String,
        error_message: String,
    ) -> Self {
        Self {
            original_path: original_path.to_string(),
            translated_path,
            language: language.to_string(),
            original_sha,
            original_content,
            translated_content: None,
            status: ResultStatus::Failed,
            error_message: Some(error_message),
        }
    }
}
