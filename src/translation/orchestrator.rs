/*!
 * Runs one task's (language, file) pairs.
 *
 * Languages form the outer loop and files the inner one. Pairs run one at a
 * time; a failing pair is recorded and the loop moves on. Each outcome is
 * persisted before the next pair starts, so a poller always sees counters
 * that match the stored results.
 */

use anyhow::{Context, Result};
use log::{info, warn};

use super::classify;
use super::core::Translator;
use crate::database::Store;
use crate::database::models::{NewResult, TaskStatus};
use crate::language_utils::get_language_name;
use crate::publish::paths::translated_path;

/// Distinct error messages listed by name before falling back to a count
const LISTED_ERROR_LIMIT: usize = 3;

/// Source document read at the task's head commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    /// Blob hash at the head commit
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub path: String,
    pub language: String,
    pub message: String,
}

/// What happened to a task's pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: TaskStatus,
    pub error_summary: Option<String>,
    pub failures: Vec<PairFailure>,
}

pub struct TranslationOrchestrator {
    store: Store,
    translator: Translator,
}

impl TranslationOrchestrator {
    pub fn new(store: Store, translator: Translator) -> Self {
        Self { store, translator }
    }

    /// Attempt every pair, then close the task
    ///
    /// Translation failures never end the loop early. Only storage errors
    /// do, and they leave the task running for crash recovery to pick up.
    pub async fn run(
        &self,
        task_id: i64,
        files: &[SourceFile],
        target_languages: &[String],
        base_language: &str,
    ) -> Result<RunSummary> {
        let total = files.len() * target_languages.len();
        let mut succeeded = 0usize;
        let mut failures = Vec::new();

        info!(
            "Task {}: translating {} file(s) into {} language(s) with {}",
            task_id,
            files.len(),
            target_languages.len(),
            self.translator.provider().model()
        );

        for language in target_languages {
            let language_name = get_language_name(language);
            for file in files {
                let destination = translated_path(&file.path, language, base_language);

                let result = match self
                    .translator
                    .translate_large(&file.content, language, base_language)
                    .await
                {
                    Ok(translated) => {
                        succeeded += 1;
                        info!("Task {}: {} -> {} done", task_id, file.path, language_name);
                        NewResult::completed(
                            &file.path,
                            destination,
                            language,
                            file.sha.clone(),
                            file.content.clone(),
                            translated,
                        )
                    }
                    Err(error) => {
                        let message = classify::user_message(&error);
                        warn!(
                            "Task {}: {} -> {} failed: {}",
                            task_id, file.path, language_name, error
                        );
                        failures.push(PairFailure {
                            path: file.path.clone(),
                            language: language.clone(),
                            message: message.clone(),
                        });
                        NewResult::failed(
                            &file.path,
                            destination,
                            language,
                            file.sha.clone(),
                            file.content.clone(),
                            message,
                        )
                    }
                };

                self.store
                    .record_result(task_id, result)
                    .await
                    .with_context(|| format!("Failed to record result for task {}", task_id))?;
            }
        }

        let failed = failures.len();
        let status = if succeeded == 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        let error_summary = if failed > 0 {
            let messages: Vec<String> = failures.iter().map(|f| f.message.clone()).collect();
            Some(summarize_errors(failed, total, &messages))
        } else {
            None
        };

        self.store
            .finish_task(task_id, status, error_summary.clone())
            .await?;
        info!(
            "Task {} {}: {} succeeded, {} failed",
            task_id, status, succeeded, failed
        );

        Ok(RunSummary {
            total,
            succeeded,
            failed,
            status,
            error_summary,
            failures,
        })
    }
}

/// Human readable summary of a task's failures
pub fn summarize_errors(failed: usize, total: usize, messages: &[String]) -> String {
    let mut distinct: Vec<&str> = Vec::new();
    for message in messages {
        if !distinct.contains(&message.as_str()) {
            distinct.push(message);
        }
    }

    match distinct.len() {
        0 => format!("{}/{} files failed", failed, total),
        1 => format!("{}/{} files failed: {}", failed, total, distinct[0]),
        n if n <= LISTED_ERROR_LIMIT => {
            format!("{}/{} files failed. Errors: {}", failed, total, distinct.join("; "))
        }
        n => format!("{}/{} files failed. {} different errors occurred.", failed, total, n),
    }
}
