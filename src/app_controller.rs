/*!
 * Task controller: the entry point for every pipeline run.
 *
 * Creating a task does the fallible groundwork up front (provider
 * configuration, change detection, reading source files) and then hands
 * translation to a supervised background task. Callers poll the store or
 * `wait` on the task; committing is a separate, explicit step.
 */

use anyhow::{Context, Result, anyhow, bail};
use futures::future::join_all;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::app_config::CommitSettings;
use crate::clock::Clock;
use crate::database::Store;
use crate::database::models::{
    NewRepository, NewTask, RepositoryRecord, ResultStatus, TaskKind, TaskRecord, TaskStatus,
};
use crate::detection::change_detector::DEFAULT_MAX_DEPTH;
use crate::detection::{ChangeDetector, DetectionResult, IgnoreRules, is_markdown};
use crate::errors::DetectionError;
use crate::github::client::{ContentApi, InstallationConnector};
use crate::github::models::{ChangedFile, RepoRef};
use crate::language_utils;
use crate::providers::ProviderFactory;
use crate::publish::{BatchCommitWriter, CommitOptions, CommitOutcome, CommitRequest, TranslatedFile};
use crate::translation::chunking::DEFAULT_MAX_CHUNK_CHARS;
use crate::translation::{PairFailure, SourceFile, TranslationOrchestrator, Translator};

/// Message stored on tasks a previous process left running
pub const INTERRUPTED_MESSAGE: &str = "Task interrupted before completion";

/// How often a running task's owner refreshes its heartbeat
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Heartbeat age after which a running task is considered abandoned
pub const STALE_TASK_AFTER_SECS: i64 = 300;

/// Pipeline knobs taken from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_chunk_chars: usize,
    pub max_depth: usize,
    pub commit: CommitSettings,
    pub heartbeat_interval: Duration,
    /// Must comfortably exceed `heartbeat_interval`
    pub stale_task_after: chrono::Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            max_depth: DEFAULT_MAX_DEPTH,
            commit: CommitSettings::default(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            stale_task_after: chrono::Duration::seconds(STALE_TASK_AFTER_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub repository_id: i64,
    pub kind: TaskKind,
    /// Defaults to the repository's target languages
    pub target_languages: Option<Vec<String>>,
    /// Translate exactly these paths instead of detecting changes
    pub selected_files: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCreated {
    pub task_id: i64,
    /// Number of (file, language) pairs
    pub total_files: i64,
    pub file_count: usize,
    pub target_languages: Vec<String>,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Started(TaskCreated),
    /// Nothing to translate; no task was created
    NoChanges { latest_sha: String },
    /// Detection or credentials failed; a failed task records the error
    Failed { task_id: i64, message: String },
}

/// Per-language view of a finished task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSummary {
    pub language: String,
    pub completed: usize,
    pub failed: usize,
    pub translated_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusView {
    pub task: TaskRecord,
    /// Empty while the task is running
    pub languages: Vec<LanguageSummary>,
    pub failures: Vec<PairFailure>,
}

/// What a scheduled poll did for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    NoChanges,
    Committed { task_id: i64, branch_name: String },
    TaskFailed { task_id: i64, message: String },
    Error(String),
}

#[derive(Clone)]
pub struct Controller {
    store: Store,
    connector: Arc<dyn InstallationConnector>,
    providers: Arc<dyn ProviderFactory>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
    running: Arc<Mutex<HashMap<i64, JoinHandle<()>>>>,
}

impl Controller {
    /// Build a controller and fail any task a dead process left running
    ///
    /// Running tasks with a fresh heartbeat belong to another live process
    /// sharing the database and are not touched.
    pub async fn start(
        store: Store,
        connector: Arc<dyn InstallationConnector>,
        providers: Arc<dyn ProviderFactory>,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        let recovered = store
            .fail_interrupted_tasks(INTERRUPTED_MESSAGE, settings.stale_task_after)
            .await?;
        if recovered > 0 {
            warn!("Marked {} interrupted task(s) as failed", recovered);
        }

        Ok(Self {
            store,
            connector,
            providers,
            clock,
            settings,
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Commit options from configuration
    pub fn default_commit_options(&self) -> CommitOptions {
        CommitOptions {
            create_pull_request: self.settings.commit.create_pull_request,
            branch_name: None,
            index_document: Some(self.settings.commit.index_document.clone())
                .filter(|path| !path.trim().is_empty()),
        }
    }

    /// Register a repository, asking the platform for its default branch when not given
    pub async fn register_repository(
        &self,
        mut repository: NewRepository,
        default_branch: Option<String>,
    ) -> Result<RepositoryRecord> {
        language_utils::validate_language_code(&repository.base_language)?;
        if repository.target_languages.is_empty() {
            bail!("At least one target language is required");
        }
        for language in &repository.target_languages {
            language_utils::validate_language_code(language)?;
        }

        repository.default_branch = match default_branch {
            Some(branch) => branch,
            None => {
                let repo = RepoRef::new(&repository.owner, &repository.name);
                let api = self.connector.connect(repository.installation_id);
                api.get_repository(&repo)
                    .await
                    .with_context(|| format!("Failed to look up {}", repo))?
                    .default_branch
            }
        };

        let record = self.store.add_repository(repository).await?;
        info!(
            "Registered {}/{} (branch {}, languages {})",
            record.owner,
            record.name,
            record.default_branch,
            record.target_languages.join(", ")
        );
        Ok(record)
    }

    /// Detect work, read sources, persist a task and start translating
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<CreateOutcome> {
        let repository = self
            .store
            .get_repository(request.repository_id)
            .await?
            .ok_or_else(|| anyhow!("Repository {} not found", request.repository_id))?;

        let languages = request
            .target_languages
            .clone()
            .unwrap_or_else(|| repository.target_languages.clone());
        if languages.is_empty() {
            bail!("No target languages for {}/{}", repository.owner, repository.name);
        }
        for language in &languages {
            language_utils::validate_language_code(language)?;
        }

        // Configuration errors surface to the caller rather than as a failed task
        let provider = self.providers.create()?;

        let repo = repository.repo_ref();
        let api = self.connector.connect(repository.installation_id);
        let mut kind = request.kind;

        let detection = match self.detect(api.as_ref(), &repository, &request).await {
            Ok(detection) => detection,
            Err(e) => {
                let message = e.to_string();
                error!("Change detection for {} failed: {}", repo, message);
                if e
                    .downcast_ref::<DetectionError>()
                    .is_some_and(DetectionError::is_credential_failure)
                {
                    self.invalidate_credentials(repository.installation_id);
                }
                let task = self
                    .store
                    .create_failed_task(repository.id, kind, languages, &message)
                    .await?;
                return Ok(CreateOutcome::Failed {
                    task_id: task.id,
                    message,
                });
            }
        };

        if detection.is_full_rescan {
            kind = TaskKind::Full;
        }
        if !detection.has_changes() {
            info!("{} has nothing to translate at {}", repo, detection.latest_sha);
            return Ok(CreateOutcome::NoChanges {
                latest_sha: detection.latest_sha,
            });
        }

        let sources = match read_sources(api.as_ref(), &repo, &detection).await {
            Ok(sources) if !sources.is_empty() => sources,
            Ok(_) => {
                let message = format!(
                    "None of the {} changed file(s) could be read",
                    detection.files.len()
                );
                let task = self
                    .store
                    .create_failed_task(repository.id, kind, languages, &message)
                    .await?;
                return Ok(CreateOutcome::Failed {
                    task_id: task.id,
                    message,
                });
            }
            Err(message) => {
                self.invalidate_credentials(repository.installation_id);
                let task = self
                    .store
                    .create_failed_task(repository.id, kind, languages, &message)
                    .await?;
                return Ok(CreateOutcome::Failed {
                    task_id: task.id,
                    message,
                });
            }
        };

        let total_files = (sources.len() * languages.len()) as i64;
        let task = self
            .store
            .create_task(NewTask {
                repository_id: repository.id,
                kind,
                target_languages: languages.clone(),
                total_files,
                source_sha: Some(detection.latest_sha.clone()),
            })
            .await?;

        let translator = Translator::new(provider).with_max_chunk_chars(self.settings.max_chunk_chars);
        let orchestrator = TranslationOrchestrator::new(self.store.clone(), translator);
        self.spawn_pipeline(
            task.id,
            orchestrator,
            sources.clone(),
            languages.clone(),
            repository.base_language.clone(),
        );

        Ok(CreateOutcome::Started(TaskCreated {
            task_id: task.id,
            total_files,
            file_count: sources.len(),
            target_languages: languages,
            kind,
        }))
    }

    async fn detect(
        &self,
        api: &dyn ContentApi,
        repository: &RepositoryRecord,
        request: &CreateTaskRequest,
    ) -> Result<DetectionResult> {
        let repo = repository.repo_ref();
        let branch = &repository.default_branch;
        let detector = ChangeDetector::new(api).with_max_depth(self.settings.max_depth);

        if let Some(selected) = &request.selected_files {
            let latest_sha = detector.latest_sha(&repo, branch).await?;
            let mut seen = HashSet::new();
            let files = selected
                .iter()
                .map(|path| path.trim_matches('/').to_string())
                .filter(|path| is_markdown(path) && seen.insert(path.clone()))
                .map(ChangedFile::added)
                .collect();
            return Ok(DetectionResult {
                files,
                latest_sha,
                is_full_rescan: request.kind == TaskKind::Full,
            });
        }

        let rules = IgnoreRules::parse(repository.ignore_rules.as_deref());
        let baseline = match request.kind {
            TaskKind::Full => None,
            TaskKind::Incremental => repository.baseline_sha.as_deref(),
        };
        Ok(detector.detect(&repo, branch, baseline, &rules).await?)
    }

    fn spawn_pipeline(
        &self,
        task_id: i64,
        orchestrator: TranslationOrchestrator,
        sources: Vec<SourceFile>,
        languages: Vec<String>,
        base_language: String,
    ) {
        let store = self.store.clone();
        let running = self.running.clone();
        let heartbeat_interval = self.settings.heartbeat_interval;

        let handle = tokio::spawn(async move {
            let mut worker = tokio::spawn(async move {
                orchestrator
                    .run(task_id, &sources, &languages, &base_language)
                    .await
            });

            let mut heartbeat = tokio::time::interval(heartbeat_interval);
            heartbeat.tick().await;
            let joined = loop {
                tokio::select! {
                    joined = &mut worker => break joined,
                    _ = heartbeat.tick() => {
                        if let Err(e) = store.touch_task(task_id).await {
                            warn!("Task {}: heartbeat failed: {}", task_id, e);
                        }
                    }
                }
            };

            let failure = match joined {
                Ok(Ok(summary)) => {
                    debug!("Task {} finished as {}", task_id, summary.status);
                    None
                }
                Ok(Err(e)) => Some(format!("Pipeline error: {:#}", e)),
                Err(join_error) => Some(format!("Pipeline task aborted: {}", join_error)),
            };

            if let Some(message) = failure {
                error!("Task {}: {}", task_id, message);
                if let Err(e) = store
                    .finish_task(task_id, TaskStatus::Failed, Some(message))
                    .await
                {
                    error!("Task {}: failed to record pipeline failure: {}", task_id, e);
                }
            }
        });

        running.lock().insert(task_id, handle);
    }

    /// Wait for a task started by this controller, then return its row
    pub async fn wait(&self, task_id: i64) -> Result<TaskRecord> {
        let handle = self.running.lock().remove(&task_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Supervisor for task {} ended abnormally: {}", task_id, e);
            }
        }
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("Task {} not found", task_id))
    }

    /// Progress counters, and per-language results once the task has finished
    pub async fn task_status(&self, task_id: i64) -> Result<TaskStatusView> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("Task {} not found", task_id))?;

        if !task.status.is_terminal() {
            return Ok(TaskStatusView {
                task,
                languages: Vec::new(),
                failures: Vec::new(),
            });
        }

        let results = self.store.list_results(task_id).await?;
        let mut languages: BTreeMap<String, LanguageSummary> = BTreeMap::new();
        let mut failures = Vec::new();

        for result in results {
            let summary = languages
                .entry(result.language.clone())
                .or_insert_with(|| LanguageSummary {
                    language: result.language.clone(),
                    completed: 0,
                    failed: 0,
                    translated_paths: Vec::new(),
                });
            match result.status {
                ResultStatus::Completed => {
                    summary.completed += 1;
                    summary.translated_paths.push(result.translated_path);
                }
                ResultStatus::Failed => {
                    summary.failed += 1;
                    failures.push(PairFailure {
                        path: result.original_path,
                        language: result.language,
                        message: result.error_message.unwrap_or_default(),
                    });
                }
            }
        }

        Ok(TaskStatusView {
            task,
            languages: languages.into_values().collect(),
            failures,
        })
    }

    /// Write a completed task's translations and advance the baseline
    ///
    /// A failed write leaves the baseline where it was.
    pub async fn commit_task(&self, task_id: i64, options: CommitOptions) -> Result<CommitOutcome> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("Task {} not found", task_id))?;
        if task.status != TaskStatus::Completed {
            bail!("Task {} is {}, only completed tasks can be committed", task_id, task.status);
        }

        let files: Vec<TranslatedFile> = self
            .store
            .list_results(task_id)
            .await?
            .into_iter()
            .filter(|r| r.status == ResultStatus::Completed)
            .filter_map(|r| {
                r.translated_content.map(|content| TranslatedFile {
                    path: r.translated_path,
                    language: r.language,
                    content,
                })
            })
            .collect();
        if files.is_empty() {
            bail!("Task {} has no completed translations to commit", task_id);
        }

        let repository = self
            .store
            .get_repository(task.repository_id)
            .await?
            .ok_or_else(|| anyhow!("Repository {} not found", task.repository_id))?;
        let api = self.connector.connect(repository.installation_id);

        let request = CommitRequest {
            repo: repository.repo_ref(),
            default_branch: repository.default_branch.clone(),
            languages: task.target_languages.clone(),
            incremental: task.kind == TaskKind::Incremental,
            task_id,
            files,
        };
        let outcome = BatchCommitWriter::new(api.as_ref(), self.clock.clone())
            .commit(&request, &options)
            .await
            .with_context(|| format!("Failed to commit task {}", task_id))?;

        // A newer committed task already moved the baseline past this one
        let newer = self
            .store
            .newer_committed_task(repository.id, task_id)
            .await?;
        self.store
            .record_commit(task_id, &outcome.branch_name, outcome.pr_url.clone(), outcome.pr_number)
            .await?;
        match (&task.source_sha, newer) {
            (_, Some(newer)) => info!(
                "Task {} was committed after newer task {}, baseline unchanged",
                task_id, newer
            ),
            (Some(sha), None) => self.store.advance_baseline(repository.id, sha).await?,
            (None, None) => warn!("Task {} has no source commit, baseline unchanged", task_id),
        }

        info!(
            "Task {} committed {} file(s) to {}",
            task_id, outcome.files_committed, outcome.branch_name
        );
        Ok(outcome)
    }

    /// Drop cached credentials for an installation
    pub fn invalidate_credentials(&self, installation_id: u64) {
        info!("Invalidating credentials for installation {}", installation_id);
        self.connector.invalidate(installation_id);
    }

    /// Run an incremental task for every repository and commit what completes
    pub async fn poll_once(&self) -> Result<Vec<(i64, PollOutcome)>> {
        let repositories = self.store.list_repositories().await?;
        let runs = repositories.iter().map(|repository| async move {
            let outcome = match self.poll_repository(repository).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Poll of {}/{} failed: {:#}", repository.owner, repository.name, e);
                    PollOutcome::Error(format!("{:#}", e))
                }
            };
            (repository.id, outcome)
        });
        Ok(join_all(runs).await)
    }

    /// Poll every `interval` until `shutdown` resolves
    ///
    /// A failed poll is logged and retried on the next tick. Shutdown also
    /// interrupts a poll in progress. Returns the number of polls started.
    pub async fn watch<F>(&self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        tokio::pin!(shutdown);
        let mut polls = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => return polls,
            }

            polls += 1;
            tokio::select! {
                polled = self.poll_once() => match polled {
                    Ok(outcomes) => log_poll_outcomes(&outcomes),
                    Err(e) => error!("Poll failed, retrying next interval: {:#}", e),
                },
                _ = &mut shutdown => {
                    // Tasks cut off here go stale and are failed on the next start
                    info!("Stopping during a poll");
                    return polls;
                }
            }
        }
    }

    async fn poll_repository(&self, repository: &RepositoryRecord) -> Result<PollOutcome> {
        let created = self
            .create_task(CreateTaskRequest {
                repository_id: repository.id,
                kind: TaskKind::Incremental,
                target_languages: None,
                selected_files: None,
            })
            .await?;

        let task_id = match created {
            CreateOutcome::Started(created) => created.task_id,
            CreateOutcome::NoChanges { .. } => return Ok(PollOutcome::NoChanges),
            CreateOutcome::Failed { task_id, message } => {
                return Ok(PollOutcome::TaskFailed { task_id, message });
            }
        };

        let task = self.wait(task_id).await?;
        if task.status != TaskStatus::Completed {
            return Ok(PollOutcome::TaskFailed {
                task_id,
                message: task.error_message.unwrap_or_default(),
            });
        }

        let outcome = self.commit_task(task_id, self.default_commit_options()).await?;
        Ok(PollOutcome::Committed {
            task_id,
            branch_name: outcome.branch_name,
        })
    }
}

fn log_poll_outcomes(outcomes: &[(i64, PollOutcome)]) {
    for (repository_id, outcome) in outcomes {
        match outcome {
            PollOutcome::NoChanges => debug!("Repository {}: no changes", repository_id),
            PollOutcome::Committed { task_id, branch_name } => {
                info!("Repository {}: task {} committed to {}", repository_id, task_id, branch_name);
            }
            PollOutcome::TaskFailed { task_id, message } => {
                warn!("Repository {}: task {} failed: {}", repository_id, task_id, message);
            }
            PollOutcome::Error(message) => warn!("Repository {}: {}", repository_id, message),
        }
    }
}

/// Read every detected file at the detected head
///
/// Missing or unreadable files are skipped. A credential failure aborts the
/// read and is returned as the task's error message.
async fn read_sources(
    api: &dyn ContentApi,
    repo: &RepoRef,
    detection: &DetectionResult,
) -> std::result::Result<Vec<SourceFile>, String> {
    let mut sources = Vec::with_capacity(detection.files.len());
    for file in &detection.files {
        match api.get_file(repo, &file.path, Some(&detection.latest_sha)).await {
            Ok(Some(content)) => sources.push(SourceFile {
                path: file.path.clone(),
                content: content.content,
                sha: Some(content.sha),
            }),
            Ok(None) => warn!("Skipping {}: not found at {}", file.path, detection.latest_sha),
            Err(e) if e.is_credential() => return Err(e.to_string()),
            Err(e) => warn!("Skipping {}: {}", file.path, e),
        }
    }
    Ok(sources)
}
