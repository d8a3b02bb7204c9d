/*!
 * Writes a finished task's translations back to the repository.
 *
 * A batch runs in a fixed order: resolve a fresh branch, create it from the
 * default branch head, write every translated file, refresh the index
 * document, then open a pull request. File writes are fatal on failure;
 * the index and pull request steps only log.
 */

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::index::{DEFAULT_INDEX_CONTENT, entries_for, update_index};
use super::messages::{branch_name, commit_message, index_commit_message, pr_body, pr_title, uniquify};
use crate::clock::Clock;
use crate::errors::PlatformError;
use crate::github::client::ContentApi;
use crate::github::models::{FileWrite, NewPullRequest, RepoRef};

/// A translated document ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedFile {
    pub path: String,
    pub language: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    pub create_pull_request: bool,
    /// Overrides the generated branch name
    pub branch_name: Option<String>,
    /// Document that receives the translation table; `None` skips the step
    pub index_document: Option<String>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            create_pull_request: true,
            branch_name: None,
            index_document: Some("README.md".to_string()),
        }
    }
}

/// Task facts the batch needs for naming and messages
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub repo: RepoRef,
    pub default_branch: String,
    pub languages: Vec<String>,
    pub incremental: bool,
    pub task_id: i64,
    pub files: Vec<TranslatedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub branch_name: String,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub files_committed: usize,
    pub index_updated: bool,
}

/// One file per destination path, shallow paths first
pub fn plan_files(files: Vec<TranslatedFile>) -> Vec<TranslatedFile> {
    let mut by_path: BTreeMap<String, TranslatedFile> = BTreeMap::new();
    for file in files {
        by_path.insert(file.path.clone(), file);
    }

    let mut planned: Vec<TranslatedFile> = by_path.into_values().collect();
    planned.sort_by(|a, b| {
        let depth = |f: &TranslatedFile| f.path.split('/').count();
        depth(a).cmp(&depth(b)).then_with(|| a.path.cmp(&b.path))
    });
    planned
}

pub struct BatchCommitWriter<'a> {
    api: &'a dyn ContentApi,
    clock: Arc<dyn Clock>,
}

impl<'a> BatchCommitWriter<'a> {
    pub fn new(api: &'a dyn ContentApi, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock }
    }

    pub async fn commit(
        &self,
        request: &CommitRequest,
        options: &CommitOptions,
    ) -> Result<CommitOutcome, PlatformError> {
        let repo = &request.repo;
        let branch = self.resolve_branch(repo, request, options).await?;

        let base_sha = self
            .api
            .get_branch_head(repo, &request.default_branch)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("branch {} of {}", request.default_branch, repo))
            })?;
        self.api.create_branch(repo, &branch, &base_sha).await?;
        info!("Created branch {} from {} at {}", branch, request.default_branch, base_sha);

        let files = plan_files(request.files.clone());
        let files_committed = self
            .write_files(repo, &branch, &files, request.incremental)
            .await?;

        let index_updated = match &options.index_document {
            Some(path) => match self.update_index_document(repo, &branch, path, request, &files).await {
                Ok(written) => written,
                Err(e) => {
                    warn!("Failed to update {} on {}: {}", path, branch, e);
                    false
                }
            },
            None => false,
        };

        let (pr_url, pr_number) = if options.create_pull_request {
            let pull = NewPullRequest {
                title: pr_title(&request.languages),
                body: pr_body(
                    &request.languages,
                    files_committed,
                    request.incremental,
                    request.task_id,
                ),
                head: branch.clone(),
                base: request.default_branch.clone(),
            };
            match self.api.create_pull_request(repo, &pull).await {
                Ok(pr) => {
                    info!("Opened pull request #{} for {}", pr.number, branch);
                    (Some(pr.html_url), Some(pr.number))
                }
                Err(e) => {
                    warn!("Failed to open pull request for {}: {}", branch, e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Ok(CommitOutcome {
            branch_name: branch,
            pr_url,
            pr_number,
            files_committed,
            index_updated,
        })
    }

    /// Write files to `branch`, updating any that already exist there
    ///
    /// Safe to repeat: a second run reuses each file's current hash.
    pub async fn write_files(
        &self,
        repo: &RepoRef,
        branch: &str,
        files: &[TranslatedFile],
        incremental: bool,
    ) -> Result<usize, PlatformError> {
        let mut written = 0;
        for file in files {
            let sha = self
                .api
                .get_file(repo, &file.path, Some(branch))
                .await?
                .map(|existing| existing.sha);
            debug!(
                "{} {} on {}",
                if sha.is_some() { "Updating" } else { "Creating" },
                file.path,
                branch
            );

            let write = FileWrite {
                path: file.path.clone(),
                content: file.content.clone(),
                message: commit_message(std::slice::from_ref(&file.language), 1, incremental),
                sha,
                branch: branch.to_string(),
            };
            self.api.put_file(repo, &write).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn resolve_branch(
        &self,
        repo: &RepoRef,
        request: &CommitRequest,
        options: &CommitOptions,
    ) -> Result<String, PlatformError> {
        let candidate = options
            .branch_name
            .clone()
            .unwrap_or_else(|| branch_name(&request.languages, self.clock.now_millis()));

        if self.api.get_branch_head(repo, &candidate).await?.is_some() {
            let unique = uniquify(&candidate, self.clock.now_millis());
            info!("Branch {} already exists, using {}", candidate, unique);
            Ok(unique)
        } else {
            Ok(candidate)
        }
    }

    /// Returns whether the document was written
    async fn update_index_document(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
        request: &CommitRequest,
        files: &[TranslatedFile],
    ) -> Result<bool, PlatformError> {
        let existing = self.api.get_file(repo, path, Some(branch)).await?;
        let (current, sha) = match existing {
            Some(file) => (file.content, Some(file.sha)),
            None => (DEFAULT_INDEX_CONTENT.to_string(), None),
        };

        let entries = entries_for(files.iter().map(|f| (f.language.as_str(), f.path.as_str())));
        let updated = update_index(&current, &entries);
        if sha.is_some() && updated == current {
            debug!("{} already lists every language", path);
            return Ok(false);
        }

        let write = FileWrite {
            path: path.to_string(),
            content: updated,
            message: index_commit_message(&request.languages),
            sha,
            branch: branch.to_string(),
        };
        self.api.put_file(repo, &write).await?;
        Ok(true)
    }
}
