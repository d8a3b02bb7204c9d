/*!
 * Decides which Markdown files need translating.
 *
 * With no baseline every eligible file is a candidate. With a baseline the
 * platform's compare view supplies the changed paths; when the compare
 * fails and the baseline is no longer in recent history the branch was
 * force-pushed and the detector falls back to a full scan.
 */

use log::{debug, info, warn};

use super::ignore_rules::IgnoreRules;
use crate::errors::DetectionError;
use crate::github::client::ContentApi;
use crate::github::models::{ChangeStatus, ChangedFile, RepoRef};

/// Extensions eligible for translation
pub const MARKDOWN_EXTENSIONS: &[&str] = &[".md", ".mdx"];

/// Directories never entered during a full scan
pub const SKIPPED_DIRECTORIES: &[&str] = &["node_modules", ".git", "dist", "build", "translations"];

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// How far back to look for the baseline after a failed compare
pub const FORCE_PUSH_HISTORY_DEPTH: u32 = 100;

pub fn is_markdown(path: &str) -> bool {
    let lower = path.to_lowercase();
    MARKDOWN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Outcome of change detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    /// Eligible files, never including removals
    pub files: Vec<ChangedFile>,
    /// Head commit the files were read against
    pub latest_sha: String,
    /// Baseline missing or unusable; `files` holds a full scan
    pub is_full_rescan: bool,
}

impl DetectionResult {
    pub fn has_changes(&self) -> bool {
        !self.files.is_empty()
    }
}

pub struct ChangeDetector<'a> {
    api: &'a dyn ContentApi,
    max_depth: usize,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(api: &'a dyn ContentApi) -> Self {
        Self {
            api,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Head commit of the branch
    pub async fn latest_sha(&self, repo: &RepoRef, branch: &str) -> Result<String, DetectionError> {
        let commits = self
            .api
            .list_commits(repo, Some(branch), 1)
            .await
            .map_err(DetectionError::LatestCommit)?;
        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| DetectionError::EmptyHistory(branch.to_string()))
    }

    /// Files changed since `baseline`
    pub async fn detect(
        &self,
        repo: &RepoRef,
        branch: &str,
        baseline: Option<&str>,
        rules: &IgnoreRules,
    ) -> Result<DetectionResult, DetectionError> {
        let latest_sha = self.latest_sha(repo, branch).await?;

        let Some(baseline) = baseline else {
            info!("{} has no baseline, scanning all files at {}", repo, latest_sha);
            return self.full_rescan(repo, latest_sha, rules).await;
        };

        if baseline == latest_sha {
            debug!("{} unchanged since {}", repo, baseline);
            return Ok(DetectionResult {
                files: Vec::new(),
                latest_sha,
                is_full_rescan: false,
            });
        }

        match self.api.compare_commits(repo, baseline, &latest_sha).await {
            Ok(changed) => {
                let eligible: Vec<ChangedFile> = changed
                    .into_iter()
                    .filter(|f| f.status != ChangeStatus::Removed && is_markdown(&f.path))
                    .collect();
                let files = rules.retain(eligible, |f| f.path.as_str());
                info!(
                    "{} has {} changed Markdown file(s) between {} and {}",
                    repo,
                    files.len(),
                    baseline,
                    latest_sha
                );
                Ok(DetectionResult {
                    files,
                    latest_sha,
                    is_full_rescan: false,
                })
            }
            Err(compare_error) => {
                if compare_error.is_credential() {
                    return Err(DetectionError::Compare {
                        base: baseline.to_string(),
                        head: latest_sha,
                        source: compare_error,
                    });
                }

                warn!("Compare {}...{} failed: {}", baseline, latest_sha, compare_error);
                let history = self
                    .api
                    .list_commits(repo, Some(branch), FORCE_PUSH_HISTORY_DEPTH)
                    .await
                    .map_err(DetectionError::History)?;

                if history.iter().any(|c| c.sha == baseline) {
                    Err(DetectionError::Compare {
                        base: baseline.to_string(),
                        head: latest_sha,
                        source: compare_error,
                    })
                } else {
                    warn!(
                        "Baseline {} not found in recent history of {}, assuming force-push",
                        baseline, repo
                    );
                    self.full_rescan(repo, latest_sha, rules).await
                }
            }
        }
    }

    /// Every eligible file at `git_ref`
    pub async fn scan_all(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        rules: &IgnoreRules,
    ) -> Result<Vec<ChangedFile>, DetectionError> {
        let entries = self
            .api
            .list_tree(repo, Some(git_ref), self.max_depth, SKIPPED_DIRECTORIES)
            .await
            .map_err(DetectionError::Listing)?;

        let files: Vec<ChangedFile> = entries
            .into_iter()
            .filter(|e| is_markdown(&e.path))
            .map(|e| ChangedFile::added(e.path))
            .collect();
        Ok(rules.retain(files, |f| f.path.as_str()))
    }

    async fn full_rescan(
        &self,
        repo: &RepoRef,
        latest_sha: String,
        rules: &IgnoreRules,
    ) -> Result<DetectionResult, DetectionError> {
        let files = self.scan_all(repo, &latest_sha, rules).await?;
        Ok(DetectionResult {
            files,
            latest_sha,
            is_full_rescan: true,
        })
    }
}
