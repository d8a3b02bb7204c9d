/*!
 * Common test utilities for the docglot test suite
 *
 * `FakePlatform` is an in-memory GitHub: a default branch with linear
 * history, extra branches, and the blob-hash rules of the contents API.
 */

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use docglot::app_controller::{Controller, PipelineSettings};
use docglot::clock::{Clock, ManualClock};
use docglot::database::Store;
use docglot::database::models::{NewRepository, RepositoryRecord};
use docglot::errors::{CredentialError, PlatformError};
use docglot::github::client::{ContentApi, InstallationConnector};
use docglot::github::credentials::{IssuedToken, TokenIssuer};
use docglot::github::models::{
    ChangeStatus, ChangedFile, CommitSummary, ContentEntry, EntryKind, FileContent, FileWrite,
    NewPullRequest, PullRequest, RepoRef, RepositoryInfo,
};
use docglot::providers::StaticProvider;
use docglot::providers::mock::MockProvider;

pub const OWNER: &str = "acme";
pub const REPO: &str = "docs";
pub const DEFAULT_BRANCH: &str = "main";
pub const INSTALLATION_ID: u64 = 42;

/// Path of a test fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A fixed instant used as the start of every manual clock
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Route crate logs to the test harness; `RUST_LOG=debug` shows them
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

/// Deterministic stand-in for a git blob hash
pub fn blob_sha(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

type Snapshot = BTreeMap<String, String>;

#[derive(Default)]
struct PlatformState {
    /// Default branch commits, newest first
    history: Vec<String>,
    snapshots: HashMap<String, Snapshot>,
    /// Branch name to head commit
    branches: BTreeMap<String, String>,
    writes: Vec<FileWrite>,
    pulls: Vec<NewPullRequest>,
    commit_counter: u64,
}

impl PlatformState {
    fn resolve(&self, git_ref: Option<&str>) -> Option<&Snapshot> {
        let name = git_ref.unwrap_or(DEFAULT_BRANCH);
        let sha = self.branches.get(name).map(String::as_str).unwrap_or(name);
        self.snapshots.get(sha)
    }

    fn next_commit(&mut self, prefix: &str) -> String {
        self.commit_counter += 1;
        format!("{}{}", prefix, self.commit_counter)
    }
}

/// In-memory repository host
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    /// Compare calls fail with a 500 while set
    pub fail_compare: AtomicBool,
    /// Pull request creation fails with a 422 while set
    pub fail_pull_request: AtomicBool,
    /// Every call fails as if the installation token could not be issued
    pub fail_credentials: AtomicBool,
    /// Writes to these paths fail with a 500
    fail_put: Mutex<HashSet<String>>,
}

impl FakePlatform {
    /// A repository whose first commit on the default branch holds `files`
    pub fn with_files(sha: &str, files: &[(&str, &str)]) -> Arc<Self> {
        let platform = Arc::new(Self {
            state: Mutex::new(PlatformState::default()),
            fail_compare: AtomicBool::new(false),
            fail_pull_request: AtomicBool::new(false),
            fail_credentials: AtomicBool::new(false),
            fail_put: Mutex::new(HashSet::new()),
        });
        platform.force_push(sha, files);
        platform
    }

    /// New commit on the default branch applying `changes`; `None` deletes the path
    pub fn push(&self, sha: &str, changes: &[(&str, Option<&str>)]) {
        let mut state = self.state.lock();
        let mut snapshot = state.resolve(Some(DEFAULT_BRANCH)).cloned().unwrap_or_default();
        for (path, content) in changes {
            match content {
                Some(content) => snapshot.insert(path.to_string(), content.to_string()),
                None => snapshot.remove(*path),
            };
        }
        state.snapshots.insert(sha.to_string(), snapshot);
        state.history.insert(0, sha.to_string());
        state.branches.insert(DEFAULT_BRANCH.to_string(), sha.to_string());
    }

    /// Replace the default branch history with a single commit
    pub fn force_push(&self, sha: &str, files: &[(&str, &str)]) {
        let mut state = self.state.lock();
        let snapshot: Snapshot = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        state.snapshots.insert(sha.to_string(), snapshot);
        state.history = vec![sha.to_string()];
        state.branches.insert(DEFAULT_BRANCH.to_string(), sha.to_string());
    }

    /// Create a branch directly, bypassing the API
    pub fn add_branch(&self, name: &str) {
        let mut state = self.state.lock();
        let head = state.branches.get(DEFAULT_BRANCH).cloned().unwrap_or_default();
        state.branches.insert(name.to_string(), head);
    }

    /// Make every later write to `path` fail
    pub fn fail_put_on(&self, path: &str) {
        self.fail_put.lock().insert(path.to_string());
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.state.lock().branches.keys().cloned().collect()
    }

    pub fn file_on(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock();
        state.resolve(Some(branch)).and_then(|s| s.get(path).cloned())
    }

    pub fn writes(&self) -> Vec<FileWrite> {
        self.state.lock().writes.clone()
    }

    pub fn pulls(&self) -> Vec<NewPullRequest> {
        self.state.lock().pulls.clone()
    }

    pub fn head(&self) -> String {
        self.state.lock().history[0].clone()
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(PlatformError::Credential(CredentialError::Exchange {
                status: 401,
                message: "Bad credentials".to_string(),
            }));
        }
        Ok(())
    }
}

fn api_error(status: u16, message: &str) -> PlatformError {
    PlatformError::Api {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl ContentApi for FakePlatform {
    async fn get_repository(&self, repo: &RepoRef) -> Result<RepositoryInfo, PlatformError> {
        self.check_credentials()?;
        Ok(RepositoryInfo {
            full_name: repo.to_string(),
            default_branch: DEFAULT_BRANCH.to_string(),
        })
    }

    async fn list_commits(
        &self,
        _repo: &RepoRef,
        branch: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<CommitSummary>, PlatformError> {
        self.check_credentials()?;
        let state = self.state.lock();
        let branch = branch.unwrap_or(DEFAULT_BRANCH);
        let shas: Vec<String> = if branch == DEFAULT_BRANCH {
            state.history.clone()
        } else {
            state.branches.get(branch).cloned().into_iter().collect()
        };
        Ok(shas
            .into_iter()
            .take(per_page as usize)
            .map(|sha| CommitSummary { sha })
            .collect())
    }

    async fn compare_commits(
        &self,
        _repo: &RepoRef,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, PlatformError> {
        self.check_credentials()?;
        if self.fail_compare.load(Ordering::SeqCst) {
            return Err(api_error(500, "Server Error"));
        }
        let state = self.state.lock();
        if !state.history.iter().any(|sha| sha == base) {
            return Err(PlatformError::NotFound(format!("compare {}...{}", base, head)));
        }
        let (Some(before), Some(after)) = (state.snapshots.get(base), state.snapshots.get(head)) else {
            return Err(PlatformError::NotFound(format!("compare {}...{}", base, head)));
        };

        let paths: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        let mut changed = Vec::new();
        for path in paths {
            let status = match (before.get(path), after.get(path)) {
                (None, Some(_)) => ChangeStatus::Added,
                (Some(_), None) => ChangeStatus::Removed,
                (Some(a), Some(b)) if a != b => ChangeStatus::Modified,
                _ => continue,
            };
            changed.push(ChangedFile {
                path: path.clone(),
                status,
                previous_path: None,
            });
        }
        Ok(changed)
    }

    async fn list_directory(
        &self,
        _repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<ContentEntry>, PlatformError> {
        self.check_credentials()?;
        let state = self.state.lock();
        let snapshot = state
            .resolve(git_ref)
            .ok_or_else(|| PlatformError::NotFound(format!("ref {:?}", git_ref)))?;
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };

        let mut entries: BTreeMap<String, ContentEntry> = BTreeMap::new();
        for (file_path, content) in snapshot {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    entries.entry(dir.to_string()).or_insert_with(|| ContentEntry {
                        name: dir.to_string(),
                        path: format!("{}{}", prefix, dir),
                        kind: EntryKind::Dir,
                        sha: String::new(),
                    });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        ContentEntry {
                            name: rest.to_string(),
                            path: file_path.clone(),
                            kind: EntryKind::File,
                            sha: blob_sha(content),
                        },
                    );
                }
            }
        }

        if entries.is_empty() && !path.is_empty() {
            return Err(PlatformError::NotFound(format!("contents of '{}'", path)));
        }
        Ok(entries.into_values().collect())
    }

    async fn get_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContent>, PlatformError> {
        self.check_credentials()?;
        let state = self.state.lock();
        Ok(state
            .resolve(git_ref)
            .and_then(|snapshot| snapshot.get(path))
            .map(|content| FileContent {
                path: path.to_string(),
                content: content.clone(),
                sha: blob_sha(content),
            }))
    }

    async fn put_file(&self, _repo: &RepoRef, write: &FileWrite) -> Result<(), PlatformError> {
        self.check_credentials()?;
        if self.fail_put.lock().contains(&write.path) {
            return Err(api_error(500, "Server Error"));
        }
        let mut state = self.state.lock();
        let mut snapshot = state
            .branches
            .get(&write.branch)
            .and_then(|head| state.snapshots.get(head))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("branch {}", write.branch)))?;

        match (snapshot.get(&write.path), &write.sha) {
            (Some(_), None) => {
                return Err(api_error(422, "Invalid request. \"sha\" wasn't supplied."));
            }
            (Some(existing), Some(sha)) if blob_sha(existing) != *sha => {
                return Err(api_error(409, &format!("{} does not match {}", write.path, sha)));
            }
            _ => {}
        }

        snapshot.insert(write.path.clone(), write.content.clone());
        let commit = state.next_commit("w");
        state.snapshots.insert(commit.clone(), snapshot);
        state.branches.insert(write.branch.clone(), commit.clone());
        if write.branch == DEFAULT_BRANCH {
            state.history.insert(0, commit);
        }
        state.writes.push(write.clone());
        Ok(())
    }

    async fn get_branch_head(
        &self,
        _repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, PlatformError> {
        self.check_credentials()?;
        Ok(self.state.lock().branches.get(branch).cloned())
    }

    async fn create_branch(
        &self,
        _repo: &RepoRef,
        branch: &str,
        from_sha: &str,
    ) -> Result<(), PlatformError> {
        self.check_credentials()?;
        let mut state = self.state.lock();
        if state.branches.contains_key(branch) {
            return Err(api_error(422, "Reference already exists"));
        }
        if !state.snapshots.contains_key(from_sha) {
            return Err(api_error(422, "Object does not exist"));
        }
        state.branches.insert(branch.to_string(), from_sha.to_string());
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> Result<PullRequest, PlatformError> {
        self.check_credentials()?;
        if self.fail_pull_request.load(Ordering::SeqCst) {
            return Err(api_error(422, "A pull request already exists"));
        }
        let mut state = self.state.lock();
        state.pulls.push(request.clone());
        let number = state.pulls.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
        })
    }
}

/// Hands out the same fake platform for every installation
pub struct FakeConnector {
    pub platform: Arc<FakePlatform>,
    pub invalidated: Mutex<Vec<u64>>,
}

impl FakeConnector {
    pub fn new(platform: Arc<FakePlatform>) -> Arc<Self> {
        Arc::new(Self {
            platform,
            invalidated: Mutex::new(Vec::new()),
        })
    }
}

impl InstallationConnector for FakeConnector {
    fn connect(&self, _installation_id: u64) -> Arc<dyn ContentApi> {
        self.platform.clone()
    }

    fn invalidate(&self, installation_id: u64) {
        self.invalidated.lock().push(installation_id);
    }
}

/// Token issuer that counts exchanges
#[derive(Debug, Default)]
pub struct CountingIssuer {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Expiry reported by the platform, if any
    pub expires_at: Mutex<Option<DateTime<Utc>>>,
}

#[async_trait]
impl TokenIssuer for CountingIssuer {
    async fn issue(&self, installation_id: u64) -> Result<IssuedToken, CredentialError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Yield so concurrent callers overlap
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(CredentialError::Exchange {
                status: 401,
                message: "A JSON web token could not be decoded".to_string(),
            });
        }
        Ok(IssuedToken {
            token: format!("token-{}-{}", installation_id, call),
            expires_at: *self.expires_at.lock(),
        })
    }
}

pub fn repo_ref() -> RepoRef {
    RepoRef::new(OWNER, REPO)
}

pub fn new_repository(targets: &[&str]) -> NewRepository {
    NewRepository {
        owner: OWNER.to_string(),
        name: REPO.to_string(),
        installation_id: INSTALLATION_ID,
        default_branch: DEFAULT_BRANCH.to_string(),
        base_language: "en".to_string(),
        target_languages: targets.iter().map(|t| t.to_string()).collect(),
        ignore_rules: None,
    }
}

/// Controller over an in-memory store and the given platform and provider
pub struct Harness {
    pub controller: Controller,
    pub store: Store,
    pub platform: Arc<FakePlatform>,
    pub connector: Arc<FakeConnector>,
    pub provider: MockProvider,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new(platform: Arc<FakePlatform>, provider: MockProvider) -> Result<Self> {
        Self::with_settings(platform, provider, PipelineSettings::default()).await
    }

    pub async fn with_settings(
        platform: Arc<FakePlatform>,
        provider: MockProvider,
        settings: PipelineSettings,
    ) -> Result<Self> {
        init_logging();
        let clock = manual_clock();
        let store = Store::new_in_memory(clock.clone())?;
        let connector = FakeConnector::new(platform.clone());
        let controller = Controller::start(
            store.clone(),
            connector.clone(),
            Arc::new(StaticProvider(Arc::new(provider.clone()))),
            clock.clone() as Arc<dyn Clock>,
            settings,
        )
        .await?;

        Ok(Self {
            controller,
            store,
            platform,
            connector,
            provider,
            clock,
        })
    }

    pub async fn register(&self, targets: &[&str]) -> Result<RepositoryRecord> {
        self.store.add_repository(new_repository(targets)).await
    }
}
