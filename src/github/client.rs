/*!
 * Installation-scoped GitHub REST client.
 *
 * `ContentApi` is the seam the pipeline talks through; `GitHubClient`
 * implements it against the REST API and tests substitute an in-memory
 * platform.
 */

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, error, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::credentials::CredentialManager;
use super::models::{
    ChangedFile, CommitSummary, CompareResponse, ContentEntry, EntryKind, FileContent, FileWrite,
    NewPullRequest, PullRequest, RepoRef, RepositoryInfo,
};
use super::{GITHUB_ACCEPT, GITHUB_USER_AGENT};
use crate::errors::PlatformError;

/// Repository operations the pipeline needs
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn get_repository(&self, repo: &RepoRef) -> Result<RepositoryInfo, PlatformError>;

    /// Most recent commits first
    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<CommitSummary>, PlatformError>;

    async fn compare_commits(
        &self,
        repo: &RepoRef,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, PlatformError>;

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<ContentEntry>, PlatformError>;

    /// `Ok(None)` when the file does not exist at the ref
    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContent>, PlatformError>;

    async fn put_file(&self, repo: &RepoRef, write: &FileWrite) -> Result<(), PlatformError>;

    /// Head commit of a branch, `Ok(None)` when the branch does not exist
    async fn get_branch_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, PlatformError>;

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        from_sha: &str,
    ) -> Result<(), PlatformError>;

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> Result<PullRequest, PlatformError>;

    /// Every file below the root, sorted by path, skipping named directories
    ///
    /// Directories deeper than `max_depth` levels are not entered.
    async fn list_tree(
        &self,
        repo: &RepoRef,
        git_ref: Option<&str>,
        max_depth: usize,
        skip_dirs: &[&str],
    ) -> Result<Vec<ContentEntry>, PlatformError> {
        let mut files = Vec::new();
        let mut pending = vec![(String::new(), 0usize)];

        while let Some((dir, depth)) = pending.pop() {
            let mut entries = self.list_directory(repo, &dir, git_ref).await?;
            entries.sort_by(|a, b| a.path.cmp(&b.path));

            for entry in entries {
                match entry.kind {
                    EntryKind::File => files.push(entry),
                    EntryKind::Dir => {
                        if skip_dirs.contains(&entry.name.as_str()) {
                            debug!("Skipping directory {}", entry.path);
                        } else if depth + 1 > max_depth {
                            warn!("Not descending into {}: depth limit {} reached", entry.path, max_depth);
                        } else {
                            pending.push((entry.path, depth + 1));
                        }
                    }
                    _ => {}
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// Creates content clients for an installation
pub trait InstallationConnector: Send + Sync {
    fn connect(&self, installation_id: u64) -> Arc<dyn ContentApi>;

    /// Forget any cached credentials for the installation
    fn invalidate(&self, _installation_id: u64) {}
}

/// Connects to the real GitHub API
#[derive(Debug, Clone)]
pub struct GitHubConnector {
    api_url: String,
    credentials: Arc<CredentialManager>,
    http: Client,
}

impl GitHubConnector {
    pub fn new(api_url: impl Into<String>, credentials: Arc<CredentialManager>) -> Self {
        Self {
            api_url: api_url.into(),
            credentials,
            http: default_http_client(),
        }
    }
}

impl InstallationConnector for GitHubConnector {
    fn connect(&self, installation_id: u64) -> Arc<dyn ContentApi> {
        Arc::new(GitHubClient::with_http(
            self.http.clone(),
            self.api_url.clone(),
            self.credentials.clone(),
            installation_id,
        ))
    }

    fn invalidate(&self, installation_id: u64) {
        self.credentials.invalidate(installation_id);
    }
}

fn default_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Many(Vec<ContentEntry>),
    One(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    path: String,
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// GitHub REST client acting as one App installation
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    credentials: Arc<CredentialManager>,
    installation_id: u64,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        credentials: Arc<CredentialManager>,
        installation_id: u64,
    ) -> Self {
        Self::with_http(default_http_client(), api_url.into(), credentials, installation_id)
    }

    fn with_http(
        http: Client,
        api_url: String,
        credentials: Arc<CredentialManager>,
        installation_id: u64,
    ) -> Self {
        Self {
            http,
            api_url,
            credentials,
            installation_id,
        }
    }

    /// `{api}/repos/{owner}/{name}/{segments...}` with each segment percent-encoded
    fn repo_url(&self, repo: &RepoRef, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| PlatformError::Request(format!("Invalid API url {}: {}", self.api_url, e)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                PlatformError::Request(format!("API url cannot be a base: {}", self.api_url))
            })?;
            path.pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
                .extend(segments.iter().filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn contents_url(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Url, PlatformError> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/'));
        let mut url = self.repo_url(repo, &segments)?;
        if let Some(git_ref) = git_ref {
            url.query_pairs_mut().append_pair("ref", git_ref);
        }
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, PlatformError> {
        let token = self.credentials.get_token(self.installation_id).await?;
        Ok(self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("token {}", token))
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, GITHUB_USER_AGENT))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<String, PlatformError> {
        let response = builder
            .send()
            .await
            .map_err(|e| PlatformError::Request(format!("{}: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Request(format!("{}: {}", what, e)))?;

        if status == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(what.to_string()));
        }
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate(self.installation_id);
        }
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorMessage>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            error!("GitHub API error ({}) for {}: {}", status, what, message);
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, PlatformError> {
        serde_json::from_str(body).map_err(|e| PlatformError::Decode(format!("{}: {}", what, e)))
    }
}

/// Decode the base64 payload of a contents response
fn decode_content(encoded: &str, encoding: &str, path: &str) -> Result<String, PlatformError> {
    if !encoding.is_empty() && encoding != "base64" {
        return Err(PlatformError::Decode(format!(
            "{} has unsupported encoding '{}'",
            path, encoding
        )));
    }
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| PlatformError::Decode(format!("{}: {}", path, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| PlatformError::Decode(format!("{} is not valid UTF-8: {}", path, e)))
}

fn none_if_missing<T>(result: Result<T, PlatformError>) -> Result<Option<T>, PlatformError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ContentApi for GitHubClient {
    async fn get_repository(&self, repo: &RepoRef) -> Result<RepositoryInfo, PlatformError> {
        let url = self.repo_url(repo, &[])?;
        let what = format!("repository {}", repo);
        let body = self.send(self.request(Method::GET, url).await?, &what).await?;
        Self::decode(&body, &what)
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        branch: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<CommitSummary>, PlatformError> {
        let mut url = self.repo_url(repo, &["commits"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(branch) = branch {
                query.append_pair("sha", branch);
            }
            query.append_pair("per_page", &per_page.to_string());
        }
        let what = format!("commits of {}", repo);
        let body = self.send(self.request(Method::GET, url).await?, &what).await?;
        Self::decode(&body, &what)
    }

    async fn compare_commits(
        &self,
        repo: &RepoRef,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, PlatformError> {
        let range = format!("{}...{}", base, head);
        let url = self.repo_url(repo, &["compare", range.as_str()])?;
        let what = format!("compare {} in {}", range, repo);
        let body = self.send(self.request(Method::GET, url).await?, &what).await?;
        let compare: CompareResponse = Self::decode(&body, &what)?;

        Ok(compare
            .files
            .into_iter()
            .map(|f| ChangedFile {
                path: f.filename,
                status: f.status,
                previous_path: f.previous_filename,
            })
            .collect())
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<ContentEntry>, PlatformError> {
        let url = self.contents_url(repo, path, git_ref)?;
        let what = format!("contents of '{}' in {}", path, repo);
        let body = self.send(self.request(Method::GET, url).await?, &what).await?;
        Ok(match Self::decode::<ContentsResponse>(&body, &what)? {
            ContentsResponse::Many(entries) => entries,
            ContentsResponse::One(entry) => vec![entry],
        })
    }

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContent>, PlatformError> {
        let url = self.contents_url(repo, path, git_ref)?;
        let what = format!("file '{}' in {}", path, repo);
        let body = match none_if_missing(self.send(self.request(Method::GET, url).await?, &what).await)? {
            Some(body) => body,
            None => return Ok(None),
        };
        let file: FileResponse = Self::decode(&body, &what)?;
        let content = decode_content(&file.content, &file.encoding, &file.path)?;
        Ok(Some(FileContent {
            path: file.path,
            content,
            sha: file.sha,
        }))
    }

    async fn put_file(&self, repo: &RepoRef, write: &FileWrite) -> Result<(), PlatformError> {
        let url = self.contents_url(repo, &write.path, None)?;
        let mut payload = serde_json::json!({
            "message": write.message,
            "content": STANDARD.encode(write.content.as_bytes()),
            "branch": write.branch,
        });
        if let Some(sha) = &write.sha {
            payload["sha"] = serde_json::Value::String(sha.clone());
        }
        let what = format!("write '{}' on {}", write.path, write.branch);
        self.send(self.request(Method::PUT, url).await?.json(&payload), &what)
            .await?;
        Ok(())
    }

    async fn get_branch_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, PlatformError> {
        let mut segments = vec!["git", "ref", "heads"];
        segments.extend(branch.split('/'));
        let url = self.repo_url(repo, &segments)?;
        let what = format!("branch {} in {}", branch, repo);
        match none_if_missing(self.send(self.request(Method::GET, url).await?, &what).await)? {
            Some(body) => {
                let git_ref: GitRef = Self::decode(&body, &what)?;
                Ok(Some(git_ref.object.sha))
            }
            None => Ok(None),
        }
    }

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        from_sha: &str,
    ) -> Result<(), PlatformError> {
        let url = self.repo_url(repo, &["git", "refs"])?;
        let payload = serde_json::json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": from_sha,
        });
        let what = format!("create branch {} in {}", branch, repo);
        self.send(self.request(Method::POST, url).await?.json(&payload), &what)
            .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> Result<PullRequest, PlatformError> {
        let url = self.repo_url(repo, &["pulls"])?;
        let what = format!("pull request {} -> {} in {}", request.head, request.base, repo);
        let body = self
            .send(self.request(Method::POST, url).await?.json(request), &what)
            .await?;
        Self::decode(&body, &what)
    }
}
