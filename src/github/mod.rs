/*!
 * GitHub access.
 *
 * - `credentials`: App assertion signing and installation token cache
 * - `client`: installation-scoped REST client for repository contents
 * - `models`: request and response shapes
 */

pub mod client;
pub mod credentials;
pub mod models;

pub use client::{ContentApi, GitHubClient, GitHubConnector, InstallationConnector};
pub use credentials::{AppTokenIssuer, CredentialManager, KeySource, MemoryTokenCache};
pub use models::{ChangeStatus, ChangedFile, FileContent, FileWrite, RepoRef};

pub(crate) const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub(crate) const GITHUB_USER_AGENT: &str = concat!("docglot/", env!("CARGO_PKG_VERSION"));
