/*!
 * Error types for the docglot application.
 *
 * This module contains custom error types for the different layers of the
 * pipeline, using the thiserror crate for ergonomic error definitions.
 * Store and controller code works with `anyhow::Result` and wraps these
 * with context at its boundary.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Provider-specific error code, when the body carried one
        code: Option<String>,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors raised while minting GitHub App installation tokens
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("GitHub App id is not configured")]
    MissingAppId,

    #[error("Private key file not found: {0}")]
    MissingPrivateKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Failed to sign app assertion: {0}")]
    Signing(String),

    /// The platform refused the token exchange
    #[error("Failed to get installation token: {status} - {message}")]
    Exchange { status: u16, message: String },

    #[error("Token exchange request failed: {0}")]
    Request(String),

    #[error("Malformed token exchange response: {0}")]
    Decode(String),
}

/// Errors from the repository content API
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("GitHub request failed: {0}")]
    Request(String),

    #[error("Failed to decode GitHub response: {0}")]
    Decode(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Api { status: 404, .. })
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }
}

/// Errors that abort change detection
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Failed to fetch latest commit: {0}")]
    LatestCommit(#[source] PlatformError),

    #[error("No commits found on branch {0}")]
    EmptyHistory(String),

    #[error("Failed to compare {base}...{head}: {source}")]
    Compare {
        base: String,
        head: String,
        #[source]
        source: PlatformError,
    },

    #[error("Failed to scan commit history: {0}")]
    History(#[source] PlatformError),

    #[error("Failed to list repository contents: {0}")]
    Listing(#[source] PlatformError),
}

impl DetectionError {
    /// True when the failure came from token issuance rather than the repository
    pub fn is_credential_failure(&self) -> bool {
        match self {
            Self::LatestCommit(e) | Self::History(e) | Self::Listing(e) => e.is_credential(),
            Self::Compare { source, .. } => source.is_credential(),
            Self::EmptyHistory(_) => false,
        }
    }
}
