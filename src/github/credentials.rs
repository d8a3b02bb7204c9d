/*!
 * GitHub App installation credentials.
 *
 * An installation token is obtained by signing a short-lived RS256 app
 * assertion with the App's private key and exchanging it at
 * `POST /app/installations/{id}/access_tokens`. Tokens are cached per
 * installation and refreshed under a per-installation lock, so concurrent
 * callers trigger at most one exchange.
 */

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use super::models::{AccessTokenResponse, Installation};
use super::{GITHUB_ACCEPT, GITHUB_USER_AGENT};
use crate::clock::Clock;
use crate::errors::CredentialError;

/// How long a cached token is trusted
pub const TOKEN_LIFETIME_MINUTES: i64 = 55;

/// Cached tokens are dropped this long before the platform's own expiry
pub const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Backdating of `iat` to absorb clock drift
const ASSERTION_BACKDATE_SECS: i64 = 60;

/// Assertions must expire within ten minutes of issue
const ASSERTION_LIFETIME_SECS: i64 = 9 * 60;

/// A token and the instant the cache stops trusting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token as handed back by an issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Platform reported expiry, when known
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage for installation tokens
pub trait TokenCache: Send + Sync + Debug {
    fn get(&self, installation_id: u64) -> Option<InstallationToken>;
    fn put(&self, installation_id: u64, token: InstallationToken);
    fn remove(&self, installation_id: u64);
}

/// Process-local token cache
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: RwLock<HashMap<u64, InstallationToken>>,
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, installation_id: u64) -> Option<InstallationToken> {
        self.entries.read().get(&installation_id).cloned()
    }

    fn put(&self, installation_id: u64, token: InstallationToken) {
        self.entries.write().insert(installation_id, token);
    }

    fn remove(&self, installation_id: u64) {
        self.entries.write().remove(&installation_id);
    }
}

/// Mints a fresh installation token
#[async_trait]
pub trait TokenIssuer: Send + Sync + Debug {
    async fn issue(&self, installation_id: u64) -> Result<IssuedToken, CredentialError>;
}

/// Where the App's private key comes from
#[derive(Clone)]
pub enum KeySource {
    File(PathBuf),
    Pem(Vec<u8>),
}

impl Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Pem(_) => f.write_str("Pem(..)"),
        }
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Issues tokens by signing an app assertion and exchanging it with GitHub
pub struct AppTokenIssuer {
    app_id: String,
    key: KeySource,
    api_url: String,
    http: Client,
    clock: Arc<dyn Clock>,
}

impl Debug for AppTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppTokenIssuer")
            .field("app_id", &self.app_id)
            .field("key", &self.key)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl AppTokenIssuer {
    pub fn new(
        app_id: impl Into<String>,
        key: KeySource,
        api_url: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            key,
            api_url: api_url.into(),
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            clock,
        }
    }

    fn signing_key(&self) -> Result<EncodingKey, CredentialError> {
        let pem = match &self.key {
            KeySource::Pem(bytes) => bytes.clone(),
            KeySource::File(path) => {
                if !path.exists() {
                    return Err(CredentialError::MissingPrivateKey(path.display().to_string()));
                }
                std::fs::read(path).map_err(|e| {
                    CredentialError::MissingPrivateKey(format!("{}: {}", path.display(), e))
                })?
            }
        };
        EncodingKey::from_rsa_pem(&pem).map_err(|e| CredentialError::InvalidPrivateKey(e.to_string()))
    }

    /// Signed RS256 assertion identifying the App
    pub fn app_assertion(&self) -> Result<String, CredentialError> {
        if self.app_id.trim().is_empty() {
            return Err(CredentialError::MissingAppId);
        }
        let key = self.signing_key()?;
        let now = self.clock.now().timestamp();
        let claims = AppClaims {
            iat: now - ASSERTION_BACKDATE_SECS,
            exp: now + ASSERTION_LIFETIME_SECS,
            iss: self.app_id.clone(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }

    fn app_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, CredentialError> {
        let assertion = self.app_assertion()?;
        let response = request
            .bearer_auth(assertion)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, GITHUB_USER_AGENT)
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;
        if !status.is_success() {
            error!("GitHub App request failed ({}): {}", status, body);
            return Err(CredentialError::Exchange {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }

    /// Installations of this App, useful for finding an installation id
    pub async fn list_installations(&self) -> Result<Vec<Installation>, CredentialError> {
        let body = self
            .send(self.http.get(self.app_url("app/installations")))
            .await?;
        serde_json::from_str(&body).map_err(|e| CredentialError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TokenIssuer for AppTokenIssuer {
    async fn issue(&self, installation_id: u64) -> Result<IssuedToken, CredentialError> {
        let url = self.app_url(&format!("app/installations/{}/access_tokens", installation_id));
        debug!("Requesting installation token for installation {}", installation_id);

        let body = self.send(self.http.post(&url)).await?;
        let parsed: AccessTokenResponse =
            serde_json::from_str(&body).map_err(|e| CredentialError::Decode(e.to_string()))?;
        if parsed.token.is_empty() {
            return Err(CredentialError::Decode("empty token".to_string()));
        }
        Ok(IssuedToken {
            token: parsed.token,
            expires_at: parsed.expires_at,
        })
    }
}

/// Hands out cached installation tokens, minting on miss or expiry
pub struct CredentialManager {
    issuer: Arc<dyn TokenIssuer>,
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    refresh_locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("issuer", &self.issuer)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        cache: Arc<dyn TokenCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer,
            cache,
            clock,
            lifetime: Duration::minutes(TOKEN_LIFETIME_MINUTES),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// A valid token for the installation
    pub async fn get_token(&self, installation_id: u64) -> Result<String, CredentialError> {
        if let Some(token) = self.fresh(installation_id) {
            return Ok(token);
        }

        let lock = self.refresh_lock(installation_id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.fresh(installation_id) {
            return Ok(token);
        }

        let issued = self.issuer.issue(installation_id).await?;
        let now = self.clock.now();
        let mut expires_at = now + self.lifetime;
        if let Some(platform_expiry) = issued.expires_at {
            let trusted_until = platform_expiry - Duration::minutes(EXPIRY_MARGIN_MINUTES);
            if trusted_until < expires_at {
                expires_at = trusted_until;
            }
        }

        info!("Minted installation token for installation {}", installation_id);
        self.cache.put(
            installation_id,
            InstallationToken {
                token: issued.token.clone(),
                expires_at,
            },
        );
        Ok(issued.token)
    }

    /// Drop the cached token so the next call mints a new one
    pub fn invalidate(&self, installation_id: u64) {
        debug!("Invalidating cached token for installation {}", installation_id);
        self.cache.remove(installation_id);
    }

    fn fresh(&self, installation_id: u64) -> Option<String> {
        self.cache
            .get(installation_id)
            .filter(|cached| cached.expires_at > self.clock.now())
            .map(|cached| cached.token)
    }

    fn refresh_lock(&self, installation_id: u64) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_locks
            .lock()
            .entry(installation_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
