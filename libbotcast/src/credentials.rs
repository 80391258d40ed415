//! OAuth2 credential lifecycle for the publishing account
//!
//! # Architecture
//!
//! - [`Credential`]: access token, refresh token and the instant the access
//!   token stops being usable. `expires_at` already has [`EXPIRY_MARGIN_SECS`]
//!   subtracted, so a token is never sent during its last minute.
//! - [`TokenExchange`]: the token endpoint (refresh and code exchange).
//!   [`HttpTokenExchange`] is the real implementation.
//! - [`CredentialStore`]: holds the current credential, refreshes it on
//!   demand and persists every new one to `tokens.json`.
//! - [`pkce`]: helpers for the one-time authorization-code handshake.
//!
//! # Example
//!
//! ```no_run
//! use libbotcast::credentials::{CredentialStore, HttpTokenExchange};
//!
//! # async fn example() -> libbotcast::Result<()> {
//! let exchange = HttpTokenExchange::new(
//!     "https://api.twitter.com/2/oauth2/token",
//!     "client-id",
//!     "http://127.0.0.1:8080/callback",
//!     std::time::Duration::from_secs(30),
//! )?;
//! let mut store = CredentialStore::load("tokens.json", Box::new(exchange))?;
//!
//! // Cheap when the token is still valid; refreshes and saves otherwise
//! let credential = store.ensure_fresh().await?;
//! # let _ = credential;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CredentialError, Result, StorageError};

pub mod pkce;

#[cfg(test)]
mod tests;

/// Seconds shaved off every issued lifetime
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token endpoint response body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// On-disk form of a [`Credential`]
#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Unix seconds, margin already applied
    expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

#[derive(Debug)]
pub struct Credential {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: DateTime<Utc>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl Credential {
    /// Build from a token response received at `now`.
    ///
    /// `previous_refresh` is kept when the response carries no new refresh token.
    ///
    /// # Errors
    ///
    /// `CredentialError::Malformed` when `expires_in` does not fit a timestamp.
    pub fn from_response(
        response: TokenResponse,
        now: DateTime<Utc>,
        previous_refresh: Option<SecretString>,
    ) -> Result<Self> {
        let lifetime = response.expires_in.unwrap_or(0);
        let expires_at = chrono::Duration::try_seconds(lifetime.saturating_sub(EXPIRY_MARGIN_SECS))
            .and_then(|remaining| now.checked_add_signed(remaining))
            .ok_or_else(|| {
                CredentialError::Malformed(format!("expires_in out of range: {}", lifetime))
            })?;
        Ok(Self {
            access_token: SecretString::from(response.access_token),
            refresh_token: response
                .refresh_token
                .map(SecretString::from)
                .or(previous_refresh),
            expires_at,
            token_type: response.token_type,
            scope: response.scope,
        })
    }

    /// Usable at `now`
    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.expose_secret().is_empty() && self.expires_at > now
    }

    pub fn valid(&self) -> bool {
        self.valid_at(Utc::now())
    }

    fn to_stored(&self) -> StoredTokens {
        StoredTokens {
            access_token: self.access_token.expose_secret().to_string(),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            expires_at: self.expires_at.timestamp(),
            token_type: self.token_type.clone(),
            scope: self.scope.clone(),
        }
    }

    fn from_stored(stored: StoredTokens) -> Result<Self> {
        let expires_at = Utc
            .timestamp_opt(stored.expires_at, 0)
            .single()
            .ok_or_else(|| {
                CredentialError::Malformed(format!("expires_at out of range: {}", stored.expires_at))
            })?;
        Ok(Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: stored.refresh_token.map(SecretString::from),
            expires_at,
            token_type: stored.token_type,
            scope: stored.scope,
        })
    }
}

/// Token endpoint operations
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange a refresh token for a new access token
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Exchange` for a non-success status.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;

    /// Exchange an authorization code plus PKCE verifier for the first tokens
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse>;
}

/// [`TokenExchange`] over HTTP, form-encoded per RFC 6749
pub struct HttpTokenExchange {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl HttpTokenExchange {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Network(e.to_string()))?;
        Ok(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        })
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            return Err(CredentialError::Exchange {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|e| CredentialError::Malformed(e.to_string()).into())
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
        ])
        .await
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("code_verifier", code_verifier),
            ("code", code),
        ])
        .await
    }
}

/// Write tokens via a temp file and rename, owner-readable only on Unix
pub fn save_credential(path: &Path, credential: &Credential) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
    }
    let json =
        serde_json::to_string_pretty(&credential.to_stored()).map_err(StorageError::Json)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(StorageError::Io)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&tmp, perms).map_err(StorageError::Io)?;
    }

    std::fs::rename(&tmp, path).map_err(StorageError::Io)?;
    Ok(())
}

/// Read tokens written by [`save_credential`]
pub fn load_credential(path: &Path) -> Result<Credential> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CredentialError::NotFound(path.display().to_string()).into())
        }
        Err(e) => return Err(StorageError::Io(e).into()),
    };
    let stored: StoredTokens =
        serde_json::from_str(&content).map_err(|e| CredentialError::Malformed(e.to_string()))?;
    Credential::from_stored(stored)
}

/// Current credential plus the means to renew it
pub struct CredentialStore {
    path: Option<PathBuf>,
    credential: Credential,
    exchange: Box<dyn TokenExchange>,
}

impl CredentialStore {
    /// Store backed by `path`
    ///
    /// # Errors
    ///
    /// `CredentialError::NotFound` when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>, exchange: Box<dyn TokenExchange>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let credential = load_credential(&path)?;
        Ok(Self {
            path: Some(path),
            credential,
            exchange,
        })
    }

    /// Store that never touches disk
    pub fn in_memory(credential: Credential, exchange: Box<dyn TokenExchange>) -> Self {
        Self {
            path: None,
            credential,
            exchange,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub async fn ensure_fresh(&mut self) -> Result<&Credential> {
        self.ensure_fresh_at(Utc::now()).await
    }

    /// Return the held credential if valid at `now`, otherwise refresh,
    /// persist and return the new one
    pub async fn ensure_fresh_at(&mut self, now: DateTime<Utc>) -> Result<&Credential> {
        if self.credential.valid_at(now) {
            return Ok(&self.credential);
        }

        let refresh_token = self
            .credential
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .ok_or_else(|| {
                CredentialError::Authorization(
                    "access token expired and no refresh token is stored".to_string(),
                )
            })?;

        info!("Refreshing access token");
        let response = self.exchange.refresh(&refresh_token).await?;
        let previous = Some(SecretString::from(refresh_token));
        let refreshed = Credential::from_response(response, Utc::now().max(now), previous)?;

        if let Some(path) = &self.path {
            save_credential(path, &refreshed)?;
            debug!("Saved refreshed tokens to {}", path.display());
        }
        self.credential = refreshed;
        info!(
            "Token refreshed, valid until {}",
            self.credential.expires_at.to_rfc3339()
        );
        Ok(&self.credential)
    }
}
