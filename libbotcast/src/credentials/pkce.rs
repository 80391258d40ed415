//! Authorization-code + PKCE (RFC 7636) helpers used by `botcast-auth`

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{Rng, RngCore};
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{CredentialError, Result};

/// Verifier and the S256 challenge derived from it
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let verifier = code_verifier(rng);
        let challenge = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// 64 random bytes, base64url without padding (86 chars, inside 43..=128)
pub fn code_verifier<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Opaque anti-CSRF value echoed back by the callback
pub fn random_state<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Parameters for the browser authorization request
#[derive(Debug, Clone)]
pub struct AuthorizeRequest<'a> {
    pub authorize_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub state: &'a str,
    pub code_challenge: &'a str,
}

impl AuthorizeRequest<'_> {
    pub fn url(&self) -> Result<Url> {
        let scope = self.scopes.join(" ");
        Url::parse_with_params(
            self.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id),
                ("redirect_uri", self.redirect_uri),
                ("scope", scope.as_str()),
                ("state", self.state),
                ("code_challenge", self.code_challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| CredentialError::Authorization(format!("bad authorize URL: {}", e)).into())
    }
}

/// Where the local callback listener must bind, taken from the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RedirectTarget {
    pub fn parse(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri).map_err(|e| {
            CredentialError::Authorization(format!("bad redirect URI {}: {}", redirect_uri, e))
        })?;
        if url.scheme() != "http" {
            return Err(CredentialError::Authorization(format!(
                "redirect URI must be plain http on a local address, got {}",
                redirect_uri
            ))
            .into());
        }
        let host = url
            .host_str()
            .ok_or_else(|| CredentialError::Authorization("redirect URI has no host".to_string()))?
            .to_string();
        Ok(Self {
            host,
            port: url.port_or_known_default().unwrap_or(80),
            path: url.path().to_string(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Query parameters delivered to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    pub code: String,
    pub state: String,
}

/// Raw query string of the redirect, as the provider sent it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallbackQuery {
    /// # Errors
    ///
    /// Fails when the provider reported an `error`, or when `code`/`state`
    /// are missing.
    pub fn into_callback(self) -> Result<Callback> {
        if let Some(error) = self.error {
            return Err(
                CredentialError::Authorization(format!("provider returned {}", error)).into(),
            );
        }
        match (self.code.filter(|c| !c.is_empty()), self.state) {
            (None, _) => Err(CredentialError::Authorization(
                "authorization code not found in callback".to_string(),
            )
            .into()),
            (Some(_), None) => {
                Err(CredentialError::Authorization("state missing from callback".to_string()).into())
            }
            (Some(code), Some(state)) => Ok(Callback { code, state }),
        }
    }
}

/// Reject a callback whose state does not match what was sent
pub fn verify_state(callback: &Callback, expected: &str) -> Result<()> {
    if callback.state != expected {
        return Err(CredentialError::Authorization(
            "state mismatch; possible CSRF".to_string(),
        )
        .into());
    }
    Ok(())
}
