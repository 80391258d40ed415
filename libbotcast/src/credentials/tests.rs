use super::*;
use crate::error::BotcastError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Token endpoint double that counts refresh calls
struct CountingExchange {
    calls: Arc<AtomicUsize>,
    seen_refresh: Arc<Mutex<Vec<String>>>,
    fail_status: Option<u16>,
    rotate_refresh: bool,
    expires_in: Option<i64>,
}

impl CountingExchange {
    fn ok(calls: Arc<AtomicUsize>) -> Self {
        Self {
            calls,
            seen_refresh: Arc::new(Mutex::new(Vec::new())),
            fail_status: None,
            rotate_refresh: true,
            expires_in: Some(7200),
        }
    }
}

#[async_trait]
impl TokenExchange for CountingExchange {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_refresh
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if let Some(status) = self.fail_status {
            return Err(CredentialError::Exchange {
                status,
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            }
            .into());
        }
        Ok(TokenResponse {
            access_token: format!("access-{}", n),
            refresh_token: self.rotate_refresh.then(|| format!("refresh-{}", n)),
            expires_in: self.expires_in,
            token_type: Some("bearer".to_string()),
            scope: None,
        })
    }

    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenResponse> {
        unreachable!("not used by the store")
    }
}

fn credential(expires_at: DateTime<Utc>, refresh: Option<&str>) -> Credential {
    Credential {
        access_token: SecretString::from("old-access".to_string()),
        refresh_token: refresh.map(|r| SecretString::from(r.to_string())),
        expires_at,
        token_type: Some("bearer".to_string()),
        scope: Some("tweet.write".to_string()),
    }
}

#[test]
fn test_from_response_applies_margin() {
    let now = Utc::now();
    let response = TokenResponse {
        access_token: "a".to_string(),
        refresh_token: Some("r".to_string()),
        expires_in: Some(7200),
        token_type: None,
        scope: None,
    };
    let cred = Credential::from_response(response, now, None).unwrap();
    assert_eq!(
        cred.expires_at,
        now + chrono::Duration::seconds(7200 - EXPIRY_MARGIN_SECS)
    );
    assert!(cred.valid_at(now));
}

#[test]
fn test_from_response_keeps_previous_refresh_token() {
    let response = TokenResponse {
        access_token: "a".to_string(),
        refresh_token: None,
        expires_in: Some(3600),
        token_type: None,
        scope: None,
    };
    let previous = Some(SecretString::from("keep-me".to_string()));
    let cred = Credential::from_response(response, Utc::now(), previous).unwrap();
    assert_eq!(
        cred.refresh_token.as_ref().map(|t| t.expose_secret()),
        Some("keep-me")
    );
}

#[test]
fn test_from_response_rejects_out_of_range_lifetime() {
    for expires_in in [i64::MAX / 100, i64::MAX, i64::MIN] {
        let response = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_in: Some(expires_in),
            token_type: None,
            scope: None,
        };
        let err = Credential::from_response(response, Utc::now(), None).unwrap_err();
        assert!(
            matches!(err, BotcastError::Credential(CredentialError::Malformed(_))),
            "expires_in {} gave {:?}",
            expires_in,
            err
        );
    }
}

#[tokio::test]
async fn test_oversized_lifetime_fails_refresh_and_keeps_credential() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut exchange = CountingExchange::ok(calls.clone());
    exchange.expires_in = Some(i64::MAX / 100);
    let now = Utc::now();
    let mut store = CredentialStore::in_memory(
        credential(now - chrono::Duration::seconds(1), Some("r")),
        Box::new(exchange),
    );

    assert!(store.ensure_fresh_at(now).await.is_err());
    assert_eq!(store.credential().access_token.expose_secret(), "old-access");
    assert_eq!(
        store
            .credential()
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret()),
        Some("r")
    );
}

#[test]
fn test_empty_access_token_is_invalid() {
    let mut cred = credential(Utc::now() + chrono::Duration::hours(1), None);
    cred.access_token = SecretString::from(String::new());
    assert!(!cred.valid());
}

#[tokio::test]
async fn test_expired_by_one_second_refreshes_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let now = Utc::now();
    let mut store = CredentialStore::in_memory(
        credential(now - chrono::Duration::seconds(1), Some("refresh-0")),
        Box::new(CountingExchange::ok(calls.clone())),
    );

    let fresh = store.ensure_fresh_at(now).await.unwrap();
    assert!(fresh.expires_at > now);
    assert_eq!(fresh.access_token.expose_secret(), "access-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Second call sees a valid token and leaves the endpoint alone
    store.ensure_fresh_at(now).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_valid_credential_is_not_refreshed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let now = Utc::now();
    let mut store = CredentialStore::in_memory(
        credential(now + chrono::Duration::minutes(30), Some("r")),
        Box::new(CountingExchange::ok(calls.clone())),
    );

    let cred = store.ensure_fresh_at(now).await.unwrap();
    assert_eq!(cred.access_token.expose_secret(), "old-access");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_without_new_refresh_token_keeps_old_one() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut exchange = CountingExchange::ok(calls.clone());
    exchange.rotate_refresh = false;
    let seen = exchange.seen_refresh.clone();
    let now = Utc::now();
    let mut store = CredentialStore::in_memory(
        credential(now - chrono::Duration::seconds(5), Some("long-lived")),
        Box::new(exchange),
    );

    let cred = store.ensure_fresh_at(now).await.unwrap();
    assert_eq!(
        cred.refresh_token.as_ref().map(|t| t.expose_secret()),
        Some("long-lived")
    );
    assert_eq!(seen.lock().unwrap().as_slice(), ["long-lived".to_string()]);
}

#[tokio::test]
async fn test_refresh_failure_surfaces_exchange_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut exchange = CountingExchange::ok(calls.clone());
    exchange.fail_status = Some(400);
    let now = Utc::now();
    let mut store = CredentialStore::in_memory(
        credential(now - chrono::Duration::seconds(1), Some("r")),
        Box::new(exchange),
    );

    let err = store.ensure_fresh_at(now).await.unwrap_err();
    assert!(matches!(
        err,
        BotcastError::Credential(CredentialError::Exchange { status: 400, .. })
    ));
    assert_eq!(err.exit_code(), 2);
    // Old credential is still held
    assert_eq!(
        store.credential().access_token.expose_secret(),
        "old-access"
    );
}

#[tokio::test]
async fn test_expired_without_refresh_token_is_authorization_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let now = Utc::now();
    let mut store = CredentialStore::in_memory(
        credential(now - chrono::Duration::seconds(1), None),
        Box::new(CountingExchange::ok(calls.clone())),
    );

    let err = store.ensure_fresh_at(now).await.unwrap_err();
    assert!(matches!(
        err,
        BotcastError::Credential(CredentialError::Authorization(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("tokens.json");
    let expires = Utc.timestamp_opt(1_900_000_000, 0).single().unwrap();

    save_credential(&path, &credential(expires, Some("r1"))).unwrap();
    let loaded = load_credential(&path).unwrap();

    assert_eq!(loaded.access_token.expose_secret(), "old-access");
    assert_eq!(
        loaded.refresh_token.as_ref().map(|t| t.expose_secret()),
        Some("r1")
    );
    assert_eq!(loaded.expires_at, expires);
    assert_eq!(loaded.scope.as_deref(), Some("tweet.write"));
    assert!(!path.with_extension("json.tmp").exists());
}

#[cfg(unix)]
#[test]
fn test_saved_tokens_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.json");
    save_credential(&path, &credential(Utc::now(), None)).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_missing_tokens_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = load_credential(&dir.path().join("tokens.json")).unwrap_err();
    assert!(matches!(
        err,
        BotcastError::Credential(CredentialError::NotFound(_))
    ));
}

#[test]
fn test_malformed_tokens_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        load_credential(&path).unwrap_err(),
        BotcastError::Credential(CredentialError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_refreshed_credential_is_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.json");
    save_credential(
        &path,
        &credential(Utc::now() - chrono::Duration::seconds(1), Some("r0")),
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut store =
        CredentialStore::load(&path, Box::new(CountingExchange::ok(calls.clone()))).unwrap();
    store.ensure_fresh().await.unwrap();

    let on_disk = load_credential(&path).unwrap();
    assert_eq!(on_disk.access_token.expose_secret(), "access-1");
    assert_eq!(
        on_disk.refresh_token.as_ref().map(|t| t.expose_secret()),
        Some("refresh-1")
    );
}
