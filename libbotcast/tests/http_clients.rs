//! HTTP collaborators against a local mock server

use std::time::Duration;

use chrono::Utc;
use libbotcast::credentials::{
    Credential, CredentialStore, HttpTokenExchange, TokenExchange,
};
use libbotcast::error::{BotcastError, CredentialError, FailureKind, GenerationError, PlatformError};
use libbotcast::generation::{Generator, HttpGenerator};
use libbotcast::platforms::x::XPlatform;
use libbotcast::platforms::Platform;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn exchange(server: &MockServer) -> HttpTokenExchange {
    HttpTokenExchange::new(
        format!("{}/2/oauth2/token", server.uri()),
        "client-123",
        "http://127.0.0.1:8080/callback",
        TIMEOUT,
    )
    .unwrap()
}

#[tokio::test]
async fn test_refresh_posts_form_and_parses_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r-old"))
        .and(body_string_contains("client_id=client-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "bearer",
            "expires_in": 7200,
            "access_token": "a-new",
            "refresh_token": "r-new",
            "scope": "tweet.write offline.access"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = exchange(&server).refresh("r-old").await.unwrap();
    assert_eq!(response.access_token, "a-new");
    assert_eq!(response.refresh_token.as_deref(), Some("r-new"));
    assert_eq!(response.expires_in, Some(7200));
}

#[tokio::test]
async fn test_code_exchange_sends_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("code_verifier=the-verifier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "first",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = exchange(&server)
        .exchange_code("the-code", "the-verifier")
        .await
        .unwrap();
    assert_eq!(response.access_token, "first");
    assert!(response.refresh_token.is_none());
}

#[tokio::test]
async fn test_rejected_refresh_is_exchange_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"error":"invalid_request","error_description":"Value passed for the token was invalid."}"#,
        ))
        .mount(&server)
        .await;

    let err = exchange(&server).refresh("stale").await.unwrap_err();
    match err {
        BotcastError::Credential(CredentialError::Exchange { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_request"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_store_refreshes_expired_token_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let now = Utc::now();
    let expired = Credential {
        access_token: SecretString::from("stale".to_string()),
        refresh_token: Some(SecretString::from("keep".to_string())),
        expires_at: now - chrono::Duration::seconds(1),
        token_type: None,
        scope: None,
    };
    let mut store = CredentialStore::in_memory(expired, Box::new(exchange(&server)));

    let fresh = store.ensure_fresh().await.unwrap();
    assert!(fresh.expires_at > now);
    assert_eq!(fresh.access_token.expose_secret(), "fresh");
    assert_eq!(
        fresh.refresh_token.as_ref().map(|t| t.expose_secret()),
        Some("keep")
    );

    store.ensure_fresh().await.unwrap();
    // `expect(1)` is verified when the server drops
}

fn generator(server: &MockServer, key: Option<&str>) -> HttpGenerator {
    HttpGenerator::new(
        format!("{}/v1/chat/completions", server.uri()),
        "test-model",
        Some("You write short posts.".to_string()),
        key.map(|k| SecretString::from(k.to_string())),
        TIMEOUT,
    )
    .unwrap()
}

#[tokio::test]
async fn test_generator_reads_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "system", "content": "You write short posts."},
                {"role": "user", "content": "Write a post"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Ship it today."}, "finish_reason": "stop"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = generator(&server, Some("sk-test"))
        .generate("Write a post")
        .await
        .unwrap();
    assert_eq!(text, "Ship it today.");
}

#[tokio::test]
async fn test_generator_blank_text_is_empty_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "   "}}]
        })))
        .mount(&server)
        .await;

    let err = generator(&server, None).generate("x").await.unwrap_err();
    assert!(matches!(
        err,
        BotcastError::Generation(GenerationError::Empty)
    ));
}

#[tokio::test]
async fn test_generator_no_choices_is_empty_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = generator(&server, None).generate("x").await.unwrap_err();
    assert!(matches!(
        err,
        BotcastError::Generation(GenerationError::Empty)
    ));
}

#[tokio::test]
async fn test_generator_server_error_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = generator(&server, None).generate("x").await.unwrap_err();
    assert!(matches!(
        err,
        BotcastError::Generation(GenerationError::Status { status: 503, .. })
    ));
}

fn x(server: &MockServer) -> XPlatform {
    XPlatform::new(server.uri(), TIMEOUT).unwrap()
}

#[tokio::test]
async fn test_x_submit_returns_created_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tweets"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_partial_json(json!({"text": "hello"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": "1445880548472328192", "text": "hello"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = x(&server).submit("access-1", "hello", None).await.unwrap();
    assert_eq!(id, "1445880548472328192");
}

#[tokio::test]
async fn test_x_reply_sets_parent_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tweets"))
        .and(body_partial_json(json!({
            "text": "part two",
            "reply": {"in_reply_to_tweet_id": "111"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": "222", "text": "part two"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = x(&server)
        .submit("t", "part two", Some("111"))
        .await
        .unwrap();
    assert_eq!(id, "222");
}

#[tokio::test]
async fn test_x_classifies_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": "slow"})))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "title": "Too Many Requests", "status": 429
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": "again"})))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "detail": "You are not allowed to create a Tweet with duplicate content.",
            "status": 403
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": "auth"})))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let platform = x(&server);

    let rate = platform.submit("t", "slow", None).await.unwrap_err();
    assert_eq!(rate.kind(), FailureKind::RateLimited);

    let duplicate = platform.submit("t", "again", None).await.unwrap_err();
    assert_eq!(duplicate.kind(), FailureKind::ContentPolicy);

    let auth = platform.submit("t", "auth", None).await.unwrap_err();
    assert!(matches!(
        auth,
        PlatformError::Authentication { status: 401, .. }
    ));
}

#[tokio::test]
async fn test_x_unexpected_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let err = x(&server).submit("t", "hi", None).await.unwrap_err();
    assert!(matches!(err, PlatformError::Malformed(_)));
}
