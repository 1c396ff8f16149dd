//! Client credentials flow against a mock token endpoint.

use std::time::Duration;

use fhirlake_fetch::{AccessToken, AuthError, ClientSecretCredential, TokenProvider};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

fn credential(server: &MockServer) -> ClientSecretCredential {
    ClientSecretCredential::new(
        "tenant-1",
        "client-a",
        "secret&value",
        "https://fhir.example.com/.default",
    )
    .unwrap()
    .with_authority_host(&server.uri(), "tenant-1")
    .unwrap()
}

#[tokio::test]
async fn test_token_is_requested_and_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-a"))
        .and(body_string_contains("client_secret=secret%26value"))
        .and(body_string_contains("scope=https%3A%2F%2Ffhir.example.com%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "token-one"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cred = credential(&server);
    assert_eq!(cred.token().await.unwrap().secret(), "token-one");
    assert_eq!(cred.token().await.unwrap().secret(), "token-one");
}

#[tokio::test]
async fn test_expiring_token_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "short-lived",
            "expires_in": 60
        })))
        .expect(2)
        .mount(&server)
        .await;

    // 60s lifetime is inside the 5 minute refresh margin, so every call refreshes.
    let cred = credential(&server);
    cred.token().await.unwrap();
    cred.token().await.unwrap();
}

#[tokio::test]
async fn test_custom_refresh_margin_keeps_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "short-lived",
            "expires_in": 60
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cred = credential(&server).with_refresh_margin(Duration::from_secs(5));
    cred.token().await.unwrap();
    cred.token().await.unwrap();
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let err = credential(&server).token().await.unwrap_err();
    match err {
        AuthError::Rejected { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid_client"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_token_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "wrong-field"})))
        .mount(&server)
        .await;

    let err = credential(&server).token().await.unwrap_err();
    assert!(matches!(err, AuthError::Parse(_)));
}

#[tokio::test]
async fn test_huge_lifetime_means_no_expiry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "forever",
            "expires_in": u64::MAX
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cred = credential(&server);
    let token = cred.token().await.unwrap();
    assert_eq!(token.secret(), "forever");
    assert!(token.expires_at().is_none());
    // Cached: no expiry is always fresh.
    assert_eq!(cred.token().await.unwrap().secret(), "forever");
}

#[test]
fn test_unrepresentable_margin_is_stale() {
    let token = AccessToken::expiring_in("t", Duration::from_secs(3600));
    assert!(token.is_fresh(Duration::from_secs(60)));
    assert!(!token.is_fresh(Duration::MAX));
}
