use std::collections::HashMap;

use ragchat::constants;
use ragchat::identity::{ClientSecretCredential, TokenProvider};
use ragchat::RagError;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

fn token_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": token
    }))
}

#[test_log::test(tokio::test)]
async fn test_client_credentials_grant_is_posted_as_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains(
            "scope=https%3A%2F%2Fmanagement.azure.com%2F.default",
        ))
        .respond_with(token_response("mgmt-token"))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new("tenant-1", "client-1", "s3cret", server.uri());
    let token = credential.token(constants::MANAGEMENT_SCOPE).await.unwrap();
    assert_eq!(token.expose(), "mgmt-token");
}

#[tokio::test]
async fn test_authority_host_trailing_slash_is_ignored() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("tok"))
        .expect(1)
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new("tenant-1", "client-1", "s3cret", format!("{}/", server.uri()));
    let token = credential.token("scope/.default").await.unwrap();
    assert_eq!(token.expose(), "tok");
}

#[tokio::test]
async fn test_authority_host_variable_overrides_login_host() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(token_response("sovereign-token"))
        .expect(1)
        .mount(&server)
        .await;

    let vars: HashMap<&str, String> = HashMap::from([
        ("AZURE_TENANT_ID", "tenant-1".to_string()),
        ("AZURE_CLIENT_ID", "client-1".to_string()),
        ("AZURE_CLIENT_SECRET", "s3cret".to_string()),
        ("AZURE_AUTHORITY_HOST", server.uri()),
    ]);
    let credential = ClientSecretCredential::from_vars(|name| vars.get(name).cloned()).unwrap();
    let token = credential.token(constants::MANAGEMENT_SCOPE).await.unwrap();
    assert_eq!(token.expose(), "sovereign-token");
}

#[test]
fn test_incomplete_service_principal_is_not_configured() {
    let vars: HashMap<&str, String> = HashMap::from([
        ("AZURE_TENANT_ID", "tenant-1".to_string()),
        ("AZURE_CLIENT_ID", "client-1".to_string()),
    ]);
    assert!(ClientSecretCredential::from_vars(|name| vars.get(name).cloned()).is_none());
}

#[tokio::test]
async fn test_rejected_grant_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string(r#"{"error":"invalid_client","error_description":"AADSTS7000215"}"#),
        )
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new("tenant-1", "client-1", "wrong", server.uri());
    let err = credential.token(constants::MANAGEMENT_SCOPE).await.unwrap_err();

    assert!(matches!(err, RagError::Auth(_)));
    let message = err.to_string();
    assert!(message.contains("401"));
    assert!(message.contains("invalid_client"));
}

#[tokio::test]
async fn test_token_response_without_access_token_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new("tenant-1", "client-1", "s3cret", server.uri());
    let err = credential.token(constants::MANAGEMENT_SCOPE).await.unwrap_err();
    assert!(matches!(err, RagError::Auth(_)));
    assert!(err.to_string().contains("unreadable token response"));
}
