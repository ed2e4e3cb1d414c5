use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use exempt_agent::credential::ClientSecretCredential;
use exempt_agent::{CredentialError, TokenCredential};
use secrecy::ExposeSecret;
use serde_json::json;

const SCOPE: &str = "https://ai.azure.com/.default";

#[derive(Default)]
struct FakeAuthority {
    expires_in: i64,
    reject: bool,
    issued: usize,
    requests: Vec<(String, HashMap<String, String>)>,
}

type Shared = Arc<Mutex<FakeAuthority>>;

async fn issue_token(
    State(state): State<Shared>,
    Path(tenant_id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Ok(mut authority) = state.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    authority.requests.push((tenant_id, form));
    if authority.reject {
        return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
    }
    authority.issued += 1;
    Json(json!({
        "token_type": "Bearer",
        "access_token": format!("token-{}", authority.issued),
        "expires_in": authority.expires_in
    }))
    .into_response()
}

async fn spawn_authority(authority: FakeAuthority) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(authority));
    let app = Router::new()
        .route("/{tenant_id}/oauth2/v2.0/token", post(issue_token))
        .with_state(state.clone());

    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake authority");
    let address = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{address}/"), state)
}

fn credential_for(authority_host: &str) -> ClientSecretCredential {
    ClientSecretCredential::new(
        reqwest::Client::new(),
        authority_host,
        "tenant-1",
        "client-1",
        "client-secret".to_string().into(),
    )
}

fn request_count(state: &Shared) -> usize {
    state.lock().map(|authority| authority.requests.len()).unwrap_or_default()
}

#[tokio::test]
async fn client_credentials_grant_posts_the_expected_form() {
    let (authority_host, state) =
        spawn_authority(FakeAuthority { expires_in: 3600, ..FakeAuthority::default() }).await;
    let credential = credential_for(&authority_host);

    let token = credential.token(SCOPE).await.expect("token issued");

    assert_eq!(token.token.expose_secret(), "token-1");
    assert!(token.expires_at.is_some());

    let requests = state.lock().map(|authority| authority.requests.clone()).unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let (tenant_id, form) = &requests[0];
    assert_eq!(tenant_id, "tenant-1");
    assert_eq!(form.get("grant_type").map(String::as_str), Some("client_credentials"));
    assert_eq!(form.get("client_id").map(String::as_str), Some("client-1"));
    assert_eq!(form.get("client_secret").map(String::as_str), Some("client-secret"));
    assert_eq!(form.get("scope").map(String::as_str), Some(SCOPE));
}

#[tokio::test]
async fn fresh_token_is_served_from_cache() {
    let (authority_host, state) =
        spawn_authority(FakeAuthority { expires_in: 3600, ..FakeAuthority::default() }).await;
    let credential = credential_for(&authority_host);

    let first = credential.token(SCOPE).await.expect("first token");
    let second = credential.token(SCOPE).await.expect("cached token");

    assert_eq!(first.token.expose_secret(), second.token.expose_secret());
    assert_eq!(request_count(&state), 1);
}

#[tokio::test]
async fn token_inside_refresh_margin_is_replaced() {
    // Five minutes before expiry the cached token no longer counts as fresh.
    let (authority_host, state) =
        spawn_authority(FakeAuthority { expires_in: 120, ..FakeAuthority::default() }).await;
    let credential = credential_for(&authority_host);

    let first = credential.token(SCOPE).await.expect("first token");
    let second = credential.token(SCOPE).await.expect("refreshed token");

    assert_eq!(first.token.expose_secret(), "token-1");
    assert_eq!(second.token.expose_secret(), "token-2");
    assert_eq!(request_count(&state), 2);
}

#[tokio::test]
async fn rejected_grant_reports_status_and_body() {
    let (authority_host, _state) =
        spawn_authority(FakeAuthority { reject: true, ..FakeAuthority::default() }).await;
    let credential = credential_for(&authority_host);

    let error = credential.token(SCOPE).await.expect_err("grant rejected");

    assert!(matches!(
        error,
        CredentialError::Rejected { status: 401, ref body } if body == "invalid_client"
    ));
}
