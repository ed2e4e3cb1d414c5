//! Bearer token acquisition for the agents platform.
//!
//! Two sources are supported:
//! - a pre-issued token (`EXEMPT_ACCESS_TOKEN`), e.g. from `az account get-access-token`
//! - the OAuth2 client-credentials grant for a service principal
//!   (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`)
//!
//! Managed identity and developer-tool logins (Azure CLI, editor sign-in) are
//! not attempted. A relay hosted on a managed runtime needs either a service
//! principal secret or a token injected through `EXEMPT_ACCESS_TOKEN`; with
//! neither configured, `credential_from_config` returns
//! [`CredentialError::NotConfigured`] and the server refuses to start.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use exempt_core::config::CredentialConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};

const REFRESH_MARGIN_SECONDS: i64 = 300;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(
        "no credential configured: set EXEMPT_ACCESS_TOKEN or AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET"
    )]
    NotConfigured,
    #[error("token request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("failed to decode token response: {0}")]
    Decode(String),
}

#[derive(Clone, Debug)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(REFRESH_MARGIN_SECONDS) > now,
            None => true,
        }
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self, scope: &str) -> Result<AccessToken, CredentialError>;
}

pub struct StaticTokenCredential {
    token: SecretString,
}

impl StaticTokenCredential {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken { token: self.token.clone(), expires_at: None })
    }
}

pub struct ClientSecretCredential {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    cached: RwLock<Option<AccessToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl ClientSecretCredential {
    pub fn new(
        client: Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        let token_url =
            format!("{}/{tenant_id}/oauth2/v2.0/token", authority_host.trim_end_matches('/'));
        Self {
            client,
            token_url,
            client_id: client_id.into(),
            client_secret,
            cached: RwLock::new(None),
        }
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|error| {
                error!(error = %error, "token request failed");
                CredentialError::Request(error)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected { status: status.as_u16(), body });
        }

        let payload: TokenResponse =
            response.json().await.map_err(|error| CredentialError::Decode(error.to_string()))?;
        if payload.access_token.is_empty() {
            return Err(CredentialError::Decode(
                "token endpoint returned empty access token".to_string(),
            ));
        }

        Ok(AccessToken {
            token: payload.access_token.into(),
            expires_at: payload.expires_in.map(|seconds| Utc::now() + Duration::seconds(seconds)),
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let now = Utc::now();
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.clone());
            }
        }

        debug!(event_name = "credential.token.refresh", "requesting service principal token");
        let token = self.request_token(scope).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Picks the credential source: a static token wins over a service principal.
pub fn credential_from_config(
    config: &CredentialConfig,
    client: Client,
) -> Result<Arc<dyn TokenCredential>, CredentialError> {
    if let Some(token) = config.access_token.as_ref() {
        if !token.expose_secret().trim().is_empty() {
            return Ok(Arc::new(StaticTokenCredential::new(token.clone())));
        }
    }

    match (&config.tenant_id, &config.client_id, &config.client_secret) {
        (Some(tenant_id), Some(client_id), Some(client_secret)) => {
            Ok(Arc::new(ClientSecretCredential::new(
                client,
                &config.authority_host,
                tenant_id,
                client_id.clone(),
                client_secret.clone(),
            )))
        }
        _ => Err(CredentialError::NotConfigured),
    }
}
