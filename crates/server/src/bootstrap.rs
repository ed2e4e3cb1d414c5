use std::sync::Arc;

use axum::Router;
use exempt_agent::{AgentRuntime, AgentsError, HttpAgentsClient};
use exempt_core::config::{AppConfig, ConfigError, RELAY_ENDPOINT_ENV};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{health, relay};

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Option<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agents client initialization failed: {0}")]
    AgentsClient(#[from] AgentsError),
}

/// A missing relay endpoint is not fatal: the relay answers 500 per request
/// and health reports degraded.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let agent_runtime = match config.project.relay_endpoint.as_deref() {
        Some(endpoint) => {
            let client = HttpAgentsClient::from_config(endpoint, &config.project, &config.credential)?;
            info!(
                event_name = "system.bootstrap.agents_client_ready",
                correlation_id = "bootstrap",
                endpoint = %client.endpoint(),
                "agents client initialized"
            );
            Some(AgentRuntime::new(Arc::new(client)))
        }
        None => {
            warn!(
                event_name = "system.bootstrap.relay_unconfigured",
                correlation_id = "bootstrap",
                setting = RELAY_ENDPOINT_ENV,
                "relay endpoint is not configured"
            );
            None
        }
    };

    Ok(Application { config, agent_runtime })
}

impl Application {
    pub fn router(&self) -> Router {
        relay::router(self.agent_runtime.clone())
            .merge(health::router(self.config.project.relay_endpoint.clone()))
            .layer(TraceLayer::new_for_http())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use exempt_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use tower::ServiceExt;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(overrides: ConfigOverrides) -> Result<Application, BootstrapError> {
        let config = AppConfig::load(LoadOptions {
            config_path: Some("missing-exempt-config.toml".into()),
            overrides,
            ..LoadOptions::default()
        })?;
        bootstrap_with_config(config)
    }

    #[tokio::test]
    async fn bootstrap_serves_relay_and_health_with_static_token() {
        let app = bootstrap(ConfigOverrides {
            relay_endpoint: Some("https://project.example.com/api".to_string()),
            access_token: Some("eyJ-test-token".to_string()),
            ..ConfigOverrides::default()
        })
        .expect("bootstrap succeeds");

        assert!(app.agent_runtime.is_some());
        let response = app
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_credential_when_relay_is_configured() {
        let result = bootstrap(ConfigOverrides {
            relay_endpoint: Some("https://project.example.com/api".to_string()),
            ..ConfigOverrides::default()
        });

        assert!(matches!(result, Err(BootstrapError::AgentsClient(_))));
    }
}
