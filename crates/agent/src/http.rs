//! REST client for the hosted agents platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use exempt_core::config::{CredentialConfig, ProjectConfig};
use exempt_core::{
    Agent, AgentDefinition, AgentId, MessageRole, Run, RunId, Thread, ThreadId, ThreadMessage,
};
use reqwest::{Client, Method, Response, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{AgentsClient, AgentsError};
use crate::credential::{credential_from_config, TokenCredential};

const MESSAGE_PAGE_LIMIT: &str = "100";

#[derive(Clone, Debug)]
pub struct HttpAgentsSettings {
    pub endpoint: String,
    pub api_version: String,
    pub legacy_api_version: String,
    pub scope: String,
    pub poll_interval: Duration,
}

impl HttpAgentsSettings {
    pub fn from_config(endpoint: &str, project: &ProjectConfig, scope: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: project.api_version.clone(),
            legacy_api_version: project.legacy_api_version.clone(),
            scope: scope.to_string(),
            poll_interval: Duration::from_millis(project.run_poll_interval_ms),
        }
    }
}

#[derive(Clone)]
pub struct HttpAgentsClient {
    client: Client,
    settings: HttpAgentsSettings,
    credential: Arc<dyn TokenCredential>,
}

#[derive(Deserialize)]
struct MessagePage {
    data: Vec<ThreadMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

impl HttpAgentsClient {
    pub fn new(
        client: Client,
        settings: HttpAgentsSettings,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self { client, settings, credential }
    }

    /// Builds a client for `endpoint` with the timeout and credential from config.
    pub fn from_config(
        endpoint: &str,
        project: &ProjectConfig,
        credential: &CredentialConfig,
    ) -> Result<Self, AgentsError> {
        let client =
            Client::builder().timeout(Duration::from_secs(project.timeout_secs)).build()?;
        let token_source = credential_from_config(credential, client.clone())?;
        let settings = HttpAgentsSettings::from_config(endpoint, project, &credential.scope);
        Ok(Self::new(client, settings, token_source))
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    /// Appends `segments` to the endpoint path, percent-encoding each one so an
    /// id can never add, remove or escape a path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, AgentsError> {
        let mut url = Url::parse(&self.settings.endpoint)
            .map_err(|error| AgentsError::InvalidEndpoint(error.to_string()))?;
        for segment in segments {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(AgentsError::InvalidIdentifier((*segment).to_string()));
            }
        }
        url.path_segments_mut()
            .map_err(|()| AgentsError::InvalidEndpoint(self.settings.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &[&str],
        api_version: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Response, AgentsError> {
        let url = self.url(path)?;
        let token = self.credential.token(&self.settings.scope).await?;

        debug!(event_name = "agents.request", method = %method, path = url.path(), api_version, "calling agents platform");
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token.token.expose_secret())
            .query(&[("api-version", api_version)]);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentsError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, AgentsError> {
        let response = self.send(method, path, &self.settings.api_version, query, body).await?;
        decode(response).await
    }

    async fn post_thread(&self, api_version: &str) -> Result<Thread, AgentsError> {
        let response = self.send(Method::POST, &["threads"], api_version, &[], Some(json!({}))).await?;
        decode(response).await
    }

    async fn get_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run, AgentsError> {
        self.send_json(
            Method::GET,
            &["threads", thread_id.as_str(), "runs", run_id.0.as_str()],
            &[],
            None,
        )
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AgentsError> {
    response.json::<T>().await.map_err(|error| AgentsError::Decode(error.to_string()))
}

fn definition_body(definition: &AgentDefinition) -> Result<Value, AgentsError> {
    serde_json::to_value(definition).map_err(|error| AgentsError::Decode(error.to_string()))
}

#[async_trait]
impl AgentsClient for HttpAgentsClient {
    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, AgentsError> {
        match self.send_json(Method::GET, &["assistants", agent_id.as_str()], &[], None).await {
            Ok(agent) => Ok(Some(agent)),
            Err(AgentsError::Status { status: 404, .. } | AgentsError::InvalidIdentifier(_)) => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn create_agent(&self, definition: &AgentDefinition) -> Result<Agent, AgentsError> {
        self.send_json(Method::POST, &["assistants"], &[], Some(definition_body(definition)?)).await
    }

    async fn update_agent(
        &self,
        agent_id: &AgentId,
        definition: &AgentDefinition,
    ) -> Result<Agent, AgentsError> {
        self.send_json(
            Method::POST,
            &["assistants", agent_id.as_str()],
            &[],
            Some(definition_body(definition)?),
        )
        .await
    }

    async fn create_thread(&self) -> Result<Thread, AgentsError> {
        match self.post_thread(&self.settings.api_version).await {
            Err(error)
                if error.is_route_unsupported()
                    && self.settings.legacy_api_version != self.settings.api_version =>
            {
                info!(
                    event_name = "agents.thread.fallback",
                    api_version = %self.settings.legacy_api_version,
                    error = %error,
                    "using alternative method to create thread"
                );
                self.post_thread(&self.settings.legacy_api_version).await
            }
            other => other,
        }
    }

    async fn create_message(
        &self,
        thread_id: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, AgentsError> {
        self.send_json(
            Method::POST,
            &["threads", thread_id.as_str(), "messages"],
            &[],
            Some(json!({ "role": role, "content": content })),
        )
        .await
    }

    async fn create_and_process_run(
        &self,
        thread_id: &ThreadId,
        agent_id: &AgentId,
    ) -> Result<Run, AgentsError> {
        let mut run: Run = self
            .send_json(
                Method::POST,
                &["threads", thread_id.as_str(), "runs"],
                &[],
                Some(json!({ "assistant_id": agent_id })),
            )
            .await?;

        while run.status.is_pending() {
            tokio::time::sleep(self.settings.poll_interval).await;
            run = self.get_run(thread_id, &run.id).await?;
            debug!(
                event_name = "agents.run.poll",
                thread_id = %thread_id,
                run_id = %run.id.0,
                status = run.status.as_str(),
                "polled run status"
            );
        }

        Ok(run)
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<ThreadMessage>, AgentsError> {
        let path = ["threads", thread_id.as_str(), "messages"];
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page: MessagePage = {
                let mut query = vec![("order", "asc"), ("limit", MESSAGE_PAGE_LIMIT)];
                if let Some(cursor) = after.as_deref() {
                    query.push(("after", cursor));
                }
                self.send_json(Method::GET, &path, &query, None).await?
            };
            let fetched = page.data.len();
            messages.extend(page.data);

            match page.last_id {
                Some(last_id) if page.has_more && fetched > 0 => after = Some(last_id),
                _ => break,
            }
        }

        Ok(messages)
    }
}
