use async_trait::async_trait;
use thiserror::Error;

use exempt_core::{Agent, AgentDefinition, AgentId, MessageRole, Run, Thread, ThreadId, ThreadMessage};

use crate::credential::CredentialError;

#[derive(Debug, Error)]
pub enum AgentsError {
    #[error("agents platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agents platform returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode agents platform response: {0}")]
    Decode(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("agents endpoint is not a usable base URL: {0}")]
    InvalidEndpoint(String),
    #[error("`{0}` is not a valid platform identifier")]
    InvalidIdentifier(String),
}

impl AgentsError {
    /// The platform answers 404/405 for routes an api-version does not expose.
    pub fn is_route_unsupported(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 405, .. })
    }
}

/// Operations the exemptions agent needs from the hosted agents platform.
#[async_trait]
pub trait AgentsClient: Send + Sync {
    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, AgentsError>;

    async fn create_agent(&self, definition: &AgentDefinition) -> Result<Agent, AgentsError>;

    async fn update_agent(
        &self,
        agent_id: &AgentId,
        definition: &AgentDefinition,
    ) -> Result<Agent, AgentsError>;

    async fn create_thread(&self) -> Result<Thread, AgentsError>;

    async fn create_message(
        &self,
        thread_id: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, AgentsError>;

    /// Starts a run and waits until the platform reports a settled status.
    async fn create_and_process_run(
        &self,
        thread_id: &ThreadId,
        agent_id: &AgentId,
    ) -> Result<Run, AgentsError>;

    /// All messages of the thread, oldest first.
    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<ThreadMessage>, AgentsError>;
}
