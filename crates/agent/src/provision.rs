use std::path::{Path, PathBuf};
use std::sync::Arc;

use exempt_core::config::AGENT_ID_ENV;
use exempt_core::env_file::{append_env_entry, read_env_entry, EnvFileError};
use exempt_core::{Agent, AgentId};
use thiserror::Error;
use tracing::info;

use crate::blueprint::AgentBlueprint;
use crate::client::{AgentsClient, AgentsError};
use crate::openapi::OpenApiTool;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Agents(#[from] AgentsError),
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProvisionOutcome {
    Created(Agent),
    Updated(Agent),
}

impl ProvisionOutcome {
    pub fn agent(&self) -> &Agent {
        match self {
            Self::Created(agent) | Self::Updated(agent) => agent,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
        }
    }
}

/// Creates the exemptions agent once, then keeps updating the same resource.
pub struct Provisioner {
    client: Arc<dyn AgentsClient>,
    blueprint: AgentBlueprint,
    tool: OpenApiTool,
    env_file: PathBuf,
    configured_agent_id: Option<AgentId>,
}

impl Provisioner {
    pub fn new(
        client: Arc<dyn AgentsClient>,
        blueprint: AgentBlueprint,
        tool: OpenApiTool,
        env_file: impl Into<PathBuf>,
        configured_agent_id: Option<String>,
    ) -> Self {
        Self {
            client,
            blueprint,
            tool,
            env_file: env_file.into(),
            configured_agent_id: configured_agent_id.map(AgentId),
        }
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// Configured id first, then the last id recorded in the env file.
    pub fn stored_agent_id(&self) -> Result<Option<AgentId>, ProvisionError> {
        if let Some(agent_id) = &self.configured_agent_id {
            return Ok(Some(agent_id.clone()));
        }
        Ok(read_env_entry(&self.env_file, AGENT_ID_ENV)?.map(AgentId))
    }

    pub async fn provision(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let definition = self.blueprint.definition(&self.tool);

        match self.stored_agent_id()? {
            None => {
                let agent = self.client.create_agent(&definition).await?;
                append_env_entry(&self.env_file, AGENT_ID_ENV, agent.id.as_str())?;
                info!(
                    event_name = "provision.agent.created",
                    agent_id = %agent.id,
                    env_file = %self.env_file.display(),
                    "created agent and recorded its id"
                );
                Ok(ProvisionOutcome::Created(agent))
            }
            Some(agent_id) => {
                let agent = self.client.update_agent(&agent_id, &definition).await?;
                info!(event_name = "provision.agent.updated", agent_id = %agent.id, "updated agent");
                Ok(ProvisionOutcome::Updated(agent))
            }
        }
    }

    pub fn summary(&self, outcome: &ProvisionOutcome) -> String {
        format!("{} ready with ID: {}", self.blueprint.name, outcome.agent().id)
    }
}
