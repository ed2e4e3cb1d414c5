use std::sync::Arc;

use exempt_core::{
    assistant_reply_or_notice, AgentId, ApplicationError, MessageRole, RunStatus, ThreadId,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{AgentsClient, AgentsError};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Agent with ID {0} not found.")]
    AgentNotFound(AgentId),
    #[error(transparent)]
    Platform(#[from] AgentsError),
}

impl From<RelayError> for ApplicationError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::AgentNotFound(_) => Self::NotFound(error.to_string()),
            RelayError::Platform(error) => Self::Integration(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub thread_id: ThreadId,
    pub reply: String,
    pub run_status: RunStatus,
}

/// One synchronous turn against a hosted agent: resolve the agent, pick or
/// create the thread, post the message, run, and read back the newest reply.
#[derive(Clone)]
pub struct AgentRuntime {
    client: Arc<dyn AgentsClient>,
}

impl AgentRuntime {
    pub fn new(client: Arc<dyn AgentsClient>) -> Self {
        Self { client }
    }

    pub async fn converse(
        &self,
        agent_id: &AgentId,
        thread_id: Option<ThreadId>,
        message: &str,
    ) -> Result<Conversation, RelayError> {
        if self.client.get_agent(agent_id).await?.is_none() {
            return Err(RelayError::AgentNotFound(agent_id.clone()));
        }

        let thread_id = match thread_id {
            Some(thread_id) => thread_id,
            None => {
                let thread = self.client.create_thread().await?;
                debug!(event_name = "relay.thread.created", thread_id = %thread.id, "created thread");
                thread.id
            }
        };

        self.client.create_message(&thread_id, MessageRole::User, message).await?;
        let run = self.client.create_and_process_run(&thread_id, agent_id).await?;
        if run.status != RunStatus::Completed {
            warn!(
                event_name = "relay.run.incomplete",
                thread_id = %thread_id,
                run_id = %run.id.0,
                status = run.status.as_str(),
                last_error = run
                    .last_error
                    .as_ref()
                    .and_then(|error| error.message.as_deref())
                    .unwrap_or(""),
                "run finished without completing"
            );
        }

        let messages = self.client.list_messages(&thread_id).await?;
        Ok(Conversation {
            thread_id,
            reply: assistant_reply_or_notice(&messages),
            run_status: run.status,
        })
    }
}
