use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use exempt_core::{
    Agent, AgentDefinition, AgentId, MessageContent, MessageId, MessageRole, Run, RunId, RunStatus,
    Thread, ThreadId, ThreadMessage,
};

use crate::client::{AgentsClient, AgentsError};

pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InMemoryStats {
    pub agents_created: usize,
    pub agents_updated: usize,
    pub threads_created: usize,
    pub runs: usize,
}

#[derive(Default)]
struct InMemoryState {
    agents: HashMap<String, (Agent, AgentDefinition)>,
    threads: HashMap<String, Vec<ThreadMessage>>,
    sequence: u64,
    stats: InMemoryStats,
}

impl InMemoryState {
    fn next(&mut self, prefix: &str) -> (String, i64) {
        self.sequence += 1;
        (format!("{prefix}_{}", self.sequence), self.sequence as i64)
    }
}

/// In-process platform: every run answers the latest user message through the
/// configured responder.
pub struct InMemoryAgentsClient {
    state: RwLock<InMemoryState>,
    responder: Responder,
}

impl Default for InMemoryAgentsClient {
    fn default() -> Self {
        Self::with_responder(|text| format!("received: {text}"))
    }
}

impl InMemoryAgentsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self { state: RwLock::new(InMemoryState::default()), responder: Arc::new(responder) }
    }

    pub async fn stats(&self) -> InMemoryStats {
        self.state.read().await.stats
    }

    pub async fn definition(&self, agent_id: &AgentId) -> Option<AgentDefinition> {
        self.state.read().await.agents.get(&agent_id.0).map(|(_, definition)| definition.clone())
    }

    pub async fn thread_messages(&self, thread_id: &ThreadId) -> Option<Vec<ThreadMessage>> {
        self.state.read().await.threads.get(&thread_id.0).cloned()
    }
}

fn not_found(what: &str, id: &str) -> AgentsError {
    AgentsError::Status { status: 404, body: format!("{what} {id} not found") }
}

fn agent_from(id: String, created_at: i64, definition: &AgentDefinition) -> Agent {
    Agent {
        id: AgentId(id),
        name: Some(definition.name.clone()),
        model: definition.model.clone(),
        instructions: Some(definition.instructions.clone()),
        created_at,
    }
}

#[async_trait]
impl AgentsClient for InMemoryAgentsClient {
    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, AgentsError> {
        let state = self.state.read().await;
        Ok(state.agents.get(&agent_id.0).map(|(agent, _)| agent.clone()))
    }

    async fn create_agent(&self, definition: &AgentDefinition) -> Result<Agent, AgentsError> {
        let mut state = self.state.write().await;
        let (id, created_at) = state.next("asst");
        let agent = agent_from(id.clone(), created_at, definition);
        state.agents.insert(id, (agent.clone(), definition.clone()));
        state.stats.agents_created += 1;
        Ok(agent)
    }

    async fn update_agent(
        &self,
        agent_id: &AgentId,
        definition: &AgentDefinition,
    ) -> Result<Agent, AgentsError> {
        let mut state = self.state.write().await;
        let created_at = match state.agents.get(&agent_id.0) {
            Some((agent, _)) => agent.created_at,
            None => return Err(not_found("agent", &agent_id.0)),
        };
        let agent = agent_from(agent_id.0.clone(), created_at, definition);
        state.agents.insert(agent_id.0.clone(), (agent.clone(), definition.clone()));
        state.stats.agents_updated += 1;
        Ok(agent)
    }

    async fn create_thread(&self) -> Result<Thread, AgentsError> {
        let mut state = self.state.write().await;
        let (id, created_at) = state.next("thread");
        state.threads.insert(id.clone(), Vec::new());
        state.stats.threads_created += 1;
        Ok(Thread { id: ThreadId(id), created_at })
    }

    async fn create_message(
        &self,
        thread_id: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, AgentsError> {
        let mut state = self.state.write().await;
        if !state.threads.contains_key(&thread_id.0) {
            return Err(not_found("thread", &thread_id.0));
        }

        let (id, created_at) = state.next("msg");
        let message = ThreadMessage {
            id: MessageId(id),
            thread_id: thread_id.clone(),
            role,
            created_at,
            content: vec![MessageContent::text(content)],
        };
        if let Some(messages) = state.threads.get_mut(&thread_id.0) {
            messages.push(message.clone());
        }
        Ok(message)
    }

    async fn create_and_process_run(
        &self,
        thread_id: &ThreadId,
        agent_id: &AgentId,
    ) -> Result<Run, AgentsError> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(&agent_id.0) {
            return Err(not_found("agent", &agent_id.0));
        }

        let prompt = state
            .threads
            .get(&thread_id.0)
            .ok_or_else(|| not_found("thread", &thread_id.0))?
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| {
                message.content.iter().filter_map(MessageContent::as_text).collect::<Vec<_>>().join(" ")
            })
            .unwrap_or_default();

        let reply = (self.responder)(&prompt);
        let (message_id, created_at) = state.next("msg");
        let (run_id, _) = state.next("run");
        if let Some(messages) = state.threads.get_mut(&thread_id.0) {
            messages.push(ThreadMessage {
                id: MessageId(message_id),
                thread_id: thread_id.clone(),
                role: MessageRole::Assistant,
                created_at,
                content: vec![MessageContent::text(reply)],
            });
        }
        state.stats.runs += 1;

        Ok(Run {
            id: RunId(run_id),
            thread_id: thread_id.clone(),
            agent_id: agent_id.clone(),
            status: RunStatus::Completed,
            last_error: None,
        })
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<ThreadMessage>, AgentsError> {
        let state = self.state.read().await;
        state.threads.get(&thread_id.0).cloned().ok_or_else(|| not_found("thread", &thread_id.0))
    }
}

#[cfg(test)]
mod tests {
    use exempt_core::{AgentDefinition, AgentId, MessageRole, RunStatus};

    use super::InMemoryAgentsClient;
    use crate::client::{AgentsClient, AgentsError};

    fn definition() -> AgentDefinition {
        AgentDefinition {
            model: "gpt-4o-mini".to_string(),
            name: "test agent".to_string(),
            instructions: "answer".to_string(),
            tools: Vec::new(),
        }
    }

    #[tokio::test]
    async fn run_appends_assistant_reply_from_responder() {
        let client = InMemoryAgentsClient::with_responder(|text| text.to_uppercase());
        let agent = client.create_agent(&definition()).await.expect("create agent");
        let thread = client.create_thread().await.expect("create thread");

        client.create_message(&thread.id, MessageRole::User, "list exemptions").await.expect("post");
        let run = client.create_and_process_run(&thread.id, &agent.id).await.expect("run");

        assert_eq!(run.status, RunStatus::Completed);
        let messages = client.list_messages(&thread.id).await.expect("list");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content[0].as_text(), Some("LIST EXEMPTIONS"));
    }

    #[tokio::test]
    async fn unknown_ids_behave_like_the_platform() {
        let client = InMemoryAgentsClient::new();

        assert!(client.get_agent(&AgentId("asst_missing".into())).await.expect("get").is_none());
        let error = client
            .update_agent(&AgentId("asst_missing".into()), &definition())
            .await
            .expect_err("update of unknown agent fails");
        assert!(matches!(error, AgentsError::Status { status: 404, .. }));
    }
}
