use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote agent resource as returned by the platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

/// Payload shared by agent create and update calls.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentDefinition {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    #[serde(rename = "openapi")]
    OpenApi { openapi: OpenApiFunction },
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        match self {
            Self::OpenApi { openapi } => &openapi.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenApiFunction {
    pub name: String,
    pub description: String,
    pub spec: Value,
    pub auth: OpenApiAuth,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenApiAuth {
    Anonymous,
    Connection { security_scheme: ConnectionSecurityScheme },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSecurityScheme {
    pub connection_id: String,
}

impl OpenApiAuth {
    pub fn connection(connection_id: impl Into<String>) -> Self {
        Self::Connection {
            security_scheme: ConnectionSecurityScheme { connection_id: connection_id.into() },
        }
    }
}
