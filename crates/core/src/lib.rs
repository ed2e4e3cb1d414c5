//! Shared building blocks for the policy exemptions agent: configuration,
//! error taxonomy, platform domain types and reply extraction.

pub mod config;
pub mod domain;
pub mod env_file;
pub mod errors;
pub mod reply;

pub use domain::agent::{
    Agent, AgentDefinition, AgentId, ConnectionSecurityScheme, OpenApiAuth, OpenApiFunction,
    ToolDefinition,
};
pub use domain::thread::{
    MessageContent, MessageId, MessageRole, Run, RunError, RunId, RunStatus, TextContent, Thread,
    ThreadId, ThreadMessage,
};
pub use errors::{ApplicationError, InterfaceError};
pub use reply::{assistant_reply_or_notice, extract_assistant_reply, NO_ASSISTANT_MESSAGE};
