//! Agent Runtime - hosted agent provisioning and conversation relay
//!
//! This crate talks to the hosted agents platform on behalf of the
//! policy exemptions service:
//! - Builds the exemptions agent definition from a fixed blueprint and an
//!   OpenAPI tool document (`blueprint`, `openapi`)
//! - Creates the agent once and updates it on later runs (`provision`)
//! - Runs one synchronous conversation turn per relay request (`runtime`)
//!
//! # Key Types
//!
//! - `AgentsClient` - Pluggable platform trait (REST in `http`, in-process in `memory`)
//! - `TokenCredential` - Bearer token source for the REST client
//! - `AgentRuntime` - Thread, message, run and reply orchestration
//!
//! # Safety Principle
//!
//! The relay never interprets the conversation. Exemption lookups and updates
//! happen inside the hosted agent through its OpenAPI tool; this crate only
//! forwards text and returns the newest assistant reply.

pub mod blueprint;
pub mod client;
pub mod credential;
pub mod http;
pub mod memory;
pub mod openapi;
pub mod provision;
pub mod runtime;

pub use blueprint::AgentBlueprint;
pub use client::{AgentsClient, AgentsError};
pub use credential::{credential_from_config, CredentialError, TokenCredential};
pub use http::{HttpAgentsClient, HttpAgentsSettings};
pub use memory::InMemoryAgentsClient;
pub use openapi::{tool_auth, OpenApiError, OpenApiTool};
pub use provision::{ProvisionError, ProvisionOutcome, Provisioner};
pub use runtime::{AgentRuntime, Conversation, RelayError};
