use std::sync::Arc;

use exempt_agent::blueprint::{TOOL_DESCRIPTION, TOOL_NAME};
use exempt_agent::{
    tool_auth, AgentBlueprint, AgentsError, HttpAgentsClient, OpenApiError, OpenApiTool,
    ProvisionError, Provisioner,
};
use exempt_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

const COMMAND: &str = "provision";

struct Failure {
    error_class: &'static str,
    message: String,
    exit_code: u8,
}

impl Failure {
    fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }
}

impl From<AgentsError> for Failure {
    fn from(error: AgentsError) -> Self {
        match error {
            AgentsError::Credential(error) => Self::new("credential", error.to_string(), 5),
            other => Self::new("platform", other.to_string(), 6),
        }
    }
}

impl From<ProvisionError> for Failure {
    fn from(error: ProvisionError) -> Self {
        match error {
            ProvisionError::Agents(error) => error.into(),
            ProvisionError::EnvFile(error) => Self::new("env_file", error.to_string(), 6),
        }
    }
}

pub fn run(json_output: bool) -> CommandResult {
    match provision() {
        Ok(message) if json_output => CommandResult::success(COMMAND, message),
        Ok(message) => CommandResult::plain(0, message),
        Err(failure) if json_output => CommandResult::failure(
            COMMAND,
            failure.error_class,
            failure.message,
            failure.exit_code,
        ),
        Err(failure) => CommandResult::plain(failure.exit_code, failure.message),
    }
}

fn provision() -> Result<String, Failure> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        Failure::new("config_validation", format!("configuration issue: {error}"), 2)
    })?;
    let endpoint = config
        .require_project_endpoint()
        .map_err(|error| Failure::new("config_validation", error.to_string(), 2))?;

    let auth = tool_auth(config.agent.tool_auth, config.agent.connection_id.as_deref())
        .map_err(|error| Failure::new("config_validation", error.to_string(), 2))?;
    let tool = OpenApiTool::from_file(
        TOOL_NAME,
        TOOL_DESCRIPTION,
        &config.agent.openapi_spec_path,
        auth,
    )
    .map_err(|error: OpenApiError| Failure::new("tool_spec", error.to_string(), 4))?;

    let client = HttpAgentsClient::from_config(endpoint, &config.project, &config.credential)
        .map_err(|error| match error {
            AgentsError::Http(error) => Failure::new(
                "runtime_init",
                format!("failed to initialize http client: {error}"),
                3,
            ),
            other => other.into(),
        })?;

    let provisioner = Provisioner::new(
        Arc::new(client),
        AgentBlueprint::from_config(&config.agent),
        tool,
        config.agent.env_file.clone(),
        config.agent.id.clone(),
    );

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            Failure::new("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        },
    )?;

    let outcome = runtime.block_on(provisioner.provision())?;
    Ok(provisioner.summary(&outcome))
}
