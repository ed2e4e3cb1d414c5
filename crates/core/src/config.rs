use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROJECT_ENDPOINT_ENV: &str = "PROJECT_ENDPOINT";
pub const RELAY_ENDPOINT_ENV: &str = "AIProjectConnString";
pub const AGENT_ID_ENV: &str = "EXEMPT_AGENT_ID";
pub const CONNECTION_ID_ENV: &str = "CONNECTION_ID";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub project: ProjectConfig,
    pub agent: AgentConfig,
    pub credential: CredentialConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ProjectConfig {
    /// Management endpoint used by the provisioner.
    pub endpoint: Option<String>,
    /// Endpoint used by the relay; read from `AIProjectConnString`.
    pub relay_endpoint: Option<String>,
    pub api_version: String,
    pub legacy_api_version: String,
    pub timeout_secs: u64,
    pub run_poll_interval_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub id: Option<String>,
    pub connection_id: Option<String>,
    pub model: String,
    pub name: String,
    pub openapi_spec_path: PathBuf,
    pub env_file: PathBuf,
    pub tool_auth: ToolAuthMode,
}

#[derive(Clone, Debug)]
pub struct CredentialConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub scope: String,
    pub authority_host: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAuthMode {
    Connection,
    Anonymous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub project_endpoint: Option<String>,
    pub relay_endpoint: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("{0} is not set in the environment.")]
    MissingSetting(String),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                endpoint: None,
                relay_endpoint: None,
                api_version: "v1".to_string(),
                legacy_api_version: "2025-05-15-preview".to_string(),
                timeout_secs: 60,
                run_poll_interval_ms: 1000,
            },
            agent: AgentConfig {
                id: None,
                connection_id: None,
                model: "gpt-4o-mini".to_string(),
                name: "Azure Policy Exemptions Agent".to_string(),
                openapi_spec_path: PathBuf::from("agents/tools/exemptions_tool.json"),
                env_file: PathBuf::from(".env"),
                tool_auth: ToolAuthMode::Connection,
            },
            credential: CredentialConfig {
                tenant_id: None,
                client_id: None,
                client_secret: None,
                access_token: None,
                scope: "https://ai.azure.com/.default".to_string(),
                authority_host: "https://login.microsoftonline.com".to_string(),
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 7071 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ToolAuthMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "connection" => Ok(Self::Connection),
            "anonymous" => Ok(Self::Anonymous),
            other => Err(ConfigError::Validation(format!(
                "unsupported tool auth mode `{other}` (expected connection|anonymous)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("exempt.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The provisioner cannot run without a management endpoint.
    pub fn require_project_endpoint(&self) -> Result<&str, ConfigError> {
        self.project
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting(PROJECT_ENDPOINT_ENV.to_string()))
    }

    pub fn require_relay_endpoint(&self) -> Result<&str, ConfigError> {
        self.project
            .relay_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting(RELAY_ENDPOINT_ENV.to_string()))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(project) = patch.project {
            if let Some(endpoint) = project.endpoint {
                self.project.endpoint = Some(endpoint);
            }
            if let Some(relay_endpoint) = project.relay_endpoint {
                self.project.relay_endpoint = Some(relay_endpoint);
            }
            if let Some(api_version) = project.api_version {
                self.project.api_version = api_version;
            }
            if let Some(legacy_api_version) = project.legacy_api_version {
                self.project.legacy_api_version = legacy_api_version;
            }
            if let Some(timeout_secs) = project.timeout_secs {
                self.project.timeout_secs = timeout_secs;
            }
            if let Some(run_poll_interval_ms) = project.run_poll_interval_ms {
                self.project.run_poll_interval_ms = run_poll_interval_ms;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(id) = agent.id {
                self.agent.id = Some(id);
            }
            if let Some(connection_id) = agent.connection_id {
                self.agent.connection_id = Some(connection_id);
            }
            if let Some(model) = agent.model {
                self.agent.model = model;
            }
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(openapi_spec_path) = agent.openapi_spec_path {
                self.agent.openapi_spec_path = openapi_spec_path;
            }
            if let Some(env_file) = agent.env_file {
                self.agent.env_file = env_file;
            }
            if let Some(tool_auth) = agent.tool_auth {
                self.agent.tool_auth = tool_auth;
            }
        }

        if let Some(credential) = patch.credential {
            if let Some(tenant_id) = credential.tenant_id {
                self.credential.tenant_id = Some(tenant_id);
            }
            if let Some(client_id) = credential.client_id {
                self.credential.client_id = Some(client_id);
            }
            if let Some(client_secret_value) = credential.client_secret {
                self.credential.client_secret = Some(secret_value(client_secret_value));
            }
            if let Some(access_token_value) = credential.access_token {
                self.credential.access_token = Some(secret_value(access_token_value));
            }
            if let Some(scope) = credential.scope {
                self.credential.scope = scope;
            }
            if let Some(authority_host) = credential.authority_host {
                self.credential.authority_host = authority_host;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env(PROJECT_ENDPOINT_ENV) {
            self.project.endpoint = Some(value);
        }
        if let Some(value) = read_env(RELAY_ENDPOINT_ENV) {
            self.project.relay_endpoint = Some(value);
        }
        if let Some(value) = read_env("EXEMPT_API_VERSION") {
            self.project.api_version = value;
        }
        if let Some(value) = read_env("EXEMPT_LEGACY_API_VERSION") {
            self.project.legacy_api_version = value;
        }
        if let Some(value) = read_env("EXEMPT_TIMEOUT_SECS") {
            self.project.timeout_secs = parse_u64("EXEMPT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("EXEMPT_RUN_POLL_INTERVAL_MS") {
            self.project.run_poll_interval_ms = parse_u64("EXEMPT_RUN_POLL_INTERVAL_MS", &value)?;
        }

        if let Some(value) = read_env(AGENT_ID_ENV) {
            self.agent.id = Some(value);
        }
        if let Some(value) = read_env(CONNECTION_ID_ENV) {
            self.agent.connection_id = Some(value);
        }
        if let Some(value) = read_env("EXEMPT_MODEL") {
            self.agent.model = value;
        }
        if let Some(value) = read_env("EXEMPT_AGENT_NAME") {
            self.agent.name = value;
        }
        if let Some(value) = read_env("EXEMPT_OPENAPI_SPEC_PATH") {
            self.agent.openapi_spec_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("EXEMPT_ENV_FILE") {
            self.agent.env_file = PathBuf::from(value);
        }
        if let Some(value) = read_env("EXEMPT_TOOL_AUTH") {
            self.agent.tool_auth = value.parse()?;
        }

        if let Some(value) = read_env("AZURE_TENANT_ID") {
            self.credential.tenant_id = Some(value);
        }
        if let Some(value) = read_env("AZURE_CLIENT_ID") {
            self.credential.client_id = Some(value);
        }
        if let Some(value) = read_env("AZURE_CLIENT_SECRET") {
            self.credential.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("EXEMPT_ACCESS_TOKEN") {
            self.credential.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("EXEMPT_CREDENTIAL_SCOPE") {
            self.credential.scope = value;
        }

        if let Some(value) = read_env("EXEMPT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("EXEMPT_SERVER_PORT") {
            self.server.port = parse_u16("EXEMPT_SERVER_PORT", &value)?;
        }

        let log_level = read_env("EXEMPT_LOGGING_LEVEL").or_else(|| read_env("EXEMPT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("EXEMPT_LOGGING_FORMAT").or_else(|| read_env("EXEMPT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(project_endpoint) = overrides.project_endpoint {
            self.project.endpoint = Some(project_endpoint);
        }
        if let Some(relay_endpoint) = overrides.relay_endpoint {
            self.project.relay_endpoint = Some(relay_endpoint);
        }
        if let Some(access_token) = overrides.access_token {
            self.credential.access_token = Some(secret_value(access_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_project(&self.project)?;
        validate_agent(&self.agent)?;
        validate_credential(&self.credential)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("exempt.toml"), PathBuf::from("config/exempt.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_endpoint(key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    if let Some(url) = value {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{key} must start with http:// or https://"
            )));
        }
    }
    Ok(())
}

fn validate_project(project: &ProjectConfig) -> Result<(), ConfigError> {
    validate_endpoint("project.endpoint", project.endpoint.as_deref())?;
    validate_endpoint("project.relay_endpoint", project.relay_endpoint.as_deref())?;

    if project.api_version.trim().is_empty() || project.legacy_api_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "project.api_version and project.legacy_api_version must not be empty".to_string(),
        ));
    }

    if project.timeout_secs == 0 || project.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "project.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if project.run_poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "project.run_poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.model.trim().is_empty() {
        return Err(ConfigError::Validation("agent.model must not be empty".to_string()));
    }
    if agent.name.trim().is_empty() {
        return Err(ConfigError::Validation("agent.name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_credential(credential: &CredentialConfig) -> Result<(), ConfigError> {
    if credential.scope.trim().is_empty() {
        return Err(ConfigError::Validation("credential.scope must not be empty".to_string()));
    }

    validate_endpoint("credential.authority_host", Some(credential.authority_host.as_str()))?;

    // A client secret without its tenant and client id can never produce a token.
    let has_secret = credential
        .client_secret
        .as_ref()
        .map(|value| !value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if has_secret && (credential.tenant_id.is_none() || credential.client_id.is_none()) {
        return Err(ConfigError::Validation(
            "credential.client_secret requires credential.tenant_id and credential.client_id"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    project: Option<ProjectPatch>,
    agent: Option<AgentPatch>,
    credential: Option<CredentialPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectPatch {
    endpoint: Option<String>,
    relay_endpoint: Option<String>,
    api_version: Option<String>,
    legacy_api_version: Option<String>,
    timeout_secs: Option<u64>,
    run_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    id: Option<String>,
    connection_id: Option<String>,
    model: Option<String>,
    name: Option<String>,
    openapi_spec_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    tool_auth: Option<ToolAuthMode>,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialPatch {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    access_token: Option<String>,
    scope: Option<String>,
    authority_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
