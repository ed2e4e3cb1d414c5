use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use exempt_core::config::{
    AppConfig, LoadOptions, AGENT_ID_ENV, CONNECTION_ID_ENV, PROJECT_ENDPOINT_ENV,
    RELAY_ENDPOINT_ENV,
};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

fn field(key_path: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Field {
    Field { key_path, env_keys, value: value.into() }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let project = &config.project;
    let agent = &config.agent;
    let credential = &config.credential;

    vec![
        field("project.endpoint", &[PROJECT_ENDPOINT_ENV], optional(project.endpoint.as_deref())),
        field(
            "project.relay_endpoint",
            &[RELAY_ENDPOINT_ENV],
            optional(project.relay_endpoint.as_deref()),
        ),
        field("project.api_version", &["EXEMPT_API_VERSION"], project.api_version.as_str()),
        field(
            "project.legacy_api_version",
            &["EXEMPT_LEGACY_API_VERSION"],
            project.legacy_api_version.as_str(),
        ),
        field("project.timeout_secs", &["EXEMPT_TIMEOUT_SECS"], project.timeout_secs.to_string()),
        field(
            "project.run_poll_interval_ms",
            &["EXEMPT_RUN_POLL_INTERVAL_MS"],
            project.run_poll_interval_ms.to_string(),
        ),
        field("agent.id", &[AGENT_ID_ENV], optional(agent.id.as_deref())),
        field("agent.connection_id", &[CONNECTION_ID_ENV], optional(agent.connection_id.as_deref())),
        field("agent.model", &["EXEMPT_MODEL"], agent.model.as_str()),
        field("agent.name", &["EXEMPT_AGENT_NAME"], agent.name.as_str()),
        field(
            "agent.openapi_spec_path",
            &["EXEMPT_OPENAPI_SPEC_PATH"],
            agent.openapi_spec_path.display().to_string(),
        ),
        field("agent.env_file", &["EXEMPT_ENV_FILE"], agent.env_file.display().to_string()),
        field("agent.tool_auth", &["EXEMPT_TOOL_AUTH"], format!("{:?}", agent.tool_auth)),
        field("credential.tenant_id", &["AZURE_TENANT_ID"], optional(credential.tenant_id.as_deref())),
        field("credential.client_id", &["AZURE_CLIENT_ID"], optional(credential.client_id.as_deref())),
        field(
            "credential.client_secret",
            &["AZURE_CLIENT_SECRET"],
            redact_secret(credential.client_secret.as_ref()),
        ),
        field(
            "credential.access_token",
            &["EXEMPT_ACCESS_TOKEN"],
            redact_token(credential.access_token.as_ref()),
        ),
        field("credential.scope", &["EXEMPT_CREDENTIAL_SCOPE"], credential.scope.as_str()),
        field(
            "server.bind_address",
            &["EXEMPT_SERVER_BIND_ADDRESS"],
            config.server.bind_address.as_str(),
        ),
        field("server.port", &["EXEMPT_SERVER_PORT"], config.server.port.to_string()),
        field(
            "logging.level",
            &["EXEMPT_LOGGING_LEVEL", "EXEMPT_LOG_LEVEL"],
            config.logging.level.as_str(),
        ),
        field(
            "logging.format",
            &["EXEMPT_LOGGING_FORMAT", "EXEMPT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

fn detect_config_path() -> Option<PathBuf> {
    ["exempt.toml", "config/exempt.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(_) => "<redacted>".to_string(),
        None => "<unset>".to_string(),
    }
}

/// Keeps a short prefix so operators can tell tokens apart.
fn redact_token(token: Option<&SecretString>) -> String {
    let Some(token) = token else {
        return "<unset>".to_string();
    };
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    if prefix.len() == trimmed.len() {
        return "<redacted>".to_string();
    }
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_a_short_prefix() {
        let token: SecretString = "eyJ0eXAiOiJKV1QiLCJhbGciOi".to_string().into();
        assert_eq!(redact_token(Some(&token)), "eyJ0***");

        let short: SecretString = "abc".to_string().into();
        assert_eq!(redact_token(Some(&short)), "<redacted>");
        assert_eq!(redact_token(None), "<unset>");
    }

    #[test]
    fn nested_key_paths_are_found_in_toml() {
        let doc: toml::Value = "[agent]\nmodel = \"gpt-4o\"\n".parse().expect("toml parses");
        assert!(contains_path(&doc, "agent.model"));
        assert!(!contains_path(&doc, "agent.name"));
    }
}
