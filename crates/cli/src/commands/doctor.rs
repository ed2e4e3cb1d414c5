use exempt_agent::blueprint::{TOOL_DESCRIPTION, TOOL_NAME};
use exempt_agent::{credential_from_config, tool_auth, OpenApiTool};
use exempt_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_project_endpoint(&config));
            checks.push(check_relay_endpoint(&config));
            checks.push(check_openapi_document(&config));
            checks.push(check_credential(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["project_endpoint", "relay_endpoint", "openapi_document", "credential"] {
                checks.push(DoctorCheck::skipped(name));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_project_endpoint(config: &AppConfig) -> DoctorCheck {
    match config.require_project_endpoint() {
        Ok(endpoint) => DoctorCheck::pass("project_endpoint", format!("provisioner targets `{endpoint}`")),
        Err(error) => DoctorCheck::fail("project_endpoint", error.to_string()),
    }
}

fn check_relay_endpoint(config: &AppConfig) -> DoctorCheck {
    match config.require_relay_endpoint() {
        Ok(endpoint) => DoctorCheck::pass("relay_endpoint", format!("relay targets `{endpoint}`")),
        Err(error) => DoctorCheck::fail("relay_endpoint", error.to_string()),
    }
}

fn check_openapi_document(config: &AppConfig) -> DoctorCheck {
    let auth = match tool_auth(config.agent.tool_auth, config.agent.connection_id.as_deref()) {
        Ok(auth) => auth,
        Err(error) => return DoctorCheck::fail("openapi_document", error.to_string()),
    };

    match OpenApiTool::from_file(TOOL_NAME, TOOL_DESCRIPTION, &config.agent.openapi_spec_path, auth)
    {
        Ok(tool) => DoctorCheck::pass(
            "openapi_document",
            format!(
                "`{}` declares operations: {}",
                config.agent.openapi_spec_path.display(),
                tool.operation_ids().join(", ")
            ),
        ),
        Err(error) => DoctorCheck::fail("openapi_document", error.to_string()),
    }
}

// Only checks that a credential source is configured; no token is requested.
fn check_credential(config: &AppConfig) -> DoctorCheck {
    let source = if config
        .credential
        .access_token
        .as_ref()
        .is_some_and(|token| !token.expose_secret().trim().is_empty())
    {
        "static access token"
    } else {
        "service principal"
    };

    match credential_from_config(&config.credential, reqwest::Client::new()) {
        Ok(_) => DoctorCheck::pass("credential", format!("using {source}")),
        Err(error) => DoctorCheck::fail("credential", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
