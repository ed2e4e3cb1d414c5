//! OpenAPI tool loading.
//!
//! The platform expects a self-contained document, so local `$ref` pointers
//! (`#/components/...`) are inlined before the document is attached to the agent.

use std::path::{Path, PathBuf};

use exempt_core::config::ToolAuthMode;
use exempt_core::{OpenApiAuth, OpenApiFunction, ToolDefinition};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenApiError {
    #[error("could not read OpenAPI document `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse OpenAPI document `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("unresolvable reference `{0}`")]
    UnresolvedReference(String),
    #[error("reference cycle through `{0}`")]
    ReferenceCycle(String),
    #[error("only local references are supported, found `{0}`")]
    ExternalReference(String),
    #[error("CONNECTION_ID is required for connection-authenticated tools")]
    MissingConnectionId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OpenApiTool {
    function: OpenApiFunction,
}

impl OpenApiTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        spec: Value,
        auth: OpenApiAuth,
    ) -> Result<Self, OpenApiError> {
        let spec = resolve_local_refs(&spec)?;
        Ok(Self {
            function: OpenApiFunction {
                name: name.into(),
                description: description.into(),
                spec,
                auth,
            },
        })
    }

    pub fn from_file(
        name: impl Into<String>,
        description: impl Into<String>,
        path: &Path,
        auth: OpenApiAuth,
    ) -> Result<Self, OpenApiError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| OpenApiError::Read { path: path.to_path_buf(), source })?;
        let spec: Value = serde_json::from_str(&raw)
            .map_err(|source| OpenApiError::Parse { path: path.to_path_buf(), source })?;
        Self::new(name, description, spec, auth)
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Operation ids declared by the document, sorted by path.
    pub fn operation_ids(&self) -> Vec<String> {
        let Some(paths) = self.function.spec.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };

        paths
            .values()
            .filter_map(Value::as_object)
            .flat_map(|item| item.values())
            .filter_map(|operation| operation.get("operationId").and_then(Value::as_str))
            .map(ToString::to_string)
            .collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::OpenApi { openapi: self.function.clone() }]
    }
}

/// Tool authentication for the configured mode.
pub fn tool_auth(
    mode: ToolAuthMode,
    connection_id: Option<&str>,
) -> Result<OpenApiAuth, OpenApiError> {
    match mode {
        ToolAuthMode::Anonymous => Ok(OpenApiAuth::Anonymous),
        ToolAuthMode::Connection => connection_id
            .filter(|value| !value.trim().is_empty())
            .map(OpenApiAuth::connection)
            .ok_or(OpenApiError::MissingConnectionId),
    }
}

pub fn resolve_local_refs(document: &Value) -> Result<Value, OpenApiError> {
    let mut stack = Vec::new();
    resolve_value(document, document, &mut stack)
}

fn resolve_value(
    root: &Value,
    value: &Value,
    stack: &mut Vec<String>,
) -> Result<Value, OpenApiError> {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                return resolve_reference(root, reference, stack);
            }

            let mut resolved = Map::with_capacity(map.len());
            for (key, child) in map {
                resolved.insert(key.clone(), resolve_value(root, child, stack)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(root, item, stack))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn resolve_reference(
    root: &Value,
    reference: &str,
    stack: &mut Vec<String>,
) -> Result<Value, OpenApiError> {
    let Some(pointer) = reference.strip_prefix('#') else {
        return Err(OpenApiError::ExternalReference(reference.to_string()));
    };

    if stack.iter().any(|seen| seen == reference) {
        return Err(OpenApiError::ReferenceCycle(reference.to_string()));
    }

    // serde_json pointers already understand the ~0 / ~1 escapes.
    let target = root
        .pointer(pointer)
        .ok_or_else(|| OpenApiError::UnresolvedReference(reference.to_string()))?;

    stack.push(reference.to_string());
    let resolved = resolve_value(root, target, stack);
    stack.pop();
    resolved
}

#[cfg(test)]
mod tests {
    use std::fs;

    use exempt_core::config::ToolAuthMode;
    use exempt_core::{OpenApiAuth, ToolDefinition};
    use serde_json::json;
    use tempfile::TempDir;

    use super::{resolve_local_refs, tool_auth, OpenApiError, OpenApiTool};

    fn exemptions_document() -> serde_json::Value {
        json!({
            "openapi": "3.0.1",
            "info": {"title": "govapi", "version": "v1"},
            "paths": {
                "/PolicyExemptions/{subscriptionId}": {
                    "get": {
                        "operationId": "GetPolicyExemptions",
                        "parameters": [{"$ref": "#/components/parameters/SubscriptionId"}],
                        "responses": {"200": {"description": "OK"}}
                    }
                },
                "/Time": {
                    "get": {"operationId": "GetCurrentTime", "responses": {"200": {"description": "OK"}}}
                }
            },
            "components": {
                "parameters": {
                    "SubscriptionId": {
                        "name": "subscriptionId",
                        "in": "path",
                        "required": true,
                        "schema": {"$ref": "#/components/schemas/Guid"}
                    }
                },
                "schemas": {"Guid": {"type": "string", "format": "uuid"}}
            }
        })
    }

    #[test]
    fn nested_local_references_are_inlined() {
        let resolved = resolve_local_refs(&exemptions_document()).expect("refs resolve");
        let parameter = &resolved["paths"]["/PolicyExemptions/{subscriptionId}"]["get"]
            ["parameters"][0];

        assert_eq!(parameter["name"], "subscriptionId");
        assert_eq!(parameter["schema"]["format"], "uuid");
        assert!(parameter.get("$ref").is_none());
    }

    #[test]
    fn reference_cycles_are_rejected() {
        let document = json!({
            "components": {"schemas": {
                "Node": {"type": "object", "properties": {"next": {"$ref": "#/components/schemas/Node"}}}
            }},
            "root": {"$ref": "#/components/schemas/Node"}
        });

        let error = resolve_local_refs(&document).expect_err("cycle should fail");
        assert!(matches!(error, OpenApiError::ReferenceCycle(ref r) if r == "#/components/schemas/Node"));
    }

    #[test]
    fn missing_and_external_references_fail() {
        let missing = json!({"a": {"$ref": "#/components/schemas/Nope"}});
        assert!(matches!(
            resolve_local_refs(&missing),
            Err(OpenApiError::UnresolvedReference(_))
        ));

        let external = json!({"a": {"$ref": "other.json#/Thing"}});
        assert!(matches!(
            resolve_local_refs(&external),
            Err(OpenApiError::ExternalReference(_))
        ));
    }

    #[test]
    fn tool_loads_from_file_with_operation_ids() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("exemptions_tool.json");
        fs::write(&path, exemptions_document().to_string()).expect("write spec");

        let tool = OpenApiTool::from_file(
            "exemptions",
            "Manage Azure Policy Exemptions",
            &path,
            OpenApiAuth::Anonymous,
        )
        .expect("tool should load");

        assert_eq!(tool.operation_ids(), vec!["GetPolicyExemptions", "GetCurrentTime"]);
        let definitions = tool.definitions();
        assert_eq!(definitions.len(), 1);
        assert!(matches!(&definitions[0], ToolDefinition::OpenApi { openapi } if openapi.name == "exemptions"));
    }

    #[test]
    fn unparseable_document_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("exemptions_tool.json");
        fs::write(&path, "openapi: 3.0.1").expect("write spec");

        let error = OpenApiTool::from_file("exemptions", "d", &path, OpenApiAuth::Anonymous)
            .expect_err("yaml is not accepted");
        assert!(matches!(error, OpenApiError::Parse { .. }));
    }

    #[test]
    fn connection_auth_requires_connection_id() {
        assert!(matches!(
            tool_auth(ToolAuthMode::Connection, None),
            Err(OpenApiError::MissingConnectionId)
        ));
        assert_eq!(
            tool_auth(ToolAuthMode::Connection, Some("/connections/govapi")).ok(),
            Some(OpenApiAuth::connection("/connections/govapi"))
        );
        assert_eq!(tool_auth(ToolAuthMode::Anonymous, None).ok(), Some(OpenApiAuth::Anonymous));
    }
}
