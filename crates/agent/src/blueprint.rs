use exempt_core::config::AgentConfig;
use exempt_core::AgentDefinition;

use crate::openapi::OpenApiTool;

pub const MODEL_NAME: &str = "gpt-4o-mini";
pub const AGENT_NAME: &str = "Azure Policy Exemptions Agent";
pub const TOOL_NAME: &str = "exemptions";
pub const TOOL_DESCRIPTION: &str = "Manage Azure Policy Exemptions";

pub const INSTRUCTIONS: &str = r#"When I ask you to give me the list of policy exemptions associated with a subscription id - that I will provide - use the relevant action tool to get that list and send it back to me

The subscription id is a guid. If you are provided with anything else, send a message saying that you need the id, not a description of any other sort.

When I ask you to get the details of a specific policy exemption, use the relevant action tool to get that information and send it back to me. This action also requires a subscription id, which I will provide. It also requires the policy exemption name, which I will provide. The policy exemption name is a string, not a guid. Use the "name" field from the list of policy exemptions that you have retrieved, not the "displayName" or any other field.

I may ask you to get the details of one of the policy exemptions that you have listed. Use the same subscription id that you used to get the list of policy exemptions, and the name of the policy exemption that you can get from the list. For example, I could say "get the details of the first policy exemption in the list" or "get the details of the policy exemption named 'my-exemption'".

If I ask you for exemptions within a certain number of days until expiry, put that number of days into the "withExpiryDateWithinDays" field of the action tool. When I make this request, you should first get the current date and time in UTC, and then calculate the max expiry date by adding the number of days to the current date.

The expiry date is expressed as an ISO 8601 date string, like "2024-12-31T23:59:59Z".

You can get the correct current date and time in UTC by using the relevant action tool. It's name is "GetCurrentTime".

I may ask you to update a policy exemption. In this case, I will provide you with the subscription id, the name of the policy exemption, and new expiry date that I want to update. You should use the "UpdateExpiryDate" action tool to perform this action. I will provide you with the new expiry date in ISO 8601 format, like "2024-12-31T23:59:59Z", or I may ask you to simply add some number of days or months to the current expiry date. You should not change anything else of the policy exemption, only the expiry date. When you call the tool to update the expiry date, you must provide the subscription id, the name of the policy exemption, and the new expiry date in ISO 8601 format. The name of the expiry date parameter is "expiresOnIso8601". The expiry date should be provided to the tool as a query string.

These are the only functions that you perform. If you are asked to do anything else - like write a poem or tell a joke, or whatever, just say it's not in your job description."#;

/// Fixed shape of the exemptions agent; only model and name follow config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentBlueprint {
    pub model: String,
    pub name: String,
    pub instructions: String,
}

impl Default for AgentBlueprint {
    fn default() -> Self {
        Self {
            model: MODEL_NAME.to_string(),
            name: AGENT_NAME.to_string(),
            instructions: INSTRUCTIONS.to_string(),
        }
    }
}

impl AgentBlueprint {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self { model: config.model.clone(), name: config.name.clone(), ..Self::default() }
    }

    pub fn definition(&self, tool: &OpenApiTool) -> AgentDefinition {
        AgentDefinition {
            model: self.model.clone(),
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            tools: tool.definitions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use exempt_core::config::AppConfig;
    use exempt_core::OpenApiAuth;
    use serde_json::json;

    use super::{AgentBlueprint, AGENT_NAME, MODEL_NAME};
    use crate::openapi::OpenApiTool;

    #[test]
    fn default_config_matches_fixed_blueprint() {
        let blueprint = AgentBlueprint::from_config(&AppConfig::default().agent);
        assert_eq!(blueprint, AgentBlueprint::default());
        assert_eq!(blueprint.model, MODEL_NAME);
        assert_eq!(blueprint.name, AGENT_NAME);
    }

    #[test]
    fn definition_carries_tool_and_instructions() {
        let tool = OpenApiTool::new(
            "exemptions",
            "Manage Azure Policy Exemptions",
            json!({"openapi": "3.0.1", "paths": {}}),
            OpenApiAuth::Anonymous,
        )
        .expect("tool builds");

        let definition = AgentBlueprint::default().definition(&tool);

        assert_eq!(definition.tools.len(), 1);
        assert_eq!(definition.tools[0].name(), "exemptions");
        assert!(definition.instructions.contains("GetCurrentTime"));
        assert!(definition.instructions.contains("expiresOnIso8601"));
    }
}
