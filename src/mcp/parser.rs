// Parameter extraction from MCP tool schemas and prompt declarations

use rmcp::model::{JsonObject, PromptArgument};
use serde_json::Value;

use crate::capabilities::ParameterSpec;

pub struct McpParser;

impl McpParser {
    /// Extract the top-level parameters of a tool's `inputSchema`.
    ///
    /// Only `properties` and `required` are consulted; nested structure is
    /// left to the raw schema kept in the descriptor extras. Property order
    /// follows the schema as the server sent it.
    pub fn parameters_from_schema(schema: &JsonObject) -> Vec<ParameterSpec> {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|req| req.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let Some(props) = schema.get("properties").and_then(|p| p.as_object()) else {
            return Vec::new();
        };

        props
            .iter()
            .map(|(name, prop_schema)| ParameterSpec {
                name: name.clone(),
                required: required.contains(&name.as_str()),
                description: prop_schema
                    .get("description")
                    .and_then(|d| d.as_str())
                    .map(|s| s.to_string()),
                schema_type: Self::schema_type(prop_schema),
            })
            .collect()
    }

    /// Convert a prompt's declared arguments. Prompt arguments are always
    /// strings in MCP.
    pub fn parameters_from_prompt(arguments: &[PromptArgument]) -> Vec<ParameterSpec> {
        arguments
            .iter()
            .map(|arg| ParameterSpec {
                name: arg.name.clone(),
                required: arg.required.unwrap_or(false),
                description: arg.description.clone(),
                schema_type: Some("string".to_string()),
            })
            .collect()
    }

    /// Render a parameter list as `a, b, [c]` with optional parameters
    /// bracketed.
    pub fn render_parameter_list(parameters: &[ParameterSpec]) -> String {
        parameters
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("[{}]", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn schema_type(schema: &Value) -> Option<String> {
        match schema.get("type")? {
            Value::String(s) => Some(s.clone()),
            // ["string", "null"] and friends
            Value::Array(types) => {
                let names: Vec<&str> = types.iter().filter_map(|t| t.as_str()).collect();
                if names.is_empty() {
                    None
                } else {
                    Some(names.join("|"))
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parameters_marked_required_or_optional() {
        let params = McpParser::parameters_from_schema(&schema(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Note name"},
                "content": {"type": "string"},
                "tags": {"type": ["array", "null"]}
            },
            "required": ["name", "content"]
        })));

        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "name");
        assert!(params[0].required);
        assert_eq!(params[0].description.as_deref(), Some("Note name"));
        assert!(params[1].required);
        assert!(!params[2].required);
        assert_eq!(params[2].schema_type.as_deref(), Some("array|null"));
    }

    #[test]
    fn test_schema_without_properties_has_no_parameters() {
        let params = McpParser::parameters_from_schema(&schema(json!({"type": "object"})));
        assert!(params.is_empty());
        assert_eq!(McpParser::render_parameter_list(&params), "");
    }

    #[test]
    fn test_render_parameter_list_brackets_optional() {
        let params = McpParser::parameters_from_schema(&schema(json!({
            "properties": {"name": {}, "folder": {}},
            "required": ["name"]
        })));
        assert_eq!(McpParser::render_parameter_list(&params), "name, [folder]");
    }

    #[test]
    fn test_prompt_arguments_default_to_optional() {
        let params = McpParser::parameters_from_prompt(&[
            PromptArgument {
                name: "topic".to_string(),
                title: None,
                description: None,
                required: Some(true),
            },
            PromptArgument {
                name: "tone".to_string(),
                title: Some("Tone".to_string()),
                description: Some("Writing tone".to_string()),
                required: None,
            },
        ]);

        assert!(params[0].required);
        assert!(!params[1].required);
        assert_eq!(McpParser::render_parameter_list(&params), "topic, [tone]");
    }
}
