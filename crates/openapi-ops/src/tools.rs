//! Operation contract → callable tool definition.

use crate::catalog::OperationContract;
use crate::semantics::annotations_for_method;
use rmcp::model::{JsonObject, Tool};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Argument name carrying the request body.
pub const BODY_ARGUMENT: &str = "body";

/// The externally exposed shape of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    #[must_use]
    pub fn from_contract(contract: &OperationContract) -> Self {
        Self {
            name: contract.operation_id.clone(),
            description: tool_description(contract),
            input_schema: build_input_schema(contract),
        }
    }

    /// Convert into an MCP `Tool`, annotated from the operation's HTTP method.
    #[must_use]
    pub fn into_mcp_tool(self, contract: &OperationContract) -> Tool {
        let schema_obj = self
            .input_schema
            .as_object()
            .cloned()
            .unwrap_or_else(JsonObject::new);
        let mut tool = Tool::new(self.name, self.description, Arc::new(schema_obj));
        tool.annotations = Some(annotations_for_method(&contract.method));
        tool
    }
}

/// Summary, then a distinct description, then tags, then declared success codes.
#[must_use]
pub fn tool_description(contract: &OperationContract) -> String {
    let mut sections: Vec<String> = Vec::new();
    let summary = contract.summary.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let description = contract
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    if let Some(summary) = summary {
        sections.push(summary.to_string());
    }
    if let Some(description) = description
        && Some(description) != summary
    {
        sections.push(description.to_string());
    }
    if sections.is_empty() {
        sections.push(format!(
            "Calls {} {}",
            contract.method.as_str(),
            contract.path
        ));
    }
    if !contract.tags.is_empty() {
        sections.push(format!("Tags: {}", contract.tags.join(", ")));
    }
    if !contract.success_codes.is_empty() {
        sections.push(format!("Returns: {}", contract.success_codes.join(", ")));
    }
    sections.join("\n\n")
}

/// Input schema: one property per parameter plus `body`, closed to unknown arguments.
#[must_use]
pub fn build_input_schema(contract: &OperationContract) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in &contract.parameters {
        properties.insert(param.name.clone(), param.schema.to_json());
        if param.required {
            required.push(param.name.clone());
        }
    }

    if let Some(body) = &contract.request_body {
        if properties.contains_key(BODY_ARGUMENT) {
            tracing::warn!(
                "Operation '{}' has a parameter named '{BODY_ARGUMENT}'; \
                 the request body argument replaces it",
                contract.operation_id
            );
        }
        let mut body_schema = body.schema.to_json();
        if body.content_types.len() > 1
            && let Some(obj) = body_schema.as_object_mut()
        {
            let also = format!(
                "Sent as {} (also supported: {}).",
                body.content_type,
                body.content_types[1..].join(", ")
            );
            let text = match obj.get("description").and_then(Value::as_str) {
                Some(existing) => format!("{existing} {also}"),
                None => also,
            };
            obj.insert("description".to_string(), Value::String(text));
        }
        properties.insert(BODY_ARGUMENT.to_string(), body_schema);
        if body.required {
            required.push(BODY_ARGUMENT.to_string());
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}
