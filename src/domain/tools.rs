//! Studio tools exposed via Model Context Protocol
//!
//! Every tool is declared once in [`catalog`]: its JSON input schema, the
//! arguments it requires, and the plugin endpoint the call is forwarded to.

use std::sync::OnceLock;

use rust_mcp_sdk::schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool};
use serde_json::{json, Value};
use tracing::warn;

use crate::domain::utils::build_payload;
use crate::mcp::rpc::{
    app_error_to_json_rpc, json_rpc_error, json_rpc_error_with_data, json_rpc_result,
    tool_failure_to_json_rpc, INVALID_PARAMS, METHOD_NOT_FOUND,
};
use crate::mcp::McpState;

#[derive(Debug)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub endpoint: &'static str,
    pub required: &'static [&'static str],
    pub properties: Value,
}

impl ToolDef {
    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }

    pub fn to_tool(&self) -> Tool {
        serde_json::from_value(json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        }))
        .expect("static tool definition")
    }
}

pub fn catalog() -> &'static [ToolDef] {
    static CATALOG: OnceLock<Vec<ToolDef>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

pub fn find_tool(name: &str) -> Option<&'static ToolDef> {
    catalog().iter().find(|tool| tool.name == name)
}

pub fn build_tools_list() -> Vec<Tool> {
    catalog().iter().map(ToolDef::to_tool).collect()
}

fn vector3(description: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "number" },
        "minItems": 3,
        "maxItems": 3,
        "description": description
    })
}

fn duplicate_options() -> Value {
    json!({
        "type": "object",
        "properties": {
            "namePattern": {
                "type": "string",
                "description": "Name pattern with {n} placeholder (e.g., \"Button{n}\")"
            },
            "positionOffset": vector3("X, Y, Z offset per duplicate"),
            "rotationOffset": vector3("X, Y, Z rotation offset per duplicate"),
            "scaleOffset": vector3("X, Y, Z scale multiplier per duplicate"),
            "propertyVariations": {
                "type": "object",
                "description": "Property name to array of values"
            },
            "targetParents": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Different parent for each duplicate"
            }
        }
    })
}

fn object_spec(with_properties: bool) -> Value {
    let mut properties = json!({
        "className": { "type": "string", "description": "Roblox class name" },
        "parent": { "type": "string", "description": "Path to the parent instance" },
        "name": { "type": "string", "description": "Optional name for the object" }
    });
    if with_properties {
        properties["properties"] =
            json!({ "type": "object", "description": "Properties to set on creation" });
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": ["className", "parent"]
    })
}

fn instance_path(description: &str) -> Value {
    json!({ "instancePath": { "type": "string", "description": description } })
}

fn paths(description: &str) -> Value {
    json!({ "type": "array", "items": { "type": "string" }, "description": description })
}

fn build_catalog() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "get_file_tree",
            description: "Get complete hierarchy of the Roblox Studio project with script types, models, and folders",
            endpoint: "/api/file-tree",
            required: &[],
            properties: json!({
                "path": {
                    "type": "string",
                    "description": "Optional path to start from (defaults to workspace root)",
                    "default": ""
                }
            }),
        },
        ToolDef {
            name: "search_files",
            description: "Find files by name, type, or content patterns",
            endpoint: "/api/search-files",
            required: &["query"],
            properties: json!({
                "query": { "type": "string", "description": "Search query (name, type, or content pattern)" },
                "searchType": {
                    "type": "string",
                    "enum": ["name", "type", "content"],
                    "description": "Type of search to perform",
                    "default": "name"
                }
            }),
        },
        ToolDef {
            name: "get_place_info",
            description: "Get place ID, name, and game settings",
            endpoint: "/api/place-info",
            required: &[],
            properties: json!({}),
        },
        ToolDef {
            name: "get_services",
            description: "Get available Roblox services and their children",
            endpoint: "/api/services",
            required: &[],
            properties: json!({
                "serviceName": { "type": "string", "description": "Optional specific service name to query" }
            }),
        },
        ToolDef {
            name: "search_objects",
            description: "Find instances by name, class, or properties",
            endpoint: "/api/search-objects",
            required: &["query"],
            properties: json!({
                "query": { "type": "string", "description": "Search query" },
                "searchType": {
                    "type": "string",
                    "enum": ["name", "class", "property"],
                    "description": "Type of search to perform",
                    "default": "name"
                },
                "propertyName": { "type": "string", "description": "Property name when searchType is \"property\"" }
            }),
        },
        ToolDef {
            name: "get_instance_properties",
            description: "Get all properties of a specific instance",
            endpoint: "/api/instance-properties",
            required: &["instancePath"],
            properties: instance_path("Path to the instance"),
        },
        ToolDef {
            name: "get_instance_children",
            description: "Get child objects and their types",
            endpoint: "/api/instance-children",
            required: &["instancePath"],
            properties: instance_path("Path to the parent instance"),
        },
        ToolDef {
            name: "search_by_property",
            description: "Find objects with specific property values",
            endpoint: "/api/search-by-property",
            required: &["propertyName", "propertyValue"],
            properties: json!({
                "propertyName": { "type": "string", "description": "Name of the property to search" },
                "propertyValue": { "type": "string", "description": "Value to search for" }
            }),
        },
        ToolDef {
            name: "get_class_info",
            description: "Get available properties/methods for Roblox classes",
            endpoint: "/api/class-info",
            required: &["className"],
            properties: json!({
                "className": { "type": "string", "description": "Roblox class name" }
            }),
        },
        ToolDef {
            name: "get_project_structure",
            description: "Get complete game hierarchy. IMPORTANT: Use maxDepth parameter (default: 3) to explore deeper levels of the hierarchy. Set higher values like 5-10 for comprehensive exploration",
            endpoint: "/api/project-structure",
            required: &[],
            properties: json!({
                "path": {
                    "type": "string",
                    "description": "Optional path to start from (defaults to workspace root)",
                    "default": ""
                },
                "maxDepth": {
                    "type": "number",
                    "description": "Maximum depth to traverse (default: 3). RECOMMENDED: Use 5-10 for thorough exploration",
                    "minimum": 1,
                    "default": 3
                },
                "scriptsOnly": {
                    "type": "boolean",
                    "description": "Show only scripts and script containers",
                    "default": false
                }
            }),
        },
        ToolDef {
            name: "set_property",
            description: "Set a property on any Roblox instance",
            endpoint: "/api/set-property",
            required: &["instancePath", "propertyName", "propertyValue"],
            properties: json!({
                "instancePath": { "type": "string", "description": "Path to the instance (e.g., \"game.Workspace.Part\")" },
                "propertyName": { "type": "string", "description": "Name of the property to set" },
                "propertyValue": { "description": "Value to set the property to (any type)" }
            }),
        },
        ToolDef {
            name: "mass_set_property",
            description: "Set the same property on multiple instances at once",
            endpoint: "/api/mass-set-property",
            required: &["paths", "propertyName", "propertyValue"],
            properties: json!({
                "paths": paths("Array of instance paths to modify"),
                "propertyName": { "type": "string", "description": "Name of the property to set" },
                "propertyValue": { "description": "Value to set the property to (any type)" }
            }),
        },
        ToolDef {
            name: "mass_get_property",
            description: "Get the same property from multiple instances at once",
            endpoint: "/api/mass-get-property",
            required: &["paths", "propertyName"],
            properties: json!({
                "paths": paths("Array of instance paths to read from"),
                "propertyName": { "type": "string", "description": "Name of the property to get" }
            }),
        },
        ToolDef {
            name: "create_object",
            description: "Create a new Roblox object instance (basic, without properties)",
            endpoint: "/api/create-object",
            required: &["className", "parent"],
            properties: json!({
                "className": { "type": "string", "description": "Roblox class name (e.g., \"Part\", \"Script\", \"Folder\")" },
                "parent": { "type": "string", "description": "Path to the parent instance (e.g., \"game.Workspace\")" },
                "name": { "type": "string", "description": "Optional name for the new object" }
            }),
        },
        ToolDef {
            name: "create_object_with_properties",
            description: "Create a new Roblox object instance with initial properties",
            endpoint: "/api/create-object-with-properties",
            required: &["className", "parent"],
            properties: json!({
                "className": { "type": "string", "description": "Roblox class name (e.g., \"Part\", \"Script\", \"Folder\")" },
                "parent": { "type": "string", "description": "Path to the parent instance (e.g., \"game.Workspace\")" },
                "name": { "type": "string", "description": "Optional name for the new object" },
                "properties": { "type": "object", "description": "Properties to set on creation" }
            }),
        },
        ToolDef {
            name: "mass_create_objects",
            description: "Create multiple objects at once (basic, without properties)",
            endpoint: "/api/mass-create-objects",
            required: &["objects"],
            properties: json!({
                "objects": {
                    "type": "array",
                    "items": object_spec(false),
                    "description": "Array of objects to create"
                }
            }),
        },
        ToolDef {
            name: "mass_create_objects_with_properties",
            description: "Create multiple objects at once with initial properties",
            endpoint: "/api/mass-create-objects-with-properties",
            required: &["objects"],
            properties: json!({
                "objects": {
                    "type": "array",
                    "items": object_spec(true),
                    "description": "Array of objects to create with properties"
                }
            }),
        },
        ToolDef {
            name: "delete_object",
            description: "Delete a Roblox object instance",
            endpoint: "/api/delete-object",
            required: &["instancePath"],
            properties: instance_path("Path to the instance to delete"),
        },
        ToolDef {
            name: "smart_duplicate",
            description: "Smart duplication with automatic naming, positioning, and property variations",
            endpoint: "/api/smart-duplicate",
            required: &["instancePath", "count"],
            properties: json!({
                "instancePath": { "type": "string", "description": "Path to the instance to duplicate" },
                "count": { "type": "number", "minimum": 1, "description": "Number of duplicates to create" },
                "options": duplicate_options()
            }),
        },
        ToolDef {
            name: "mass_duplicate",
            description: "Perform multiple smart duplications at once",
            endpoint: "/api/mass-duplicate",
            required: &["duplications"],
            properties: json!({
                "duplications": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "instancePath": { "type": "string", "description": "Path to the instance to duplicate" },
                            "count": { "type": "number", "description": "Number of duplicates to create" },
                            "options": duplicate_options()
                        },
                        "required": ["instancePath", "count"]
                    },
                    "description": "Array of duplication operations"
                }
            }),
        },
        ToolDef {
            name: "set_calculated_property",
            description: "Set properties using mathematical formulas and variables",
            endpoint: "/api/set-calculated-property",
            required: &["paths", "propertyName", "formula"],
            properties: json!({
                "paths": paths("Array of instance paths to modify"),
                "propertyName": { "type": "string", "description": "Name of the property to set" },
                "formula": { "type": "string", "description": "Mathematical formula (e.g., \"Position.magnitude * 2\", \"index * 50\")" },
                "variables": { "type": "object", "description": "Additional variables for the formula" }
            }),
        },
        ToolDef {
            name: "set_relative_property",
            description: "Modify properties relative to their current values",
            endpoint: "/api/set-relative-property",
            required: &["paths", "propertyName", "operation", "value"],
            properties: json!({
                "paths": paths("Array of instance paths to modify"),
                "propertyName": { "type": "string", "description": "Name of the property to modify" },
                "operation": {
                    "type": "string",
                    "enum": ["add", "multiply", "divide", "subtract", "power"],
                    "description": "Mathematical operation to perform"
                },
                "value": { "description": "Value to use in the operation" },
                "component": {
                    "type": "string",
                    "enum": ["X", "Y", "Z"],
                    "description": "Specific component for Vector3/UDim2 properties"
                }
            }),
        },
        ToolDef {
            name: "get_script_source",
            description: "Get the source code of a script object (LocalScript, Script, or ModuleScript)",
            endpoint: "/api/get-script-source",
            required: &["instancePath"],
            properties: instance_path(
                "Path to the script instance (e.g., \"game.ServerScriptService.MainScript\")",
            ),
        },
        ToolDef {
            name: "set_script_source",
            description: "Safely set the source code of a script object without using loadstring (Studio only)",
            endpoint: "/api/set-script-source",
            required: &["instancePath", "source"],
            properties: json!({
                "instancePath": {
                    "type": "string",
                    "description": "Path to the script instance (e.g., \"game.ServerScriptService.MainScript\")"
                },
                "source": { "type": "string", "description": "New source code for the script" }
            }),
        },
    ]
}

pub async fn handle_tools_call(state: &McpState, id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    let Some(tool) = find_tool(&tool_call.name) else {
        return json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": format!("Unknown tool: {}", tool_call.name),
                "details": {
                    "name": tool_call.name,
                },
            })),
        );
    };

    let payload = match build_payload(
        tool.name,
        &tool.input_schema(),
        tool.required,
        tool_call.arguments,
    ) {
        Ok(payload) => payload,
        Err(err) => return app_error_to_json_rpc(id, err),
    };

    match state
        .sender
        .send_request(tool.endpoint, Value::Object(payload))
        .await
    {
        Ok(response) => json_rpc_result(
            id,
            serde_json::to_value(tool_result(response)).expect("tool result serialization"),
        ),
        Err(err) => {
            warn!(tool = tool.name, endpoint = tool.endpoint, error = %err, "tool execution failed");
            tool_failure_to_json_rpc(id, &err)
        }
    }
}

/// Wraps a plugin response as pretty-printed text, mirrored as structured
/// content when it is a JSON object.
fn tool_result(response: Value) -> CallToolResult {
    let text = serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string());

    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: response.as_object().cloned(),
    }
}
