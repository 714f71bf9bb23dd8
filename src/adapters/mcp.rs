//! Model Context Protocol (JSON-RPC 2.0) front for the conversion service.
//!
//! Implements the subset a tool server needs: `initialize`, `ping`,
//! `tools/list` and `tools/call`, answered as plain JSON responses.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::core::{ConversionOutcome, ExcelService};
use crate::domain::ConversionRequest;

/// Protocol revisions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 2] = ["2025-06-18", "2025-03-26"];

/// Revision offered when the client asks for one we do not know
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

/// Name under which the conversion tool is registered
pub const TOOL_NAME: &str = "jsonToExcel";

pub const SERVER_NAME: &str = "JsonToExcel";

const TOOL_DESCRIPTION: &str = "Convert structured JSON data into an Excel file (.xlsx) and return a download link. \
Suited to turning API results or table-like JSON into a downloadable spreadsheet. \
Arguments: {\"headers\": {\"field\": \"Column title\"}, \"data\": [{\"field\": \"value\"}]}. \
Returns a resource_link pointing at the .xlsx file.";

// JSON-RPC error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// An incoming JSON-RPC message
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,

    /// Absent for notifications; an explicit `null` is still a request
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,

    pub method: String,

    #[serde(default)]
    pub params: Option<Value>,
}

/// Maps a present field (including `null`) to `Some`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,

    #[serde(default)]
    arguments: Value,
}

/// Dispatches JSON-RPC messages to the conversion service
#[derive(Clone)]
pub struct McpHandler {
    service: Arc<ExcelService>,
}

impl McpHandler {
    pub fn new(service: Arc<ExcelService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<ExcelService> {
        &self.service
    }

    /// Handle a raw request body.
    ///
    /// Returns `None` when the message was a notification.
    pub async fn handle_body(&self, body: &[u8]) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Some(JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )),
        }
    }

    /// Handle one decoded request
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            tracing::debug!("MCP notification: {}", request.method);
            return None;
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => {
                JsonRpcResponse::success(id, initialize_result(request.params.as_ref()))
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": [tool_definition()] })),
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };

        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    format!("Invalid tools/call params: {}", e),
                )
            }
        };

        if params.name != TOOL_NAME {
            return JsonRpcResponse::failure(
                id,
                INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            );
        }

        let request = match ConversionRequest::from_value(params.arguments) {
            Ok(r) => r,
            Err(e) => {
                return JsonRpcResponse::success(
                    id,
                    text_result(&format!("invalid arguments: {}", e), true),
                )
            }
        };

        match self.service.convert(&request).await {
            Ok(ConversionOutcome::Rejected(reason)) => {
                JsonRpcResponse::success(id, text_result(&reason.to_string(), true))
            }
            Ok(ConversionOutcome::Created(link)) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{
                        "type": "resource_link",
                        "uri": link.uri,
                        "name": link.name,
                        "title": link.title,
                        "mimeType": link.mime_type,
                    }]
                }),
            ),
            Err(e) => {
                tracing::error!("Conversion failed: {}", e);
                JsonRpcResponse::failure(id, INTERNAL_ERROR, e.to_string())
            }
        }
    }
}

/// Echo the client's revision when supported, otherwise offer the latest
fn negotiate_version(params: Option<&Value>) -> &'static str {
    let requested = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str);

    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| Some(*v) == requested)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

fn initialize_result(params: Option<&Value>) -> Value {
    json!({
        "protocolVersion": negotiate_version(params),
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Tool metadata advertised by `tools/list`
pub fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": TOOL_DESCRIPTION,
        "inputSchema": {
            "type": "object",
            "properties": {
                "headers": {
                    "type": "object",
                    "description": "Maps a JSON field name to the column title shown in the sheet",
                    "additionalProperties": { "type": "string" }
                },
                "data": {
                    "type": "array",
                    "description": "Records to convert, one row each",
                    "items": { "type": "object" }
                }
            },
            "required": ["headers", "data"]
        }
    })
}

fn text_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}
