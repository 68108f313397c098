//! MCP Server
//!
//! Core server implementation that handles all MCP protocol logic.
//! Transport-agnostic - works with stdio and HTTP.
//!
//! Tools are invoked through `tools/call` with `{"input_text": ...}`.
//! Resources take their input from the read URI:
//!
//! ```text
//! edu://generate_lesson_plan_resource?input_text=Cell%20Biology
//! ```

use edu_core::CapabilityError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use std::borrow::Cow;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::capability::{BoxedCapability, INPUT_ARGUMENT};
use crate::protocol::{JsonRpcError, McpRequest, McpResponse, JSONRPC_VERSION};
use crate::registry::CapabilityRegistry;
use crate::{PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};

/// URI scheme of the resources this server exposes
pub const RESOURCE_SCHEME: &str = "edu";

/// Everything but RFC 3986 unreserved characters is escaped in a query value
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Server configuration
#[derive(Debug, Clone, Default)]
pub struct McpServerConfig {
    /// Server name override
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
struct ClientInfo {
    name: String,
    version: Option<String>,
}

/// `edu://<name>`
pub fn resource_uri(name: &str) -> String {
    format!("{}://{}", RESOURCE_SCHEME, name)
}

/// `edu://<name>?input_text=<input>`, percent-encoded.
///
/// The query is a plain RFC 3986 query, not form data: a space is `%20`
/// and a literal `+` stays `+` when read back.
pub fn resource_uri_with_input(name: &str, input: &str) -> String {
    format!(
        "{}?{}={}",
        resource_uri(name),
        INPUT_ARGUMENT,
        utf8_percent_encode(input, QUERY_VALUE)
    )
}

/// Percent-decoded `input_text` from the query of `uri`, if present
fn query_input(uri: &Url) -> Option<Result<String, std::str::Utf8Error>> {
    uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == INPUT_ARGUMENT)
            .then(|| percent_decode_str(value).decode_utf8().map(Cow::into_owned))
    })
}

/// MCP Server
pub struct McpServer {
    config: McpServerConfig,
    registry: CapabilityRegistry,
    /// Client info from last initialize
    client_info: RwLock<Option<ClientInfo>>,
}

impl McpServer {
    pub fn new(config: McpServerConfig, registry: CapabilityRegistry) -> Self {
        Self {
            config,
            registry,
            client_info: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or(SERVER_NAME)
    }

    /// Name and version of the client from the last `initialize`, if any
    pub async fn client(&self) -> Option<(String, Option<String>)> {
        self.client_info
            .read()
            .await
            .as_ref()
            .map(|c| (c.name.clone(), c.version.clone()))
    }

    /// Handle an MCP request
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        debug!(method = %request.method, "Handling MCP request");

        if request.jsonrpc != JSONRPC_VERSION {
            return McpResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request).await,
            "initialized" | "notifications/initialized" | "ping" => {
                McpResponse::success(request.id, json!({}))
            }
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request).await,
            "resources/list" => self.handle_resources_list(request),
            "resources/templates/list" => self.handle_resource_templates_list(request),
            "resources/read" => self.handle_resources_read(request).await,
            method if method.starts_with("notifications/") => {
                McpResponse::success(request.id, json!({}))
            }
            _ => McpResponse::error(
                request.id,
                JsonRpcError::method_not_found(&request.method),
            ),
        }
    }

    async fn handle_initialize(&self, request: McpRequest) -> McpResponse {
        let client_info = request.params.as_ref().and_then(|p| p.get("clientInfo"));

        let client_name = client_info
            .and_then(|ci| ci.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown");

        let client_version = client_info
            .and_then(|ci| ci.get("version"))
            .and_then(|v| v.as_str());

        *self.client_info.write().await = Some(ClientInfo {
            name: client_name.to_string(),
            version: client_version.map(String::from),
        });

        info!(
            client = %client_name,
            version = %client_version.unwrap_or("?"),
            "Client connected"
        );

        McpResponse::success(request.id, json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": {
                "name": self.name(),
                "version": SERVER_VERSION
            }
        }))
    }

    fn handle_tools_list(&self, request: McpRequest) -> McpResponse {
        let tools: Vec<_> = self
            .registry
            .tools()
            .map(|t| json!({
                "name": t.name(),
                "description": t.description(),
                "inputSchema": t.input_schema()
            }))
            .collect();

        McpResponse::success(request.id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, request: McpRequest) -> McpResponse {
        let params = match &request.params {
            Some(p) => p,
            None => return McpResponse::error(
                request.id,
                JsonRpcError::invalid_params("Missing params"),
            ),
        };

        let tool_name = match params.get("name").and_then(|n| n.as_str()) {
            Some(n) => n,
            None => return McpResponse::error(
                request.id,
                JsonRpcError::invalid_params("Missing tool name"),
            ),
        };

        let tool = match self.registry.tool(tool_name) {
            Some(t) => t,
            None => {
                warn!(tool = %tool_name, "Unknown tool");
                return McpResponse::error(
                    request.id,
                    JsonRpcError::invalid_params(format!("Unknown tool: {}", tool_name)),
                );
            }
        };

        let input = match params
            .get("arguments")
            .and_then(|a| a.get(INPUT_ARGUMENT))
            .and_then(|v| v.as_str())
        {
            Some(input) => input,
            None => {
                let err = CapabilityError::invalid_input(format!(
                    "tool '{}' needs a string argument '{}'",
                    tool_name, INPUT_ARGUMENT
                ));
                return McpResponse::error(request.id, rpc_error(&err));
            }
        };

        info!(tool = %tool_name, "Calling tool");

        match tool.invoke(input).await {
            Ok(text) => McpResponse::success(request.id, json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false
            })),
            Err(e) => {
                error!(tool = %tool_name, error = %e, "Tool failed");
                McpResponse::success(request.id, json!({
                    "content": [{ "type": "text", "text": format!("Error: {}", e) }],
                    "isError": true,
                    "_meta": { "errorKind": error_kind(&e) }
                }))
            }
        }
    }

    fn handle_resources_list(&self, request: McpRequest) -> McpResponse {
        let resources: Vec<_> = self
            .registry
            .resources()
            .map(|r| json!({
                "uri": resource_uri(r.name()),
                "name": r.name(),
                "description": r.description(),
                "mimeType": "application/json"
            }))
            .collect();

        McpResponse::success(request.id, json!({ "resources": resources }))
    }

    fn handle_resource_templates_list(&self, request: McpRequest) -> McpResponse {
        let templates: Vec<_> = self
            .registry
            .resources()
            .map(|r| json!({
                "uriTemplate": format!("{}{{?{}}}", resource_uri(r.name()), INPUT_ARGUMENT),
                "name": r.name(),
                "description": r.description(),
                "mimeType": "application/json"
            }))
            .collect();

        McpResponse::success(request.id, json!({ "resourceTemplates": templates }))
    }

    async fn handle_resources_read(&self, request: McpRequest) -> McpResponse {
        let uri = request.param_str("uri").unwrap_or("").to_string();
        if uri.is_empty() {
            return McpResponse::error(
                request.id,
                JsonRpcError::invalid_params("Missing uri"),
            );
        }

        let (resource, input) = match self.resolve_resource(&uri, request.params.as_ref()) {
            Ok(found) => found,
            Err(err) => return McpResponse::error(request.id, err),
        };

        info!(resource = %resource.name(), "Reading resource");

        match resource.invoke(&input).await {
            Ok(text) => McpResponse::success(request.id, json!({
                "contents": [{
                    "uri": uri,
                    "mimeType": "application/json",
                    "text": text
                }]
            })),
            Err(e) => {
                error!(resource = %resource.name(), error = %e, "Resource read failed");
                McpResponse::error(request.id, rpc_error(&e))
            }
        }
    }

    /// Find the resource named by `uri` and the input it carries.
    ///
    /// The input comes from the `input_text` query parameter, falling back
    /// to `arguments.input_text` in the request params.
    fn resolve_resource(
        &self,
        uri: &str,
        params: Option<&Value>,
    ) -> Result<(&BoxedCapability, String), JsonRpcError> {
        let parsed = Url::parse(uri)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid uri '{}': {}", uri, e)))?;

        if parsed.scheme() != RESOURCE_SCHEME {
            return Err(JsonRpcError::resource_not_found(uri));
        }

        let resource = parsed
            .host_str()
            .and_then(|name| self.registry.resource(name))
            .ok_or_else(|| JsonRpcError::resource_not_found(uri))?;

        let input = match query_input(&parsed) {
            Some(Ok(input)) => input,
            Some(Err(e)) => {
                let err = CapabilityError::invalid_input(format!(
                    "'{}' is not valid UTF-8 once decoded: {}",
                    INPUT_ARGUMENT, e
                ));
                return Err(rpc_error(&err));
            }
            None => params
                .and_then(|p| p.get("arguments"))
                .and_then(|a| a.get(INPUT_ARGUMENT))
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| {
                    rpc_error(&CapabilityError::invalid_input(format!(
                        "resource '{}' needs '{}' (e.g. {})",
                        resource.name(),
                        INPUT_ARGUMENT,
                        resource_uri_with_input(resource.name(), "Photosynthesis")
                    )))
                })?,
        };

        Ok((resource, input))
    }
}

/// JSON-RPC error for a capability failure. Bad input is the caller's
/// fault (-32602); anything else is internal (-32603).
fn rpc_error(err: &CapabilityError) -> JsonRpcError {
    let rpc = match err {
        CapabilityError::InvalidInput(_) => JsonRpcError::invalid_params(err.to_string()),
        _ => JsonRpcError::internal_error(err.to_string()),
    };
    rpc.with_data(json!({ "errorKind": error_kind(err) }))
}

fn error_kind(err: &CapabilityError) -> &'static str {
    match err {
        CapabilityError::Backend(_) => "backend",
        CapabilityError::Serialization(_) => "serialization",
        CapabilityError::InvalidInput(_) => "invalid_input",
    }
}
