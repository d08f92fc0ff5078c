use dbperms_integrations::{ErrorKind, Transport};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::envelope::{ToolInvocation, ToolResult};
use crate::registry;
use crate::shutdown::ShutdownGate;

/// MCP front end: advertises the registry and hands every call to the dispatcher.
#[derive(Clone)]
pub struct PermissionsServer {
    dispatcher: Arc<Dispatcher>,
    gate: Arc<ShutdownGate>,
}

impl PermissionsServer {
    pub fn new(transport: Arc<dyn Transport>, gate: Arc<ShutdownGate>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(transport)),
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<ShutdownGate> {
        &self.gate
    }

    pub async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        let Some(_in_flight) = self.gate.enter() else {
            tracing::info!(tool = %invocation.tool_name, "refusing invocation during shutdown");
            return ToolResult::failure(
                ErrorKind::ShuttingDown,
                "server is shutting down; no new invocations are accepted",
            );
        };
        self.dispatcher.dispatch(invocation).await
    }
}

fn to_call_result(result: &ToolResult) -> CallToolResult {
    let content = vec![Content::text(result.to_json_string())];
    if result.ok {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    }
}

impl ServerHandler for PermissionsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "dbperms-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Databricks Permissions MCP Server".to_string()),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Manage Databricks permissions: access control lists on clusters, jobs, warehouses, \
                 workspace objects and Unity Catalog securables, plus service principals, git \
                 credentials, share permissions and Unity Catalog credentials. Every tool answers \
                 with a JSON envelope {ok, value?, error?: {kind, message}}."
                    .to_string(),
            ),
        }
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let invocation =
            ToolInvocation::new(params.name.to_string(), params.arguments.unwrap_or_default());
        let result = self.invoke(invocation).await;
        Ok(to_call_result(&result))
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: registry::tools(),
            next_cursor: None,
        })
    }
}
