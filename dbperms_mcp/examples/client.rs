//! Example MCP client that connects to the dbperms-mcp server in-process
//!
//! Needs DATABRICKS_HOST and DATABRICKS_TOKEN (a .env file works too).
//! Set DATABRICKS_CLUSTER_ID to also read a cluster's access control list.
//!
//! Run with: cargo run --example client

use dbperms_integrations::{DatabricksConfig, DatabricksRestClient};
use dbperms_mcp::{PermissionsServer, ShutdownGate};
use eyre::Result;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp_in_process_transport::in_process::TokioInProcess;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt::init();
    }

    let config = DatabricksConfig::from_env()?;
    let client = DatabricksRestClient::new(&config)?;
    let server = PermissionsServer::new(Arc::new(client), ShutdownGate::new());

    println!("Starting dbperms-mcp server in-process against {}...", config.host);
    let tokio_in_process = TokioInProcess::new(server).await?;
    let service = ().serve(tokio_in_process).await?;

    if let Some(info) = service.peer_info() {
        println!(
            "Server: {} v{}\n",
            info.server_info.name, info.server_info.version
        );
    }

    println!("=== Listing available tools ===");
    let tools_response = service.list_tools(Default::default()).await?;
    for tool in &tools_response.tools {
        let desc = tool
            .description
            .as_ref()
            .map(|d| d.as_ref())
            .unwrap_or("No description");
        println!("- {}: {}", tool.name, desc);
    }
    println!();

    println!("=== Permission levels for clusters ===");
    let result = service
        .call_tool(CallToolRequestParam {
            name: "get_permission_levels".into(),
            arguments: serde_json::json!({"object_type": "clusters"})
                .as_object()
                .cloned(),
        })
        .await?;
    print_content(&result);

    if let Ok(cluster_id) = std::env::var("DATABRICKS_CLUSTER_ID") {
        println!("=== Access control list of cluster {} ===", cluster_id);
        let result = service
            .call_tool(CallToolRequestParam {
                name: "get_cluster_permissions".into(),
                arguments: serde_json::json!({"cluster_id": cluster_id})
                    .as_object()
                    .cloned(),
            })
            .await?;
        print_content(&result);
    }

    service.cancel().await?;
    Ok(())
}

fn print_content(result: &rmcp::model::CallToolResult) {
    for content in &result.content {
        if let Some(text) = content.as_text() {
            println!("{}\n", text.text);
        }
    }
}
