use clap::{Parser, Subcommand};
use dbperms_integrations::{ApiRequest, DatabricksConfig, DatabricksRestClient, Transport};
use dbperms_mcp::config::{Config, ConfigOverrides};
use dbperms_mcp::{PermissionsServer, ShutdownGate, registry};
use eyre::Result;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const WHOAMI_ENDPOINT: &str = "/api/2.0/preview/scim/v2/Me";

#[derive(Parser)]
#[command(name = "dbperms_mcp")]
#[command(about = "Databricks Permissions MCP Server", long_about = None)]
struct Cli {
    /// Workspace URL; falls back to DATABRICKS_HOST
    #[arg(long)]
    host: Option<String>,

    /// Personal access token; falls back to DATABRICKS_TOKEN
    #[arg(long)]
    token: Option<String>,

    /// Full config as JSON (mutually exclusive with other config flags)
    #[arg(long, conflicts_with_all = ["timeout_secs", "log_file"])]
    json: Option<String>,

    /// Override request_timeout_secs
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Override log_file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check credentials and connectivity to the workspace
    Check,
}

/// Load config from file and apply CLI overrides
fn load_config_with_overrides(cli: &Cli) -> Result<Config> {
    if let Some(json) = &cli.json {
        return Config::from_json(json);
    }
    let base_config = Config::load_from_dir()?;
    Ok(base_config.apply_override(ConfigOverrides {
        request_timeout_secs: cli.timeout_secs,
        log_file: cli.log_file.clone(),
    }))
}

/// Logs go to the configured file, or to stderr when RUST_LOG is set; stdout carries MCP.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<String>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(filter())
            .with_writer(Mutex::new(file))
            .init();
        return Ok(Some(path.display().to_string()));
    }

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(None)
}

async fn check_environment(databricks: Result<DatabricksConfig>) -> Result<()> {
    println!("🔍 Checking environment configuration...\n");

    print!("  Databricks credentials... ");
    let databricks = match databricks {
        Ok(config) => {
            println!("✓");
            println!("    DATABRICKS_HOST: {}", config.host);
            println!("    DATABRICKS_TOKEN: [set]");
            config
        }
        Err(e) => {
            println!("✗\n    Error: {}", e);
            println!("\n❌ Some checks failed. Please review the errors above.");
            return Err(eyre::eyre!("Environment check failed"));
        }
    };

    print!("  Workspace connectivity... ");
    let client = DatabricksRestClient::new(&databricks)?;
    match client.send(ApiRequest::get(WHOAMI_ENDPOINT)).await {
        Ok(me) => {
            println!("✓");
            if let Some(user) = me.get("userName").and_then(|v| v.as_str()) {
                println!("    Authenticated as: {}", user);
            }
        }
        Err(e) => {
            println!("✗\n    Error: {}", e);
            println!("\n❌ Some checks failed. Please review the errors above.");
            return Err(eyre::eyre!("Environment check failed"));
        }
    }

    println!("\n✅ All checks passed!");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env never overrides variables already set in the process
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config_with_overrides(&cli)?;

    match cli.command {
        Some(Commands::Check) => {
            check_environment(config.databricks(cli.host.clone(), cli.token.clone())).await
        }
        None => {
            let databricks = config.databricks(cli.host.clone(), cli.token.clone())?;
            run_server(config, databricks).await
        }
    }
}

async fn run_server(config: Config, databricks: DatabricksConfig) -> Result<()> {
    let log_path = init_tracing(config.log_file.as_deref())?;

    let client = DatabricksRestClient::new(&databricks)?;
    let gate = ShutdownGate::new();
    let server = PermissionsServer::new(Arc::new(client), gate.clone());

    let log_info = match &log_path {
        Some(path) => format!("\n Logs: {}", path),
        None => String::new(),
    };
    eprintln!(
        "🚀 Databricks Permissions MCP Server v{}\n\
         Workspace: {}\n\
         Tools: {}{}\n\
         Server running on stdio transport...",
        env!("CARGO_PKG_VERSION"),
        databricks.host,
        registry::TOOLS.len(),
        log_info
    );
    tracing::info!(host = %databricks.host, "starting server");

    let service = server.serve(stdio()).await?;
    let cancel = service.cancellation_token();
    let mut serving = tokio::spawn(service.waiting());

    tokio::select! {
        finished = &mut serving => {
            let reason = finished??;
            tracing::info!("client disconnected: {:?}", reason);
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!(in_flight = gate.in_flight(), "shutdown requested; draining");
    gate.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, gate.drained()).await.is_err() {
        tracing::warn!(
            in_flight = gate.in_flight(),
            "drain timed out; cancelling remaining invocations"
        );
    }
    cancel.cancel();
    let _ = serving.await?;
    tracing::info!("server stopped");
    Ok(())
}
